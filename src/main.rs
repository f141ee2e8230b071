use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use memhost::config::MemhostConfig;
use memhost::server::{self, ServerOptions};
use memhost::{bundle, logging, Intercept, InterceptionController, ResourceRequest};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to memhost.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a bundle from memory
    Serve {
        /// Listen address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,

        /// Bundle directory to preload
        #[arg(long, value_name = "DIR")]
        bundle: Option<PathBuf>,

        /// Static directory for requests outside the mount point
        #[arg(long, value_name = "DIR")]
        shell: Option<PathBuf>,

        /// Deployment base path
        #[arg(long)]
        scope: Option<String>,

        /// Virtual mount point
        #[arg(long)]
        mount: Option<String>,
    },
    /// Show how request URLs resolve against a bundle directory
    Resolve {
        /// Bundle directory
        #[arg(long, value_name = "DIR")]
        bundle: PathBuf,

        /// Request URLs, e.g. /game/img/hero.png
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("[memhost] {err:#}");
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MemhostConfig::load(path)?,
        None => MemhostConfig::default(),
    };

    match cli.command {
        Commands::Serve {
            bind,
            bundle,
            shell,
            scope,
            mount,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if bundle.is_some() {
                config.host.bundle_dir = bundle;
            }
            if shell.is_some() {
                config.server.shell_dir = shell;
            }
            if let Some(scope) = scope {
                config.host.scope = scope;
            }
            if let Some(mount) = mount {
                config.host.mount_point = mount;
            }

            logging::init(&config.log.level)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?;
            runtime.block_on(serve(config))
        }
        Commands::Resolve { bundle, urls } => {
            logging::init(&config.log.level)?;
            resolve(&config, &bundle, &urls)
        }
    }
}

fn start_controller(config: &MemhostConfig) -> Result<InterceptionController> {
    let controller = InterceptionController::new(config.controller_options())?;
    controller.install();
    controller.activate();
    Ok(controller)
}

async fn serve(config: MemhostConfig) -> Result<()> {
    let addr = config.bind_addr()?;
    let controller = Arc::new(start_controller(&config)?);

    if let Some(dir) = &config.host.bundle_dir {
        let files = bundle::from_dir(dir)
            .with_context(|| format!("failed to read bundle directory: {}", dir.display()))?;
        controller.load(None, files, None)?;
    }

    let router = server::create_router(
        Arc::clone(&controller),
        ServerOptions {
            shell_dir: config.server.shell_dir.clone(),
            max_body_bytes: config.server.max_body_bytes,
        },
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        "memhost listening on http://{}{}",
        addr,
        controller.scope()
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;
    Ok(())
}

fn resolve(config: &MemhostConfig, dir: &std::path::Path, urls: &[String]) -> Result<()> {
    let controller = start_controller(config)?;
    let files = bundle::from_dir(dir)
        .with_context(|| format!("failed to read bundle directory: {}", dir.display()))?;
    controller.load(None, files, None)?;

    for url in urls {
        match controller.handle_request(&ResourceRequest::get(url.as_str())) {
            Intercept::Served(asset) => println!(
                "{url} -> {} [{}] {}{}",
                asset.matched_key,
                asset.strategy,
                asset.content_type.header_value(),
                if asset.patched { " (patched)" } else { "" }
            ),
            Intercept::NotFound(report) => println!(
                "{url} -> not found (tried: {})",
                report.candidates_tried.join(", ")
            ),
            Intercept::Declined => println!("{url} -> declined (outside mount point)"),
        }
    }
    Ok(())
}
