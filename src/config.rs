//! Configuration file parsing
//!
//! `memhost.toml` sections, all optional:
//! - [server] - bind address, static shell directory, request body limit
//! - [host] - scope prefix, mount point, root document, preload bundle
//! - [resolver] - packaging-noise characters
//! - [log] - default log level

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::controller::ControllerOptions;
use crate::resolver::ResolverConfig;

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemhostConfig {
    pub server: ServerSection,
    pub host: HostSection,
    pub resolver: ResolverConfig,
    pub log: LogSection,
}

/// Server configuration section
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Listen address
    pub bind: String,

    /// Directory served for requests outside the mount point
    pub shell_dir: Option<PathBuf>,

    /// Largest accepted control payload, in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            shell_dir: None,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Interception settings
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostSection {
    /// Deployment base path (`/` or `/repo/`)
    pub scope: String,

    /// Virtual mount point for bundle assets
    pub mount_point: String,

    /// Canonical root document name
    pub root_document: String,

    /// Bundle directory loaded at startup
    pub bundle_dir: Option<PathBuf>,
}

impl Default for HostSection {
    fn default() -> Self {
        let options = ControllerOptions::default();
        Self {
            scope: options.scope,
            mount_point: options.mount_point,
            root_document: options.root_document,
            bundle_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MemhostConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind))
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            scope: self.host.scope.clone(),
            mount_point: self.host.mount_point.clone(),
            root_document: self.host.root_document.clone(),
            resolver: self.resolver,
        }
    }
}
