//! WebSocket session channel over a real listener.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use memhost::server::{self, ServerOptions, SESSION_PATH};
use memhost::{ControllerOptions, InterceptionController};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start(max_body_bytes: usize) -> (Arc<InterceptionController>, String) {
    let controller = InterceptionController::new(ControllerOptions::default()).unwrap();
    controller.install();
    controller.activate();
    let controller = Arc::new(controller);

    let router = server::create_router(
        Arc::clone(&controller),
        ServerOptions {
            max_body_bytes,
            ..Default::default()
        },
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (controller, format!("ws://{addr}{SESSION_PATH}"))
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        match client.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn connect(url: &str) -> Client {
    let (mut client, _) = connect_async(url).await.unwrap();
    let hello = next_json(&mut client).await;
    assert_eq!(hello["type"], "controlled");
    client
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_ping_pong() {
    let (_controller, url) = start(1024 * 1024).await;
    let mut client = connect(&url).await;

    client
        .send(Message::text(json!({ "type": "ping" }).to_string()))
        .await
        .unwrap();
    let pong = next_json(&mut client).await;
    assert_eq!(pong["type"], "pong");
    assert_eq!(pong["state"], "active");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bundle_larger_than_default_frame_limit_loads() {
    let (controller, url) = start(64 * 1024 * 1024).await;
    let mut client = connect(&url).await;

    // 18 MiB of assets is 24 MiB of base64, above the 16 MiB frame default.
    let big = vec![0x5a_u8; 18 * 1024 * 1024];
    let frame = json!({
        "type": "load",
        "files": {
            "index.html": STANDARD.encode(b"<head></head>"),
            "audio/bgm/Theme_fin.ogg": STANDARD.encode(&big),
        }
    })
    .to_string();
    assert!(frame.len() > 16 * 1024 * 1024);

    client.send(Message::text(frame)).await.unwrap();
    let ready = next_json(&mut client).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["generation"], 1);
    assert_eq!(ready["assetCount"], 2);
    assert_eq!(
        controller.store().get("audio/bgm/Theme_fin.ogg").map(|b| b.len()),
        Some(big.len())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readiness_goes_only_to_loading_session() {
    let (_controller, url) = start(1024 * 1024).await;
    let mut loader = connect(&url).await;
    let mut watcher = connect(&url).await;

    loader
        .send(Message::text(
            json!({ "type": "load", "files": { "a.txt": "YQ==" } }).to_string(),
        ))
        .await
        .unwrap();
    let ready = next_json(&mut loader).await;
    assert_eq!(ready["type"], "ready");

    // The watcher's next frame answers its own ping, not the load.
    watcher
        .send(Message::text(json!({ "type": "ping" }).to_string()))
        .await
        .unwrap();
    let reply = next_json(&mut watcher).await;
    assert_eq!(reply["type"], "pong");
    assert_eq!(reply["generation"], 1);
}
