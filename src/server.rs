//! Axum router for the in-memory host
//!
//! - `POST /__memhost/control` - JSON control message, JSON reply
//! - `GET  /__memhost/session` - WebSocket session channel
//! - everything else - interception, then the static shell, then 404

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tracing::{debug, warn};

use crate::bundle;
use crate::controller::{
    ControlMessage, ControlReply, Intercept, InterceptionController, ResourceRequest, ServedAsset,
    SessionId,
};
use crate::HostError;

pub const CONTROL_PATH: &str = "/__memhost/control";
pub const SESSION_PATH: &str = "/__memhost/session";

/// Names the originating session on plain HTTP control calls.
pub const SESSION_HEADER: &str = "x-memhost-session";

/// Reports which resolution rule answered a request.
pub const STRATEGY_HEADER: &str = "x-memhost-strategy";

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Control message as it travels over the wire. File bodies are base64.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlRequest {
    Load {
        files: IndexMap<String, String>,
        #[serde(default)]
        metadata: Option<Value>,
    },
    Ping,
}

impl ControlRequest {
    pub fn into_message(self) -> Result<ControlMessage, HostError> {
        Ok(match self {
            ControlRequest::Load { files, metadata } => ControlMessage::Load {
                files: bundle::decode_files(files)?,
                metadata,
            },
            ControlRequest::Ping => ControlMessage::Ping,
        })
    }
}

fn parse_control(body: &[u8]) -> Result<ControlMessage, HostError> {
    serde_json::from_slice::<ControlRequest>(body)?.into_message()
}

fn error_status(err: &HostError) -> StatusCode {
    match err {
        HostError::NotActive(_) => StatusCode::SERVICE_UNAVAILABLE,
        HostError::InvalidBody { .. } | HostError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(err: &HostError) -> ControlReply {
    ControlReply::Error {
        message: err.to_string(),
    }
}

fn to_frame<T: Serialize>(value: &T) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(err) => {
            warn!(error = %err, "failed to encode session frame");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Router options.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub shell_dir: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            shell_dir: None,
            max_body_bytes: 512 * 1024 * 1024,
        }
    }
}

#[derive(Clone)]
struct AppState {
    controller: Arc<InterceptionController>,
    shell: Option<ServeDir>,
    /// Shared by the control body limit and session frames.
    max_body_bytes: usize,
}

/// Create the host router
pub fn create_router(controller: Arc<InterceptionController>, options: ServerOptions) -> Router {
    let state = AppState {
        controller,
        shell: options.shell_dir.map(ServeDir::new),
        max_body_bytes: options.max_body_bytes,
    };

    Router::new()
        .route(CONTROL_PATH, post(control))
        .route(SESSION_PATH, get(session))
        .fallback(intercept)
        .layer(DefaultBodyLimit::max(options.max_body_bytes))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn control(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let origin = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<SessionId>().ok());

    let result = parse_control(&body)
        .and_then(|message| state.controller.handle_control(origin, message));

    match result {
        Ok(reply) => Json(reply).into_response(),
        Err(err) => {
            warn!(error = %err, "control message rejected");
            (error_status(&err), Json(error_reply(&err))).into_response()
        }
    }
}

async fn session(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    // A whole bundle travels as one text frame.
    ws.max_message_size(state.max_body_bytes)
        .max_frame_size(state.max_body_bytes)
        .on_upgrade(move |socket| run_session(socket, state.controller))
}

async fn run_session(socket: WebSocket, controller: Arc<InterceptionController>) {
    let (id, mut notifications) = controller.open_session();
    let (mut sink, mut stream) = socket.split();

    loop {
        let outbound = tokio::select! {
            Some(note) = notifications.recv() => to_frame(&note),
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => inbound(&controller, id, text).await,
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(err)) => {
                    warn!(session = %id, error = %err, "session read failed");
                    break;
                }
                Some(Ok(_)) => None,
            },
        };

        if let Some(frame) = outbound {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    }

    controller.close_session(id);
}

/// Decode and apply one text frame on the blocking pool. Large loads spend
/// most of their time in base64 decoding.
async fn inbound(
    controller: &Arc<InterceptionController>,
    id: SessionId,
    text: Utf8Bytes,
) -> Option<Message> {
    let controller = Arc::clone(controller);
    let task =
        tokio::task::spawn_blocking(move || session_message(&controller, id, text.as_str().as_bytes()));
    match task.await {
        Ok(frame) => frame,
        Err(err) => {
            warn!(session = %id, error = %err, "session message task failed");
            None
        }
    }
}

/// Handle one inbound session frame. Readiness for a load arrives through
/// the session's notification channel, so loads produce no direct frame.
fn session_message(
    controller: &InterceptionController,
    id: SessionId,
    text: &[u8],
) -> Option<Message> {
    let reply = match parse_control(text) {
        Ok(ControlMessage::Load { files, metadata }) => {
            match controller.load(Some(id), files, metadata) {
                Ok(_) => return None,
                Err(err) => error_reply(&err),
            }
        }
        Ok(ControlMessage::Ping) => controller
            .handle_control(Some(id), ControlMessage::Ping)
            .unwrap_or_else(|err| error_reply(&err)),
        Err(err) => error_reply(&err),
    };
    to_frame(&reply)
}

async fn intercept(State(state): State<AppState>, request: Request) -> Response {
    let resource = ResourceRequest {
        method: request.method().to_string(),
        url: request.uri().to_string(),
    };

    match state.controller.handle_request(&resource) {
        Intercept::Served(asset) => asset_response(asset),
        Intercept::NotFound(report) => (StatusCode::NOT_FOUND, Json(report)).into_response(),
        Intercept::Declined => match state.shell {
            Some(shell) => {
                debug!(url = %resource.url, "declined, serving from shell");
                match shell.oneshot(request).await {
                    Ok(response) => response.map(Body::new),
                    Err(never) => match never {},
                }
            }
            None => (StatusCode::NOT_FOUND, "Not Found").into_response(),
        },
    }
}

fn asset_response(asset: ServedAsset) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, asset.content_type.header_value()),
            (
                header::CACHE_CONTROL,
                asset.content_type.cache_policy.header_value().to_string(),
            ),
            (
                HeaderName::from_static(STRATEGY_HEADER),
                asset.strategy.as_str().to_string(),
            ),
        ],
        Body::from(asset.body),
    )
        .into_response()
}
