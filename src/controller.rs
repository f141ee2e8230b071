//! InterceptionController - lifecycle, sessions and request dispatch
//!
//! States: `Uninstalled → Installing → Active`. There is no terminal state.
//!
//! While `Active` the controller:
//! - applies `Load` commands to the [`AssetStore`] and notifies the
//!   originating session,
//! - answers `Ping` with its version and scope,
//! - intercepts resource requests under the virtual mount point.
//!
//! Every failure degrades to a best-effort response. Nothing here can take
//! the controller down.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use arcstr::ArcStr;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::bundle::Files;
use crate::content_type::{classify, ContentType};
use crate::normalize::PathNormalizer;
use crate::patcher::DocumentPatcher;
use crate::resolver::{PathResolver, ResolutionResult, ResolverConfig, Strategy};
use crate::store::AssetStore;
use crate::{HostError, VERSION};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninstalled,
    Installing,
    Active,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Uninstalled,
            1 => Lifecycle::Installing,
            _ => Lifecycle::Active,
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Lifecycle::Uninstalled => "uninstalled",
            Lifecycle::Installing => "installing",
            Lifecycle::Active => "active",
        })
    }
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// Identifies one connected client page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(SessionId)
    }
}

/// Pushed to a session outside the request/reply flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The controller has taken over this session.
    Controlled { version: &'static str, scope: String },
    /// A bundle load requested by this session has been published.
    Ready {
        generation: u64,
        #[serde(rename = "assetCount")]
        asset_count: usize,
    },
}

#[derive(Debug)]
struct Session {
    controlled: bool,
    tx: mpsc::UnboundedSender<Notification>,
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

/// Out-of-band command from a client session.
#[derive(Debug, Clone)]
pub enum ControlMessage {
    Load {
        files: Files,
        metadata: Option<Value>,
    },
    Ping,
}

/// Outcome of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub generation: u64,
    #[serde(rename = "assetCount")]
    pub asset_count: usize,
}

/// Direct reply to a control message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlReply {
    Ready {
        generation: u64,
        #[serde(rename = "assetCount")]
        asset_count: usize,
    },
    Pong {
        version: &'static str,
        scope: String,
        state: Lifecycle,
        generation: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Error {
        message: String,
    },
}

impl From<Readiness> for ControlReply {
    fn from(ready: Readiness) -> Self {
        ControlReply::Ready {
            generation: ready.generation,
            asset_count: ready.asset_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource requests
// ---------------------------------------------------------------------------

/// One inbound resource request. Only the path of `url` is used.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: String,
    pub url: String,
}

impl ResourceRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }
}

/// A resolved asset ready to be written out.
#[derive(Debug, Clone)]
pub struct ServedAsset {
    pub matched_key: ArcStr,
    pub body: Bytes,
    pub content_type: ContentType,
    pub strategy: Strategy,
    pub patched: bool,
}

/// Diagnostic body of a miss.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundReport {
    pub requested_path: String,
    /// URL path as it arrived, before scope and mount stripping.
    pub raw_path: String,
    pub candidates_tried: Vec<String>,
    pub asset_count: usize,
    pub scope: String,
    pub timestamp: DateTime<Utc>,
}

/// What the controller did with a request.
#[derive(Debug, Clone)]
pub enum Intercept {
    /// Outside the mount point, or the controller is not active yet.
    Declined,
    Served(ServedAsset),
    NotFound(NotFoundReport),
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Construction options.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub scope: String,
    pub mount_point: String,
    pub root_document: String,
    pub resolver: ResolverConfig,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            scope: "/".to_string(),
            mount_point: "game".to_string(),
            root_document: "index.html".to_string(),
            resolver: ResolverConfig::default(),
        }
    }
}

pub struct InterceptionController {
    state: AtomicU8,
    store: AssetStore,
    normalizer: PathNormalizer,
    resolver: PathResolver,
    patcher: DocumentPatcher,
    sessions: DashMap<SessionId, Session>,
    next_session: AtomicU64,
}

impl fmt::Debug for InterceptionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionController")
            .field("state", &self.state())
            .field("scope", &self.normalizer.scope())
            .field("generation", &self.store.generation())
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl InterceptionController {
    pub fn new(options: ControllerOptions) -> Result<Self, HostError> {
        let normalizer = PathNormalizer::new(
            &options.scope,
            &options.mount_point,
            options.root_document,
        );
        let patcher = DocumentPatcher::new(normalizer.base_href())?;

        Ok(Self {
            state: AtomicU8::new(Lifecycle::Uninstalled as u8),
            store: AssetStore::with_suffix_token(options.resolver.suffix_token),
            normalizer,
            resolver: PathResolver::new(options.resolver),
            patcher,
            sessions: DashMap::new(),
            next_session: AtomicU64::new(1),
        })
    }

    pub fn state(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Computed scope prefix, `/`-delimited.
    pub fn scope(&self) -> &str {
        self.normalizer.scope()
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    /// `Uninstalled → Installing`. Claims readiness immediately.
    pub fn install(&self) {
        if self
            .state
            .compare_exchange(
                Lifecycle::Uninstalled as u8,
                Lifecycle::Installing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            info!(version = VERSION, scope = self.scope(), "installing");
        }
    }

    /// `Installing → Active`, taking over every open session.
    /// Calling it before `install` installs first.
    pub fn activate(&self) {
        self.install();
        if self
            .state
            .compare_exchange(
                Lifecycle::Installing as u8,
                Lifecycle::Active as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let mut claimed = 0usize;
        for mut session in self.sessions.iter_mut() {
            if self.claim(&mut session) {
                claimed += 1;
            }
        }
        info!(claimed, "active");
    }

    fn claim(&self, session: &mut Session) -> bool {
        if session.controlled {
            return false;
        }
        session.controlled = true;
        let _ = session.tx.send(Notification::Controlled {
            version: VERSION,
            scope: self.scope().to_string(),
        });
        true
    }

    /// Register a client session. Sessions opened while active are
    /// controlled from the start.
    pub fn open_session(&self) -> (SessionId, mpsc::UnboundedReceiver<Notification>) {
        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(
            id,
            Session {
                controlled: false,
                tx,
            },
        );
        if self.state() == Lifecycle::Active {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                self.claim(&mut session);
            }
        }
        debug!(session = %id, "session opened");
        (id, rx)
    }

    pub fn close_session(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!(session = %id, "session closed");
        }
    }

    pub fn is_controlled(&self, id: SessionId) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.controlled)
    }

    fn ensure_active(&self) -> Result<(), HostError> {
        match self.state() {
            Lifecycle::Active => Ok(()),
            other => Err(HostError::NotActive(other)),
        }
    }

    /// Replace the asset table. The readiness notification goes to `origin`
    /// when it names an open session.
    pub fn load(
        &self,
        origin: Option<SessionId>,
        files: Files,
        metadata: Option<Value>,
    ) -> Result<Readiness, HostError> {
        self.ensure_active()?;

        let asset_count = files.len();
        let generation = self.store.load(files, metadata);
        let ready = Readiness {
            generation,
            asset_count,
        };
        info!(generation, files = asset_count, "bundle loaded");
        if asset_count == 0 {
            warn!(generation, "empty bundle loaded, every request will miss");
        }

        if let Some(id) = origin {
            match self.sessions.get(&id) {
                Some(session) => {
                    let _ = session.tx.send(Notification::Ready {
                        generation,
                        asset_count,
                    });
                }
                None => debug!(session = %id, "load origin is not an open session"),
            }
        }
        Ok(ready)
    }

    pub fn ping(&self) -> ControlReply {
        let snapshot = self.store.snapshot();
        ControlReply::Pong {
            version: VERSION,
            scope: self.scope().to_string(),
            state: self.state(),
            generation: snapshot.generation(),
            metadata: snapshot.metadata().cloned(),
        }
    }

    /// Apply one control message.
    pub fn handle_control(
        &self,
        origin: Option<SessionId>,
        message: ControlMessage,
    ) -> Result<ControlReply, HostError> {
        match message {
            ControlMessage::Load { files, metadata } => {
                self.load(origin, files, metadata).map(ControlReply::from)
            }
            ControlMessage::Ping => {
                self.ensure_active()?;
                Ok(self.ping())
            }
        }
    }

    /// Intercept one resource request.
    pub fn handle_request(&self, request: &ResourceRequest) -> Intercept {
        if self.state() != Lifecycle::Active {
            return Intercept::Declined;
        }
        let Some(canonical) = self.normalizer.normalize(&request.url) else {
            return Intercept::Declined;
        };

        // One snapshot for the whole request.
        let snapshot = self.store.snapshot();

        if canonical.is_root {
            if let Some(asset) = snapshot.get(&canonical.path) {
                let (body, patched) = match self.patcher.patch(&asset.bytes) {
                    Ok(patched) => (Bytes::from(patched), true),
                    Err(err) => {
                        error!(path = %asset.path, error = %err, "root document patch failed, serving original");
                        (asset.bytes.clone(), false)
                    }
                };
                return Intercept::Served(ServedAsset {
                    content_type: classify(&asset.path),
                    matched_key: asset.path,
                    body,
                    strategy: Strategy::Exact,
                    patched,
                });
            }
        }

        match self.resolver.resolve(&snapshot, &canonical.path) {
            ResolutionResult::Found {
                matched_key,
                bytes,
                strategy,
            } => {
                debug!(method = %request.method, path = %canonical.path, matched = %matched_key, %strategy, "served");
                Intercept::Served(ServedAsset {
                    content_type: classify(&matched_key),
                    matched_key,
                    body: bytes,
                    strategy,
                    patched: false,
                })
            }
            ResolutionResult::NotFound {
                raw_path,
                candidates_tried,
            } => {
                warn!(path = %raw_path, generation = snapshot.generation(), "no asset matched");
                Intercept::NotFound(NotFoundReport {
                    requested_path: raw_path,
                    raw_path: canonical.raw,
                    candidates_tried,
                    asset_count: snapshot.len(),
                    scope: self.scope().to_string(),
                    timestamp: Utc::now(),
                })
            }
        }
    }
}
