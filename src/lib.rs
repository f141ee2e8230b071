//! # memhost
//!
//! Serves a packaged web application (a bundle of HTML/JS/assets) entirely
//! from memory. Every request the hosted bundle issues under the virtual
//! mount point is intercepted and answered from a pre-loaded asset table.
//!
//! The crate resolves requests deterministically under real-world packaging
//! noise: mixed case, backslash separators, trailing marker characters and
//! decorated filenames. The root document is patched before it is served.
//!
//! # Architecture
//!
//! ```text
//! request → PathNormalizer → (root? DocumentPatcher) → PathResolver → ContentType → response
//!                                        ↑                    ↑
//!                                        └──── AssetStore ────┘   ← Load (atomic swap)
//! ```

pub mod bundle;
pub mod config;
pub mod content_type;
pub mod controller;
pub mod logging;
pub mod normalize;
pub mod patcher;
pub mod resolver;
pub mod server;
pub mod store;

use thiserror::Error;

pub use bundle::Files;
pub use content_type::{classify, CachePolicy, ContentType};
pub use controller::{
    ControlMessage, ControlReply, ControllerOptions, Intercept, InterceptionController, Lifecycle,
    NotFoundReport, Notification, Readiness, ResourceRequest, ServedAsset, SessionId,
};
pub use normalize::{CanonicalPath, PathNormalizer};
pub use patcher::{DocumentPatcher, PatchError};
pub use resolver::{PathResolver, ResolutionResult, ResolverConfig, Strategy};
pub use store::{Asset, AssetStore, Snapshot};

/// Version reported by liveness queries.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// HostError
// ---------------------------------------------------------------------------

/// Errors surfaced to control-message callers and bundle loaders.
///
/// Resolution misses are not errors; they are reported through
/// [`Intercept::NotFound`].
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Controller is not active (state: {0})")]
    NotActive(Lifecycle),

    #[error("Invalid base64 body for `{path}`: {source}")]
    InvalidBody {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Invalid control message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Bundle directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Document patcher setup failed: {0}")]
    Patcher(#[from] PatchError),
}
