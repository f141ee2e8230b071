//! Bundle loading.
//!
//! Produces the `files` mapping consumed by a load:
//! 1. from a directory on disk (the CLI preload), or
//! 2. from a control payload whose bodies are base64 strings.
//!
//! Keys are normalized to forward slashes here, before they reach the
//! store. Nothing else about the key is changed; case and decorations are
//! preserved as packaged.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use indexmap::IndexMap;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::HostError;

/// Bundle-relative path → bytes, in load order.
pub type Files = IndexMap<String, Bytes>;

/// Normalize a packaged path into a store key.
/// Backslashes become `/`; leading `./` and `/` are dropped.
pub fn normalize_key(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let mut key = forward.as_str();
    loop {
        if let Some(rest) = key.strip_prefix("./") {
            key = rest;
        } else if let Some(rest) = key.strip_prefix('/') {
            key = rest;
        } else {
            break;
        }
    }
    key.to_string()
}

/// Read every regular file under `root`. Entries are ordered by path so two
/// reads of the same tree produce the same snapshot order.
pub fn from_dir(root: &Path) -> Result<Files, HostError> {
    let mut files = Files::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path());
        let key = normalize_key(&relative.to_string_lossy());
        let bytes = std::fs::read(entry.path())?;
        debug!(key = %key, size = bytes.len(), "bundle file");
        files.insert(key, Bytes::from(bytes));
    }

    info!(root = %root.display(), files = files.len(), "bundle directory read");
    Ok(files)
}

/// Decode base64 bodies from a control payload.
pub fn decode_files(encoded: IndexMap<String, String>) -> Result<Files, HostError> {
    let mut files = Files::with_capacity(encoded.len());
    for (path, body) in encoded {
        let bytes = STANDARD
            .decode(body.as_bytes())
            .map_err(|source| HostError::InvalidBody {
                path: path.clone(),
                source,
            })?;
        files.insert(normalize_key(&path), Bytes::from(bytes));
    }
    Ok(files)
}

/// Encode files for a control payload. Inverse of [`decode_files`].
pub fn encode_files(files: &Files) -> IndexMap<String, String> {
    files
        .iter()
        .map(|(path, bytes)| (path.clone(), STANDARD.encode(bytes)))
        .collect()
}
