//! Individual resolution rules.
//!
//! Each rule records the candidate paths it attempts so a miss can report
//! them. A rule never mutates the snapshot.

use std::fmt;

use tracing::{info, warn};

use super::{Candidates, Strategy};
use crate::store::{fold_key, Asset, Snapshot};

/// One step of the fallback chain.
pub trait ResolutionStrategy: fmt::Debug + Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Try to answer `path` from `snapshot`. A miss returns `None` and falls
    /// through to the next rule.
    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates)
        -> Option<Asset>;
}

fn exact(snapshot: &Snapshot, candidate: String, tried: &mut Candidates) -> Option<Asset> {
    let hit = snapshot.get(&candidate);
    tried.push(candidate);
    hit
}

/// Split `path` into (directory including trailing separator, file name).
fn split_file(path: &str) -> (&str, &str) {
    match path.rfind(['/', '\\']) {
        Some(idx) => path.split_at(idx + 1),
        None => ("", path),
    }
}

/// Split a file name into (stem, extension). Dotfiles and names without a
/// dot have no extension.
fn split_extension(file: &str) -> Option<(&str, &str)> {
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => Some((stem, ext)),
        _ => None,
    }
}

/// Strip a packaging decoration from the file stem: everything after the
/// last `token`, keeping directory and extension.
///
/// `audio/Theme_fin.ogg` → `audio/Theme.ogg`. Returns `None` when the stem
/// has no token with text on both sides.
pub fn strip_decoration(path: &str, token: char) -> Option<String> {
    let (dir, file) = split_file(path);
    let (stem, ext) = split_extension(file)?;
    let idx = stem.rfind(token)?;
    let base = &stem[..idx];
    let decoration = &stem[idx + token.len_utf8()..];
    if base.is_empty() || decoration.is_empty() {
        return None;
    }
    Some(format!("{dir}{base}.{ext}"))
}

// ---------------------------------------------------------------------------
// 1. Exact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl ResolutionStrategy for ExactMatch {
    fn strategy(&self) -> Strategy {
        Strategy::Exact
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        exact(snapshot, path.to_string(), tried)
    }
}

// ---------------------------------------------------------------------------
// 2. Trailing marker
// ---------------------------------------------------------------------------

/// `sprite.png_` → `sprite.png`.
#[derive(Debug, Clone, Copy)]
pub struct TrailingMarker {
    marker: char,
}

impl TrailingMarker {
    pub fn new(marker: char) -> Self {
        Self { marker }
    }
}

impl ResolutionStrategy for TrailingMarker {
    fn strategy(&self) -> Strategy {
        Strategy::TrailingMarker
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        let trimmed = path.strip_suffix(self.marker)?;
        if trimmed.is_empty() {
            return None;
        }
        exact(snapshot, trimmed.to_string(), tried)
    }
}

// ---------------------------------------------------------------------------
// 3. Separator swap
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct SeparatorSwap;

impl ResolutionStrategy for SeparatorSwap {
    fn strategy(&self) -> Strategy {
        Strategy::Separator
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        if path.contains('\\') {
            if let Some(hit) = exact(snapshot, path.replace('\\', "/"), tried) {
                return Some(hit);
            }
        }
        if path.contains('/') {
            return exact(snapshot, path.replace('/', "\\"), tried);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// 4. Case-insensitive
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct CaseInsensitive;

impl ResolutionStrategy for CaseInsensitive {
    fn strategy(&self) -> Strategy {
        Strategy::CaseInsensitive
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        tried.push(fold_key(path));
        let hit = snapshot.find_folded(path)?;
        info!(requested = path, matched = %hit.path, "case-insensitive match");
        Some(hit)
    }
}

// ---------------------------------------------------------------------------
// 5. Suffix token
// ---------------------------------------------------------------------------

/// Tolerates a packaging decoration on either side: a decorated request for
/// a plain key (`Theme_fin.ogg` → `Theme.ogg`) and a plain request for a
/// decorated key (`theme.ogg` → `Theme_fin.ogg`). Both compare
/// case-insensitively.
#[derive(Debug, Clone, Copy)]
pub struct SuffixToken {
    token: char,
}

impl SuffixToken {
    pub fn new(token: char) -> Self {
        Self { token }
    }
}

impl ResolutionStrategy for SuffixToken {
    fn strategy(&self) -> Strategy {
        Strategy::SuffixToken
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        if let Some(stripped) = strip_decoration(path, self.token) {
            tried.push(stripped.clone());
            if let Some(hit) = snapshot.find_folded(&stripped) {
                warn!(requested = path, matched = %hit.path, "suffix-token match on request");
                return Some(hit);
            }
        }

        let hit = if snapshot.suffix_token() == self.token {
            snapshot.find_stripped(path)?
        } else {
            // Snapshot indexed with another token.
            let wanted = fold_key(path);
            let key = snapshot.keys().find(|key| {
                strip_decoration(key, self.token).is_some_and(|plain| fold_key(&plain) == wanted)
            })?;
            snapshot.get(key)?
        };
        warn!(requested = path, matched = %hit.path, "suffix-token match on stored key");
        Some(hit)
    }
}

// ---------------------------------------------------------------------------
// 6. Parent-directory widening
// ---------------------------------------------------------------------------

/// `www/img/a.png` → `img/a.png` → `a.png`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParentDirectory;

impl ResolutionStrategy for ParentDirectory {
    fn strategy(&self) -> Strategy {
        Strategy::ParentDirectory
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        let segments: Vec<&str> = path.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
        (1..segments.len()).find_map(|start| exact(snapshot, segments[start..].join("/"), tried))
    }
}

// ---------------------------------------------------------------------------
// 7. Extension-less
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Extensionless;

impl ResolutionStrategy for Extensionless {
    fn strategy(&self) -> Strategy {
        Strategy::Extensionless
    }

    fn try_resolve(&self, snapshot: &Snapshot, path: &str, tried: &mut Candidates) -> Option<Asset> {
        let (dir, file) = split_file(path);
        let (stem, _) = split_extension(file)?;
        exact(snapshot, format!("{dir}{stem}"), tried)
    }
}
