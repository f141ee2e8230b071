//! PathResolver - ordered fallback chain over a store snapshot
//!
//! Runs an explicit, ordered list of [`ResolutionStrategy`] objects:
//! 1. exact match
//! 2. trailing-marker trim
//! 3. separator normalization
//! 4. case-insensitive match
//! 5. suffix-token stripping
//! 6. parent-directory widening
//! 7. extension-less match
//!
//! The first strategy to hit decides the outcome. Exact lookup always runs
//! before any fuzzy rule.

pub mod strategy;

use std::fmt;

use arcstr::ArcStr;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::Snapshot;

pub use strategy::{
    strip_decoration, CaseInsensitive, ExactMatch, Extensionless, ParentDirectory,
    ResolutionStrategy, SeparatorSwap, SuffixToken, TrailingMarker,
};

// ---------------------------------------------------------------------------
// Strategy tag
// ---------------------------------------------------------------------------

/// Which rule produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Exact,
    TrailingMarker,
    Separator,
    CaseInsensitive,
    SuffixToken,
    ParentDirectory,
    Extensionless,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::TrailingMarker => "trailing_marker",
            Strategy::Separator => "separator",
            Strategy::CaseInsensitive => "case_insensitive",
            Strategy::SuffixToken => "suffix_token",
            Strategy::ParentDirectory => "parent_directory",
            Strategy::Extensionless => "extensionless",
        }
    }

    /// Whether this rule is anything other than exact lookup.
    pub fn is_fuzzy(self) -> bool {
        self != Strategy::Exact
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Packaging-noise characters recognised by the fuzzy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Trailing character marking an encoded variant (`file.png_`).
    pub marker: char,
    /// Token separating a file stem from a packaging decoration (`Theme_fin.ogg`).
    pub suffix_token: char,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            marker: '_',
            suffix_token: '_',
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
    Found {
        matched_key: ArcStr,
        bytes: Bytes,
        strategy: Strategy,
    },
    NotFound {
        raw_path: String,
        candidates_tried: Vec<String>,
    },
}

impl ResolutionResult {
    pub fn is_found(&self) -> bool {
        matches!(self, ResolutionResult::Found { .. })
    }

    pub fn strategy(&self) -> Option<Strategy> {
        match self {
            ResolutionResult::Found { strategy, .. } => Some(*strategy),
            ResolutionResult::NotFound { .. } => None,
        }
    }

    pub fn matched_key(&self) -> Option<&str> {
        match self {
            ResolutionResult::Found { matched_key, .. } => Some(matched_key.as_str()),
            ResolutionResult::NotFound { .. } => None,
        }
    }
}

/// Ordered, de-duplicated list of attempted candidate paths.
#[derive(Debug, Default, Clone)]
pub struct Candidates(Vec<String>);

impl Candidates {
    pub fn push(&mut self, candidate: impl Into<String>) {
        let candidate = candidate.into();
        if !self.0.contains(&candidate) {
            self.0.push(candidate);
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

// ---------------------------------------------------------------------------
// PathResolver
// ---------------------------------------------------------------------------

/// The fallback chain.
#[derive(Debug)]
pub struct PathResolver {
    strategies: Vec<Box<dyn ResolutionStrategy>>,
}

impl PathResolver {
    /// The standard chain, in its fixed order.
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_strategies(vec![
            Box::new(ExactMatch),
            Box::new(TrailingMarker::new(config.marker)),
            Box::new(SeparatorSwap),
            Box::new(CaseInsensitive),
            Box::new(SuffixToken::new(config.suffix_token)),
            Box::new(ParentDirectory),
            Box::new(Extensionless),
        ])
    }

    pub fn with_strategies(strategies: Vec<Box<dyn ResolutionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Strategy tags in the order they run.
    pub fn order(&self) -> Vec<Strategy> {
        self.strategies.iter().map(|s| s.strategy()).collect()
    }

    /// Resolve a canonical path against one snapshot.
    pub fn resolve(&self, snapshot: &Snapshot, canonical_path: &str) -> ResolutionResult {
        let mut tried = Candidates::default();

        for rule in &self.strategies {
            if let Some(asset) = rule.try_resolve(snapshot, canonical_path, &mut tried) {
                return ResolutionResult::Found {
                    matched_key: asset.path,
                    bytes: asset.bytes,
                    strategy: rule.strategy(),
                };
            }
            debug!(path = canonical_path, rule = %rule.strategy(), "rule missed");
        }

        ResolutionResult::NotFound {
            raw_path: canonical_path.to_string(),
            candidates_tried: tried.into_vec(),
        }
    }
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}
