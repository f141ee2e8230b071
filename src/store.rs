//! In-memory Asset Store
//!
//! Holds the loaded bundle as an immutable [`Snapshot`]. A load builds the
//! next table off to the side and publishes it with one atomic swap, so a
//! request that took a snapshot resolves entirely against one generation.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use arcstr::ArcStr;
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::Value;

use crate::resolver::strip_decoration;

/// Decoration token used when none is configured.
pub const DEFAULT_SUFFIX_TOKEN: char = '_';

/// A stored bundle entry. Cloning shares the key and the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: ArcStr,
    pub bytes: Bytes,
}

/// Case-fold a key for insensitive comparison.
/// Both separator styles fold to `/`.
pub fn fold_key(key: &str) -> String {
    key.replace('\\', "/").to_lowercase()
}

#[derive(Debug)]
struct Table {
    /// Entries in load order.
    entries: IndexMap<ArcStr, Bytes>,
    /// Folded key → position of the first entry with that folding.
    folded: HashMap<String, usize>,
    /// Folded, decoration-stripped key → position of the first entry.
    stripped: HashMap<String, usize>,
    suffix_token: char,
    metadata: Option<Value>,
}

impl Table {
    fn build<I, K>(entries: I, metadata: Option<Value>, suffix_token: char) -> Self
    where
        I: IntoIterator<Item = (K, Bytes)>,
        K: Into<ArcStr>,
    {
        let mut map: IndexMap<ArcStr, Bytes> = IndexMap::new();
        for (key, bytes) in entries {
            // Overwrite keeps the first position.
            map.insert(key.into(), bytes);
        }

        let mut folded = HashMap::with_capacity(map.len());
        let mut stripped = HashMap::new();
        for (index, key) in map.keys().enumerate() {
            folded.entry(fold_key(key)).or_insert(index);
            if let Some(plain) = strip_decoration(key, suffix_token) {
                stripped.entry(fold_key(&plain)).or_insert(index);
            }
        }

        Self {
            entries: map,
            folded,
            stripped,
            suffix_token,
            metadata,
        }
    }
}

/// One published generation of the asset table.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    table: Arc<Table>,
}

impl Snapshot {
    /// Generation number. `0` is the empty table present at start.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.table.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.entries.is_empty()
    }

    /// Exact key lookup.
    pub fn get(&self, key: &str) -> Option<Asset> {
        self.table
            .entries
            .get_key_value(key)
            .map(|(path, bytes)| Asset {
                path: path.clone(),
                bytes: bytes.clone(),
            })
    }

    /// Case-insensitive lookup (either separator style).
    /// Returns the first matching entry in load order.
    pub fn find_folded(&self, key: &str) -> Option<Asset> {
        let index = *self.table.folded.get(&fold_key(key))?;
        self.at(index)
    }

    /// Find the first stored key whose decoration-stripped form folds to the
    /// same value as `key`. `Theme_fin.ogg` answers `theme.ogg`.
    pub fn find_stripped(&self, key: &str) -> Option<Asset> {
        let index = *self.table.stripped.get(&fold_key(key))?;
        self.at(index)
    }

    /// Token the stripped index was built with.
    pub fn suffix_token(&self) -> char {
        self.table.suffix_token
    }

    fn at(&self, index: usize) -> Option<Asset> {
        self.table
            .entries
            .get_index(index)
            .map(|(path, bytes)| Asset {
                path: path.clone(),
                bytes: bytes.clone(),
            })
    }

    /// Keys in load order.
    pub fn keys(&self) -> impl Iterator<Item = &ArcStr> {
        self.table.entries.keys()
    }

    /// Metadata supplied with the load, if any.
    pub fn metadata(&self) -> Option<&Value> {
        self.table.metadata.as_ref()
    }
}

/// Thread-safe holder of the current [`Snapshot`].
#[derive(Debug)]
pub struct AssetStore {
    current: ArcSwap<Snapshot>,
    suffix_token: char,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::with_suffix_token(DEFAULT_SUFFIX_TOKEN)
    }

    /// Store whose snapshots index keys with `suffix_token` decorations
    /// stripped.
    pub fn with_suffix_token(suffix_token: char) -> Self {
        let empty = Snapshot {
            generation: 0,
            table: Arc::new(Table::build(
                Vec::<(ArcStr, Bytes)>::new(),
                None,
                suffix_token,
            )),
        };
        Self {
            current: ArcSwap::from_pointee(empty),
            suffix_token,
        }
    }

    /// Replace the whole table and return the new generation.
    ///
    /// The table is built before publication; readers see either the old
    /// snapshot or the new one.
    pub fn load<I, K>(&self, entries: I, metadata: Option<Value>) -> u64
    where
        I: IntoIterator<Item = (K, Bytes)>,
        K: Into<ArcStr>,
    {
        let table = Arc::new(Table::build(entries, metadata, self.suffix_token));
        let previous = self.current.rcu(|current| Snapshot {
            generation: current.generation + 1,
            table: Arc::clone(&table),
        });
        previous.generation + 1
    }

    /// Current snapshot. Hold it for the whole request.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Retrieve asset bytes from the current snapshot.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.current.load().get(key).map(|asset| asset.bytes)
    }

    /// Keys of the current snapshot in load order. Diagnostics only.
    pub fn keys(&self) -> Vec<ArcStr> {
        self.current.load().keys().cloned().collect()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }
}

impl Default for AssetStore {
    fn default() -> Self {
        Self::new()
    }
}
