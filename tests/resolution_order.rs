//! Rule-priority tests for the resolution chain.
//!
//! Several rules can each find a different stored key in an ambiguous
//! bundle; the first rule in the fixed order must always decide.

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use memhost::{AssetStore, PathResolver, ResolutionResult, Snapshot, Strategy};
use pretty_assertions::assert_eq;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn snapshot(keys: &[&str]) -> Arc<Snapshot> {
    let store = AssetStore::new();
    store.load(
        keys.iter()
            .map(|k| (k.to_string(), Bytes::from(format!("body of {k}")))),
        None,
    );
    store.snapshot()
}

fn resolve(keys: &[&str], path: &str) -> (Option<String>, Option<Strategy>) {
    let result = PathResolver::default().resolve(&snapshot(keys), path);
    (result.matched_key().map(str::to_string), result.strategy())
}

/// Deterministically scramble ASCII case.
fn scramble(key: &str, seed: usize) -> String {
    key.chars()
        .enumerate()
        .map(|(i, c)| {
            if (i + seed) % 2 == 0 {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect()
}

// ============================================================================
// Exact beats fuzzy
// ============================================================================

#[test]
fn exact_match_wins_over_case_insensitive_regardless_of_order() {
    for keys in [["a/B.txt", "a/b.txt"], ["a/b.txt", "a/B.txt"]] {
        assert_eq!(
            resolve(&keys, "a/b.txt"),
            (Some("a/b.txt".into()), Some(Strategy::Exact)),
            "load order {keys:?}"
        );
    }
}

#[test]
fn verbatim_keys_always_resolve_exactly() {
    let keys = [
        "index.html",
        "img/Hero.PNG",
        "audio/bgm/Theme_fin.ogg",
        "sprite.png_",
        "www\\legacy\\a.js",
        "data/levels",
        "data/levels.json",
    ];
    let snap = snapshot(&keys);
    let resolver = PathResolver::default();
    for key in keys {
        let result = resolver.resolve(&snap, key);
        assert_eq!(result.matched_key(), Some(key));
        assert_eq!(result.strategy(), Some(Strategy::Exact), "{key}");
    }
}

#[test]
fn trailing_marker_beats_case_insensitive() {
    // `img/a.png_` folds to itself too; the marker trim must come first.
    assert_eq!(
        resolve(&["IMG/A.PNG_", "img/a.png"], "img/a.png_"),
        (Some("img/a.png".into()), Some(Strategy::TrailingMarker))
    );
}

#[test]
fn separator_swap_beats_case_insensitive() {
    assert_eq!(
        resolve(&["IMG/a.png", "img/a.png"], "img\\a.png"),
        (Some("img/a.png".into()), Some(Strategy::Separator))
    );
}

#[test]
fn case_insensitive_beats_suffix_token() {
    assert_eq!(
        resolve(&["audio/Theme.ogg", "audio/theme_fin.ogg"], "audio/THEME_FIN.ogg"),
        (Some("audio/theme_fin.ogg".into()), Some(Strategy::CaseInsensitive))
    );
}

#[test]
fn suffix_token_beats_parent_directory() {
    assert_eq!(
        resolve(&["Theme.ogg", "bgm/Theme_v2.ogg"], "bgm/theme.ogg"),
        (Some("bgm/Theme_v2.ogg".into()), Some(Strategy::SuffixToken))
    );
}

#[test]
fn parent_directory_beats_extensionless() {
    assert_eq!(
        resolve(&["www/data/map", "data/map.json"], "www/data/map.json"),
        (Some("data/map.json".into()), Some(Strategy::ParentDirectory))
    );
}

#[test]
fn extensionless_is_last_resort() {
    assert_eq!(
        resolve(&["data/map"], "data/map.json"),
        (Some("data/map".into()), Some(Strategy::Extensionless))
    );
}

// ============================================================================
// Case-insensitive determinism
// ============================================================================

#[test]
fn scrambled_case_resolves_to_original_key() {
    let keys = ["img/Hero.PNG", "js/Main.js", "audio/se/Cursor1.ogg"];
    let snap = snapshot(&keys);
    let resolver = PathResolver::default();

    for key in keys {
        for seed in 0..2 {
            let scrambled = scramble(key, seed);
            if scrambled == key {
                continue;
            }
            match resolver.resolve(&snap, &scrambled) {
                ResolutionResult::Found {
                    matched_key,
                    strategy,
                    ..
                } => {
                    assert_eq!(matched_key.as_str(), key);
                    assert_eq!(strategy, Strategy::CaseInsensitive);
                }
                other => panic!("{scrambled}: expected Found, got {other:?}"),
            }
        }
    }
}

#[test]
fn ambiguous_case_fold_is_stable_within_a_generation() {
    let snap = snapshot(&["Img/Hero.png", "img/HERO.png", "IMG/hero.PNG"]);
    let resolver = PathResolver::default();
    let first = resolver.resolve(&snap, "img/hero.png");
    for _ in 0..10 {
        assert_eq!(resolver.resolve(&snap, "img/hero.png"), first);
    }
    assert_eq!(first.matched_key(), Some("Img/Hero.png"));
}

// ============================================================================
// Atomic reload
// ============================================================================

#[test]
fn concurrent_readers_never_see_a_mixed_table() {
    let store = Arc::new(AssetStore::new());
    store.load(vec![("x".to_string(), Bytes::from_static(b"x"))], None);

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..200 {
                let key = if i % 2 == 0 { "y" } else { "x" };
                store.load(vec![(key.to_string(), Bytes::from_static(b"v"))], None);
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let resolver = PathResolver::default();
                for _ in 0..500 {
                    let snap = store.snapshot();
                    let x = resolver.resolve(&snap, "x").is_found();
                    let y = resolver.resolve(&snap, "y").is_found();
                    // Each generation holds exactly one of the two keys.
                    assert!(x ^ y, "generation {} mixed", snap.generation());
                    assert!(!resolver.resolve(&snap, "z").is_found());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.generation(), 201);
}
