//! Request path normalization.
//!
//! Turns a raw request URL into the canonical, bundle-relative path that is
//! used verbatim as the first resolution candidate. Requests outside the
//! virtual mount point are declined.

use tracing::warn;
use url::Url;

/// Result of normalizing one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPath {
    /// Bundle-relative path, percent-decoded.
    pub path: String,
    /// Path component as it arrived, before scope/mount stripping.
    pub raw: String,
    /// Whether `path` names the root document.
    pub is_root: bool,
}

/// Scope/mount stripping and decoding for inbound requests.
#[derive(Debug, Clone)]
pub struct PathNormalizer {
    /// Deployment base path, always `/`-delimited on both ends.
    scope: String,
    /// Mount point with separators, e.g. `/game/`.
    mount: String,
    root_document: String,
}

impl PathNormalizer {
    pub fn new(scope: &str, mount_point: &str, root_document: impl Into<String>) -> Self {
        let mount_name = mount_point.trim_matches('/');
        let mount = if mount_name.is_empty() {
            "/".to_string()
        } else {
            format!("/{mount_name}/")
        };
        Self {
            scope: normalize_scope(scope),
            mount,
            root_document: root_document.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn root_document(&self) -> &str {
        &self.root_document
    }

    /// Absolute URL path under which bundle assets are addressed,
    /// e.g. `/repo/game/`.
    pub fn base_href(&self) -> String {
        format!("{}{}", self.scope, &self.mount[1..])
    }

    /// Normalize a raw request URL. `None` means the request is outside the
    /// mount point and must be left to ordinary handling.
    pub fn normalize(&self, raw_url: &str) -> Option<CanonicalPath> {
        let raw = extract_path(raw_url);

        let in_scope = match raw.strip_prefix(&self.scope) {
            Some(rest) => format!("/{rest}"),
            None if raw == self.scope.trim_end_matches('/') => "/".to_string(),
            None => raw.clone(),
        };

        let relative = in_scope.strip_prefix(&self.mount)?;

        let decoded = match urlencoding::decode(relative) {
            Ok(decoded) => decoded.into_owned(),
            Err(err) => {
                warn!(path = relative, error = %err, "percent-decoding failed, using raw path");
                relative.to_string()
            }
        };

        let path = if decoded.is_empty() {
            self.root_document.clone()
        } else if decoded.ends_with('/') || decoded.ends_with('\\') {
            format!("{decoded}{}", self.root_document)
        } else {
            decoded
        };

        let is_root = path == self.root_document;
        Some(CanonicalPath { path, raw, is_root })
    }
}

/// Normalize a deployment base path to `/…/` form. Empty becomes `/`.
pub fn normalize_scope(scope: &str) -> String {
    let trimmed = scope.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Strip scheme, host, query and fragment. The result always starts with `/`.
fn extract_path(raw_url: &str) -> String {
    if raw_url.contains("://") {
        if let Ok(url) = Url::parse(raw_url) {
            return url.path().to_string();
        }
    }

    let without_origin = match raw_url.find("://") {
        Some(scheme_end) => {
            let after = &raw_url[scheme_end + 3..];
            after.find('/').map_or("", |slash| &after[slash..])
        }
        None => raw_url,
    };
    let end = without_origin
        .find(['?', '#'])
        .unwrap_or(without_origin.len());
    let path = &without_origin[..end];

    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer(scope: &str) -> PathNormalizer {
        PathNormalizer::new(scope, "game", "index.html")
    }

    #[test]
    fn test_normalize_scope() {
        assert_eq!(normalize_scope(""), "/");
        assert_eq!(normalize_scope("/"), "/");
        assert_eq!(normalize_scope("repo"), "/repo/");
        assert_eq!(normalize_scope("/repo/sub/"), "/repo/sub/");
    }

    #[test]
    fn test_relative_path_under_mount() {
        let path = normalizer("/").normalize("game/img/hero.png").unwrap();
        assert_eq!(path.path, "img/hero.png");
        assert_eq!(path.raw, "/game/img/hero.png");
        assert!(!path.is_root);
    }

    #[test]
    fn test_absolute_url_with_query() {
        let path = normalizer("/")
            .normalize("https://example.test/game/js/main.js?v=3#top")
            .unwrap();
        assert_eq!(path.path, "js/main.js");
    }

    #[test]
    fn test_scope_prefix_is_stripped() {
        let n = normalizer("/user/repo/");
        assert_eq!(
            n.normalize("https://user.github.io/user/repo/game/data/map.json")
                .unwrap()
                .path,
            "data/map.json"
        );
        assert_eq!(n.base_href(), "/user/repo/game/");
    }

    #[test]
    fn test_outside_mount_is_declined() {
        let n = normalizer("/");
        assert_eq!(n.normalize("/index.html"), None);
        assert_eq!(n.normalize("/gamer/x.png"), None);
        assert_eq!(n.normalize("/game"), None);
    }

    #[test]
    fn test_percent_decoding() {
        let path = normalizer("/")
            .normalize("/game/audio/My%20Song.ogg")
            .unwrap();
        assert_eq!(path.path, "audio/My Song.ogg");
    }

    #[test]
    fn test_invalid_percent_encoding_keeps_raw() {
        // %FF alone is not valid UTF-8 once decoded.
        let path = normalizer("/").normalize("/game/bad%FFname.png").unwrap();
        assert_eq!(path.path, "bad%FFname.png");
    }

    #[test]
    fn test_root_document_substitution() {
        let n = normalizer("/");
        let root = n.normalize("game/").unwrap();
        assert_eq!(root.path, "index.html");
        assert!(root.is_root);

        let explicit = n.normalize("/game/index.html").unwrap();
        assert!(explicit.is_root);

        let nested = n.normalize("/game/www/").unwrap();
        assert_eq!(nested.path, "www/index.html");
        assert!(!nested.is_root);
    }

    #[test]
    fn test_base_href_at_root_scope() {
        assert_eq!(normalizer("").base_href(), "/game/");
    }
}
