//! Content-type and cache-policy classification by file extension.

use serde::Serialize;

/// Caching directive attached to a served asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Markup, scripts and stylesheets may change with the next bundle.
    NoCache,
    /// Everything else is immutable for the lifetime of a loaded bundle.
    Immutable,
}

impl CachePolicy {
    pub fn header_value(self) -> &'static str {
        match self {
            CachePolicy::NoCache => "no-cache",
            CachePolicy::Immutable => "public, max-age=31536000, immutable",
        }
    }
}

/// Classification of one resolved key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContentType {
    pub media_type: &'static str,
    pub charset_required: bool,
    pub cache_policy: CachePolicy,
}

impl ContentType {
    /// Value for the `Content-Type` header.
    pub fn header_value(&self) -> String {
        if self.charset_required {
            format!("{}; charset=utf-8", self.media_type)
        } else {
            self.media_type.to_string()
        }
    }
}

pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Classify a resolved key by its lowercased final extension.
pub fn classify(matched_key: &str) -> ContentType {
    let file = matched_key
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(matched_key);
    let ext = file
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let (media_type, text) = match ext.as_str() {
        // markup / script / stylesheet
        "html" | "htm" => ("text/html", true),
        "js" | "mjs" | "cjs" => ("text/javascript", true),
        "css" => ("text/css", true),
        // data
        "json" | "map" => ("application/json", false),
        "wasm" => ("application/wasm", false),
        // images
        "png" => ("image/png", false),
        "jpg" | "jpeg" => ("image/jpeg", false),
        "gif" => ("image/gif", false),
        "webp" => ("image/webp", false),
        "bmp" => ("image/bmp", false),
        "ico" => ("image/x-icon", false),
        "svg" => ("image/svg+xml", false),
        // audio
        "ogg" | "oga" => ("audio/ogg", false),
        "m4a" => ("audio/mp4", false),
        "mp3" => ("audio/mpeg", false),
        "wav" => ("audio/wav", false),
        "flac" => ("audio/flac", false),
        "opus" => ("audio/opus", false),
        // video
        "mp4" | "m4v" => ("video/mp4", false),
        "webm" => ("video/webm", false),
        "ogv" => ("video/ogg", false),
        // fonts
        "woff" => ("font/woff", false),
        "woff2" => ("font/woff2", false),
        "ttf" => ("font/ttf", false),
        "otf" => ("font/otf", false),
        _ => (FALLBACK_MEDIA_TYPE, false),
    };

    ContentType {
        media_type,
        charset_required: text,
        cache_policy: if text {
            CachePolicy::NoCache
        } else {
            CachePolicy::Immutable
        },
    }
}
