//! Root Document Patcher
//!
//! Injects a compatibility block into the bundle's root document:
//! - a `<base href>` pointing at the mount point, unless the document has one
//! - a script forcing `preserveDrawingBuffer` on WebGL contexts, so external
//!   screenshot capture can read the canvas after a frame is presented
//!
//! Injection is textual. The block lands right after `<head>`, inside a new
//! head after `<html>` when there is none, or at the very start otherwise.
//! Tags inside `<!-- -->` comments are ignored.

use std::ops::Range;

use regex::{Match, Regex};
use thiserror::Error;

/// Attribute marking the injected script. Its presence prevents re-patching.
pub const PATCH_MARKER: &str = "data-memhost-patch";

const CANVAS_PATCH_JS: &str = r#"(function () {
  var proto = window.HTMLCanvasElement && HTMLCanvasElement.prototype;
  if (!proto || proto.__memhostPreserve) return;
  var getContext = proto.getContext;
  proto.getContext = function (type, attributes) {
    if (type === "webgl" || type === "webgl2" || type === "experimental-webgl") {
      attributes = Object.assign({}, attributes, { preserveDrawingBuffer: true });
    }
    return getContext.call(this, type, attributes);
  };
  proto.__memhostPreserve = true;
})();"#;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Root document is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("Invalid tag pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// The root-document injector.
#[derive(Debug, Clone)]
pub struct DocumentPatcher {
    base_href: String,
    head_tag: Regex,
    html_tag: Regex,
    doctype: Regex,
    base_tag: Regex,
    comment: Regex,
}

impl DocumentPatcher {
    pub fn new(base_href: impl Into<String>) -> Result<Self, PatchError> {
        Ok(Self {
            base_href: base_href.into(),
            head_tag: Regex::new(r"(?i)<head(?:\s[^>]*)?>")?,
            html_tag: Regex::new(r"(?i)<html(?:\s[^>]*)?>")?,
            doctype: Regex::new(r"(?i)<!doctype[^>]*>")?,
            base_tag: Regex::new(r"(?i)<base[\s/>]")?,
            comment: Regex::new(r"(?s)<!--.*?-->")?,
        })
    }

    pub fn base_href(&self) -> &str {
        &self.base_href
    }

    /// Patch raw document bytes.
    pub fn patch(&self, document: &[u8]) -> Result<Vec<u8>, PatchError> {
        let html = std::str::from_utf8(document)?;
        Ok(self.patch_str(html).into_bytes())
    }

    /// Patch decoded document text. Already-patched documents come back
    /// unchanged.
    pub fn patch_str(&self, html: &str) -> String {
        if html.contains(PATCH_MARKER) {
            return html.to_string();
        }

        let comments: Vec<Range<usize>> =
            self.comment.find_iter(html).map(|m| m.range()).collect();
        let has_base = find_outside(&self.base_tag, html, &comments).is_some();
        let block = self.injection_block(!has_base);

        if let Some(head) = find_outside(&self.head_tag, html, &comments) {
            return splice(html, head.end(), &block);
        }
        if let Some(root) = find_outside(&self.html_tag, html, &comments) {
            return splice(html, root.end(), &format!("<head>{block}</head>"));
        }
        if let Some(doctype) = find_outside(&self.doctype, html, &comments) {
            return splice(html, doctype.end(), &block);
        }
        format!("{block}{html}")
    }

    fn injection_block(&self, with_base: bool) -> String {
        let mut block = String::new();
        if with_base {
            block.push_str(&format!(
                r#"<base href="{}">"#,
                escape_attr(&self.base_href)
            ));
        }
        block.push_str(&format!("<script {PATCH_MARKER}>{CANVAS_PATCH_JS}</script>"));
        block
    }
}

/// First match of `pattern` that does not start inside a comment span.
fn find_outside<'h>(pattern: &Regex, html: &'h str, comments: &[Range<usize>]) -> Option<Match<'h>> {
    pattern
        .find_iter(html)
        .find(|m| !comments.iter().any(|span| span.contains(&m.start())))
}

fn splice(html: &str, at: usize, insert: &str) -> String {
    let mut out = String::with_capacity(html.len() + insert.len());
    out.push_str(&html[..at]);
    out.push_str(insert);
    out.push_str(&html[at..]);
    out
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
