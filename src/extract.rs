//! Lifting values out of semi-structured HTML, JavaScript and JSON blobs.
//!
//! Portal responses are inconsistent: some endpoints return well-formed JSON,
//! others inline a player config as a JavaScript object literal inside a
//! `<script>` tag. Everything that reads a raw field goes through this module
//! so a site can move from anchors to structured access by editing its profile.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?|ftp)://[^\s"'<>()\[\]{},\\]+"#)
        .expect("URL pattern is a valid regex")
});

/// Text strictly between the first `start` and the next `end` after it.
///
/// Returns `None` when either anchor is missing.
pub fn extract_between<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let rest = &text[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

/// Like [`extract_between`] but anchored on the last occurrence of `start`.
pub fn extract_between_last<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.rfind(start)? + start.len();
    let rest = &text[from..];
    let to = rest.find(end)?;
    Some(&rest[..to])
}

/// Every URL-looking substring of `text`, in order of appearance.
pub fn extract_urls(text: &str) -> Vec<String> {
    URL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Read a scalar at `pointer` (RFC 6901) if `text` is valid JSON.
///
/// Strings are returned verbatim, numbers and booleans rendered; `null`,
/// arrays and objects yield `None`.
pub fn json_pointer(text: &str, pointer: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    scalar_at(&value, pointer)
}

pub(crate) fn scalar_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Strip JavaScript/JSON backslash escapes from an anchor-extracted value.
pub fn unescape_js(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = if hex.len() == 4 && hex.chars().all(|h| h.is_ascii_hexdigit()) {
                    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
                } else {
                    None
                };
                match decoded {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Where a raw field lives inside a response body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldLocator {
    /// Structured access; the body must be valid JSON.
    Json { pointer: String },
    /// Substring between two static anchors.
    Anchors {
        start: String,
        end: String,
        #[serde(default)]
        last: bool,
    },
    /// JSON pointer when the body parses, anchors otherwise.
    JsonOrAnchors {
        pointer: String,
        start: String,
        end: String,
    },
}

impl FieldLocator {
    /// Locate the field in `text`. Empty values count as absent.
    pub fn locate(&self, text: &str) -> Option<String> {
        let found = match self {
            Self::Json { pointer } => json_pointer(text, pointer),
            Self::Anchors { start, end, last } => {
                let span = if *last {
                    extract_between_last(text, start, end)
                } else {
                    extract_between(text, start, end)
                };
                span.map(str::to_string)
            }
            Self::JsonOrAnchors {
                pointer,
                start,
                end,
            } => match serde_json::from_str::<Value>(text) {
                Ok(value) => scalar_at(&value, pointer),
                Err(_) => extract_between(text, start, end).map(str::to_string),
            },
        };
        found.filter(|s| !s.trim().is_empty())
    }
}
