//! Secret redaction for stored headers and bodies.
//!
//! Redacted values take the form `<redacted:N>` where N is the byte length
//! of the original value, so operators can still spot truncated or malformed
//! credentials without seeing them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Header names whose values are always redacted (case-insensitive).
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-api-key",
    "api-key",
    "anthropic-api-key",
    "openai-api-key",
    "proxy-authorization",
    "cookie",
];

static BEARER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Bearer\s+[A-Za-z0-9._\-]+").expect("valid bearer regex"));

static ALREADY_REDACTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<redacted:\d+>$").expect("valid redacted regex"));

fn placeholder(len: usize) -> String {
    format!("<redacted:{len}>")
}

/// Redact a single header value given its name.
fn redact_value(name: &str, value: &str) -> String {
    if ALREADY_REDACTED.is_match(value) {
        return value.to_string();
    }
    let name_lower = name.to_lowercase();
    if SENSITIVE_HEADERS.contains(&name_lower.as_str()) || BEARER_PATTERN.is_match(value) {
        placeholder(value.len())
    } else {
        value.to_string()
    }
}

/// Redact secret material from a header map. Idempotent: applying twice
/// yields the same output. When `redact` is false the map passes through.
pub fn redact_headers(headers: &BTreeMap<String, String>, redact: bool) -> BTreeMap<String, String> {
    if !redact {
        return headers.clone();
    }
    headers
        .iter()
        .map(|(name, value)| (name.clone(), redact_value(name, value)))
        .collect()
}

/// Redact bearer-shaped spans inside a raw body string. Only used when body
/// redaction is configured on.
pub fn redact_body(body: &str) -> String {
    BEARER_PATTERN
        .replace_all(body, |caps: &regex::Captures| placeholder(caps[0].len()))
        .into_owned()
}
