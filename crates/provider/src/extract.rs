//! Marker-based extraction of JSON/HTML segments from model replies
//!
//! The prompt instructs the model to bound the machine-parseable parts of
//! its reply with `JSON_START`/`JSON_END` and `HTML_START`/`HTML_END`
//! markers, but the model is not contractually bound to that format: it
//! sometimes bolds the markers, wraps segments in fenced code blocks, or
//! appends prose after the closing marker. The extractor tries an ordered
//! cascade of patterns and, for the JSON segment, falls back to
//! brace-balanced recovery.

use regex::Regex;
use tracing::debug;

/// Markers the prompt instructs the model to emit around the summary JSON.
pub const JSON_START: &str = "JSON_START";
pub const JSON_END: &str = "JSON_END";
/// Markers bounding the HTML report.
pub const HTML_START: &str = "HTML_START";
pub const HTML_END: &str = "HTML_END";

/// Extract the segment bounded by `start_marker`/`end_marker` from a raw
/// model reply. Returns `None` when no pattern matches.
///
/// Patterns are tried in order until one captures:
/// 1. plain `START...END`
/// 2. `**START**...END` (the model sometimes bolds the opening marker)
/// 3. a ```` ```json ```` fenced block
/// 4. a ```` ```html ```` fenced block
///
/// A captured segment is trimmed and stripped of any residual code fence.
/// When the target is the JSON segment, brace-balanced recovery is applied
/// on top; the recovered object is re-serialized so the caller always gets
/// parseable JSON when recovery succeeds.
pub fn extract_segment(content: &str, start_marker: &str, end_marker: &str) -> Option<String> {
    // The model occasionally emits the markers bolded; match on the bare form.
    let start = clean_marker(start_marker);
    let end = clean_marker(end_marker);
    let escaped_start = regex::escape(&start);
    let escaped_end = regex::escape(&end);

    let patterns = [
        format!(r"(?s){escaped_start}(.*?){escaped_end}"),
        format!(r"(?s)\*\*{escaped_start}\*\*(.*?){escaped_end}"),
        r"(?s)```json\s*(.*?)```".to_string(),
        r"(?s)```html\s*(.*?)```".to_string(),
    ];

    for pattern in &patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                debug!(pattern, error = %e, "skipping unbuildable extraction pattern");
                continue;
            }
        };
        let Some(captures) = re.captures(content) else {
            continue;
        };
        let Some(segment) = captures.get(1) else {
            continue;
        };

        let extracted = strip_fence(segment.as_str().trim());

        if start == JSON_START && end == JSON_END {
            if let Some(value) = recover_json(&extracted) {
                return Some(value.to_string());
            }
        }

        return Some(extracted);
    }

    None
}

/// Strip asterisks from a marker so `**JSON_START**` and `JSON_START`
/// compare equal.
fn clean_marker(marker: &str) -> String {
    marker.replace('*', "").trim().to_string()
}

/// Remove a residual markdown code fence around an extracted segment.
fn strip_fence(segment: &str) -> String {
    let mut cleaned = segment.trim();
    for prefix in ["```json", "```html", "```"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest.trim_start();
            break;
        }
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest.trim_end();
    }
    cleaned.to_string()
}

/// Brace-balanced JSON recovery.
///
/// Scans for the widest candidate first: from each `{` (left to right),
/// try every closing `}` from the rightmost inward until a candidate
/// parses. The first successful parse wins, which makes the contract
/// "first successful parse from the widest candidate" rather than any
/// notion of a best object.
pub fn recover_json(text: &str) -> Option<serde_json::Value> {
    let mut open = text.find('{');
    while let Some(start) = open {
        let mut search_end = text.len();
        while let Some(close) = text[..search_end].rfind('}') {
            if close <= start {
                break;
            }
            let candidate = &text[start..=close];
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
                return Some(value);
            }
            search_end = close;
        }
        open = text[start + 1..].find('{').map(|i| start + 1 + i);
    }
    None
}
