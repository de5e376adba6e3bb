//! Transcript artifact body handling.
//!
//! The artifact format is not guaranteed: structured JSON with a `text` or
//! `transcript` field, a list of timed segments, or plain text. Anything that
//! does not parse falls back to the raw body.

use serde_json::Value;

/// Extract transcript text from a raw artifact body.
pub fn extract_text(raw: &str) -> String {
    let Ok(data) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };

    if let Some(text) = data.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(text) = data.get("transcript").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(segments) = data.get("segments").and_then(Value::as_array) {
        let lines: Vec<&str> = segments
            .iter()
            .filter_map(|s| s.get("text").and_then(Value::as_str))
            .collect();
        if !lines.is_empty() {
            return lines.join("\n");
        }
    }

    raw.to_string()
}

/// Truncate to a character budget, respecting UTF-8 boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
