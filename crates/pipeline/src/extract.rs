//! Payload extraction: recover the JSON object from raw reasoning text.
//!
//! Reasoning output often arrives wrapped in markdown code fences, prefixed
//! with a language tag, or surrounded by prose. This module only transforms
//! text; schema checking lives in [`crate::validator`].

use serde_json::{Map, Value};

const FENCE: &str = "```";

/// Extract the candidate JSON object from `raw`.
///
/// Fenced content is preferred when present; if nothing in the fence parses,
/// the whole text is searched. Within the chosen text, the first balanced
/// `{...}` span that parses as a JSON object is returned; if none parses, the
/// first balanced span is returned so the caller can report the parse
/// failure. `None` means no object-shaped text exists at all.
pub fn extract_payload(raw: &str) -> Option<&str> {
    let text = raw.trim();

    let fenced = fenced_block(text).map(scan_objects);
    if let Some((Some(parsed), _)) = fenced {
        return Some(parsed);
    }

    let (parsed, first) = scan_objects(text);
    parsed.or_else(|| fenced.and_then(|(_, f)| f)).or(first)
}

/// First span parsing as a JSON object, and the first balanced span.
fn scan_objects(text: &str) -> (Option<&str>, Option<&str>) {
    let mut first = None;
    for (start, _) in text.match_indices('{') {
        let Some(span) = balanced_object(&text[start..]) else {
            continue;
        };
        if serde_json::from_str::<Map<String, Value>>(span).is_ok() {
            return (Some(span), first);
        }
        first.get_or_insert(span);
    }
    (None, first)
}

/// Contents of the first code fence that contains an opening brace.
fn fenced_block(text: &str) -> Option<&str> {
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        // Skip the language tag line ("json", "JSON", ...)
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let (inner, remainder) = match body.find(FENCE) {
            Some(close) => (&body[..close], &body[close + FENCE.len()..]),
            None => (body, ""),
        };
        let inner = strip_language_tag(inner.trim());
        if inner.contains('{') {
            return Some(inner);
        }
        rest = remainder;
    }
    None
}

/// `json{...}` on a single line: drop the tag.
fn strip_language_tag(text: &str) -> &str {
    let lower = text.get(..4).map(str::to_ascii_lowercase);
    match lower.as_deref() {
        Some("json") => text[4..].trim_start(),
        _ => text,
    }
}

/// The balanced `{...}` prefix of `text`, which must start with `{`.
///
/// Braces inside JSON strings (including escaped quotes) are ignored.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_object_passes_through() {
        let raw = r#"{"fraud_risk_score": 10}"#;
        assert_eq!(extract_payload(raw), Some(raw));
    }

    #[test]
    fn strips_json_code_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_payload(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn strips_fence_without_language_tag() {
        let raw = "```\n{\"a\": [1, 2]}\n```";
        assert_eq!(extract_payload(raw), Some("{\"a\": [1, 2]}"));
    }

    #[test]
    fn fence_with_inline_tag() {
        let raw = "```json{\"a\": true}```";
        assert_eq!(extract_payload(raw), Some("{\"a\": true}"));
    }

    #[test]
    fn object_inside_prose() {
        let raw = "Here is my assessment:\n{\"score\": 7, \"notes\": \"ok\"}\nLet me know.";
        assert_eq!(extract_payload(raw), Some("{\"score\": 7, \"notes\": \"ok\"}"));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        let raw = r#"{"reason": "charge } looked {odd}", "quote": "say \"}\""}"#;
        assert_eq!(extract_payload(raw), Some(raw));
    }

    #[test]
    fn skips_non_json_brace_spans() {
        let raw = r#"Using {patient} data: {"score": 3}"#;
        assert_eq!(extract_payload(raw), Some(r#"{"score": 3}"#));
    }

    #[test]
    fn object_after_non_json_fence() {
        let raw = "```\nexample {x}\n```\n{\"score\": 3}";
        assert_eq!(extract_payload(raw), Some("{\"score\": 3}"));
    }

    #[test]
    fn fenced_span_reported_when_nothing_parses() {
        let raw = "{bad} before\n```\n{also: bad}\n```";
        assert_eq!(extract_payload(raw), Some("{also: bad}"));
    }

    #[test]
    fn unbalanced_or_missing_object() {
        assert_eq!(extract_payload("no json here"), None);
        assert_eq!(extract_payload("{\"a\": 1"), None);
    }

    #[test]
    fn returns_first_span_when_nothing_parses() {
        assert_eq!(extract_payload("{not: json}"), Some("{not: json}"));
    }
}
