//! Defensive cleanup of raw model output.
//!
//! Models wrap JSON in commentary, code fences and stray control bytes.
//! [`normalize`] digs out the JSON payload and never fails; schema checks
//! happen afterwards in [`parse_response`].

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Output that could not be parsed into the expected record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Malformed response: {reason}")]
pub struct MalformedResponseError {
    pub reason: String,
    /// Leading part of the normalized payload, for diagnostics.
    pub excerpt: String,
}

const EXCERPT_CHARS: usize = 120;

/// Extract the JSON payload from raw model output.
///
/// Returns `{}` when no object or array opener is present, `[]` when an
/// array was opened but never closed, and `{}` for an unclosed object.
pub fn normalize(raw: &str) -> String {
    let cleaned = strip_fences(raw);

    let object_start = cleaned.find('{');
    let array_start = cleaned.find('[');

    let (start, open, close) = match (object_start, array_start) {
        (Some(o), Some(a)) if o < a => (o, '{', '}'),
        (Some(o), None) => (o, '{', '}'),
        (_, Some(a)) => (a, '[', ']'),
        (None, None) => return "{}".to_string(),
    };

    let empty = if open == '{' { "{}" } else { "[]" };
    let Some(end) = cleaned.rfind(close) else {
        return empty.to_string();
    };
    if end < start {
        return empty.to_string();
    }

    let extracted: String = cleaned[start..=end]
        .chars()
        .filter(|c| !is_stripped_control(*c))
        .collect();
    let trimmed = extracted.trim();
    if trimmed.is_empty() {
        empty.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Normalize raw output and deserialize it.
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> Result<T, MalformedResponseError> {
    let payload = normalize(raw);
    serde_json::from_str(&payload).map_err(|e| MalformedResponseError {
        reason: e.to_string(),
        excerpt: payload.chars().take(EXCERPT_CHARS).collect(),
    })
}

/// 0x00-0x09, 0x0B-0x1F and 0x7F. Newlines survive.
fn is_stripped_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{09}' | '\u{0B}'..='\u{1F}' | '\u{7F}')
}

/// Remove ``` markers together with any language tag that follows them.
fn strip_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find("```") {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + 3..];
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        rest = &rest[tag_len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_plain_object() {
        assert_eq!(normalize(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_fenced_with_commentary() {
        let raw = "Sure! Here is the scene:\n```json\n{\"text\": \"Rain falls.\"}\n```\nEnjoy.";
        assert_eq!(normalize(raw), "{\"text\": \"Rain falls.\"}");
    }

    #[test]
    fn test_object_precedence() {
        assert_eq!(normalize(r#"x {"list": [1, 2]} y"#), r#"{"list": [1, 2]}"#);
        assert_eq!(normalize(r#"[{"a": 1}]"#), r#"[{"a": 1}]"#);
    }

    #[test]
    fn test_last_closer_of_same_kind() {
        let raw = r#"{"a": {"b": 2}} trailing } noise"#;
        assert_eq!(normalize(raw), r#"{"a": {"b": 2}} trailing }"#);
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(normalize(""), "{}");
        assert_eq!(normalize("no json here"), "{}");
        assert_eq!(normalize("[1, 2"), "[]");
        assert_eq!(normalize(r#"{"truncated": "#), "{}");
        assert_eq!(normalize("} before {"), "{}");
        assert_eq!(normalize("]["), "[]");
    }

    #[test]
    fn test_strips_control_characters() {
        let raw = "{\"a\":\u{01}\t \"b\"\u{7F}}\n";
        assert_eq!(normalize(raw), "{\"a\": \"b\"}");
    }

    #[test]
    fn test_total_over_awkward_inputs() {
        let samples = [
            "```", "``````", "{", "}", "[", "]", "{[}]", "\u{0}\u{1F}", "é{é}é", "```js\n[", "{\"a\":\"```\"}",
        ];
        for sample in samples {
            let out = normalize(sample);
            assert!(!out.is_empty(), "empty output for {sample:?}");
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        text: String,
    }

    #[test]
    fn test_parse_response() {
        let parsed: Payload = parse_response("```json\n{\"text\": \"ok\"}\n```").unwrap();
        assert_eq!(parsed.text, "ok");

        let err = parse_response::<Payload>("the model refused").unwrap_err();
        assert!(err.reason.contains("missing field"));
        assert_eq!(err.excerpt, "{}");
    }
}
