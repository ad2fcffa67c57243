//! Line-oriented field extraction for oracle replies.
//!
//! Replies are expected to carry a `<format>...</format>` block of
//! JSON-looking lines, but the oracle regularly produces unescaped quotes
//! and trailing commas. Fields are therefore located by key on a single
//! trimmed line rather than by a JSON parser.

use regex::Regex;
use std::sync::LazyLock;

use crate::errors::ParseError;

static FORMAT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<format>(.*?)</format>").unwrap());

static BULLET_STRING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^- "(.*)"$"#).unwrap());

/// The text between the first `<format>` and `</format>`, or the whole reply.
pub fn format_section(reply: &str) -> &str {
    match FORMAT_REGEX.captures(reply).and_then(|cap| cap.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => reply.trim(),
    }
}

/// Trimmed, non-empty lines of the format section.
pub fn content_lines(reply: &str) -> impl Iterator<Item = &str> {
    format_section(reply)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

fn key_marker(key: &str) -> String {
    format!("\"{}\":", key)
}

/// Whether `line` carries `"key":`.
pub fn has_key(line: &str, key: &str) -> bool {
    line.contains(&key_marker(key))
}

/// Whether `line` carries every key in `keys`.
pub fn has_keys(line: &str, keys: &[&str]) -> bool {
    keys.iter().all(|key| has_key(line, key))
}

fn after_key<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let marker = key_marker(key);
    line.find(&marker).map(|pos| &line[pos + marker.len()..])
}

/// String value of `key` on `line`.
///
/// The value opens at the first `"` after the key. It closes right before
/// `", "next":` when `next` is given and present, else at the last `"` on
/// the line. Without an opening quote the raw remainder is returned with
/// any trailing comma removed.
pub fn string_field(line: &str, key: &str, next: Option<&str>) -> Option<String> {
    let rest = after_key(line, key)?;
    let Some(open) = rest.find('"') else {
        return Some(rest.trim().trim_end_matches(',').trim().to_string());
    };
    let value = &rest[open + 1..];

    if let Some(next) = next {
        let boundary = format!("\", {}", key_marker(next));
        if let Some(close) = value.find(&boundary) {
            return Some(value[..close].to_string());
        }
    }

    match value.rfind('"') {
        Some(close) => Some(value[..close].to_string()),
        None => Some(value.trim_end_matches(',').trim().to_string()),
    }
}

/// Integer value of `key` on `line`; `Ok(None)` when the key is absent.
///
/// The value ends at the next comma, so `"line": 5, "comment": ...` works.
pub fn int_field(line: &str, key: &'static str) -> Result<Option<i64>, ParseError> {
    let Some(rest) = after_key(line, key) else {
        return Ok(None);
    };
    let raw = rest.split(',').next().unwrap_or_default().trim().trim_matches('"');
    raw.parse::<i64>()
        .map(Some)
        .map_err(|_| ParseError::InvalidInteger {
            field: key,
            value: raw.to_string(),
        })
}

/// The remainder after `key` with surrounding whitespace and trailing commas removed.
pub fn raw_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    after_key(line, key).map(|rest| rest.trim().trim_end_matches(',').trim())
}

/// Content of a `- "..."` bullet line.
pub fn bullet_string(line: &str) -> Option<String> {
    BULLET_STRING_REGEX
        .captures(line)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_section_is_extracted() {
        let reply = "Some reasoning first.\n<format>\n\"id\": 2\n</format>\ntrailing words";
        assert_eq!(format_section(reply), "\"id\": 2");
    }

    #[test]
    fn test_whole_reply_used_without_format_tags() {
        assert_eq!(format_section("  \"id\": 2  \n"), "\"id\": 2");
        assert_eq!(format_section("<format> only opening"), "<format> only opening");
    }

    #[test]
    fn test_content_lines_skip_blanks() {
        let lines: Vec<_> = content_lines("<format>\n\n  a  \n\n b\n</format>").collect();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_string_field_uses_next_key_boundary() {
        let line = r#"- "name": "result", "detail": "the "final" sum""#;
        assert_eq!(string_field(line, "name", Some("detail")).unwrap(), "result");
        assert_eq!(string_field(line, "detail", None).unwrap(), r#"the "final" sum"#);
    }

    #[test]
    fn test_string_field_falls_back_to_last_quote() {
        let line = r#""analysis": "block 2 writes "x", which is wrong","#;
        assert_eq!(
            string_field(line, "analysis", None).unwrap(),
            r#"block 2 writes "x", which is wrong"#
        );
    }

    #[test]
    fn test_string_field_without_quotes_takes_remainder() {
        assert_eq!(string_field(r#""summary": plain text,"#, "summary", None).unwrap(), "plain text");
        assert!(string_field(r#""other": 1"#, "summary", None).is_none());
    }

    #[test]
    fn test_string_field_with_single_quote_keeps_tail() {
        assert_eq!(string_field(r#""intent": "unterminated,"#, "intent", None).unwrap(), "unterminated");
    }

    #[test]
    fn test_int_field_parses_and_stops_at_comma() {
        assert_eq!(int_field(r#""id": 3,"#, "id").unwrap(), Some(3));
        assert_eq!(int_field(r#"- "line": 12, "comment": "loop""#, "line").unwrap(), Some(12));
        assert_eq!(int_field(r#""fault": "1""#, "fault").unwrap(), Some(1));
        assert_eq!(int_field(r#""other": 3"#, "id").unwrap(), None);
    }

    #[test]
    fn test_int_field_rejects_garbage() {
        let err = int_field(r#""id": two"#, "id").unwrap_err();
        assert!(matches!(err, ParseError::InvalidInteger { field: "id", .. }));
    }

    #[test]
    fn test_key_detection_respects_quotes() {
        assert!(has_key(r#""start_line": 1"#, "start_line"));
        assert!(!has_key(r#""start_line": 1"#, "line"));
        assert!(has_keys(r#""a": 1, "b": 2"#, &["a", "b"]));
        assert!(!has_keys(r#""a": 1"#, &["a", "b"]));
    }

    #[test]
    fn test_bullet_string() {
        assert_eq!(bullet_string(r#"- "x grows by one""#).unwrap(), "x grows by one");
        assert!(bullet_string("- x grows").is_none());
    }
}
