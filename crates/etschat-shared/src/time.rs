//! Timestamp resolution helpers.
//!
//! Server timestamps arrive as ISO-8601 strings, but cached and relayed
//! frames occasionally carry raw epoch-millis numbers instead. Everything
//! that orders or compares messages goes through these helpers so the two
//! representations behave identically.

use chrono::{DateTime, Utc};

/// Parse a timestamp string to epoch millis.
///
/// Accepts RFC 3339 / ISO-8601 first, then a bare integer (epoch millis).
pub fn parse_epoch_millis(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis());
    }
    trimmed.parse::<i64>().ok()
}

/// Like [`parse_epoch_millis`] but unparsable values sort as epoch zero.
pub fn epoch_millis_or_zero(value: &str) -> i64 {
    parse_epoch_millis(value).unwrap_or(0)
}

/// Epoch millis from a loose JSON timestamp value (string or number).
pub fn epoch_millis_from_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::String(s) => parse_epoch_millis(s),
        serde_json::Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Current time as epoch millis.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current time as an RFC 3339 string, the format used for outbound frames.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let millis = parse_epoch_millis("2024-03-01T12:00:00Z").unwrap();
        assert_eq!(millis, 1_709_294_400_000);
    }

    #[test]
    fn test_parse_numeric_string() {
        assert_eq!(parse_epoch_millis("1709294400000"), Some(1_709_294_400_000));
    }

    #[test]
    fn test_unparsable_sorts_as_zero() {
        assert_eq!(epoch_millis_or_zero("not a date"), 0);
        assert_eq!(epoch_millis_or_zero(""), 0);
    }

    #[test]
    fn test_from_json_value() {
        let s = serde_json::json!("2024-03-01T12:00:00Z");
        let n = serde_json::json!(1_709_294_400_000i64);
        assert_eq!(epoch_millis_from_value(&s), Some(1_709_294_400_000));
        assert_eq!(epoch_millis_from_value(&n), Some(1_709_294_400_000));
        assert_eq!(epoch_millis_from_value(&serde_json::Value::Null), None);
    }
}
