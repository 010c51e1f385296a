//! Raw field values and their typed conversions.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value as JsonValue};

/// An untrusted input row: field name to JSON-like value.
pub type RawRecord = Map<String, JsonValue>;

/// Accepted naive timestamp layouts, tried in order after RFC 3339.
///
/// RFC 3339 stamps (`2021-01-01T00:00:00+01:00`, `...Z`) keep the wall-clock
/// time of their offset. A bare `%Y-%m-%d` date is read as midnight.
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
];

pub fn is_scalar(value: &JsonValue) -> bool {
    !matches!(value, JsonValue::Array(_) | JsonValue::Object(_))
}

pub fn describe_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

pub fn parse_timestamp(value: &str, formats: &[&str]) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_local());
    }
    for fmt in formats {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Reads a timestamp field. Only strings are considered timestamps.
pub fn timestamp_value(value: Option<&JsonValue>, formats: &[&str]) -> Option<NaiveDateTime> {
    match value? {
        JsonValue::String(text) => parse_timestamp(text, formats),
        _ => None,
    }
}

/// Coerces a measure to a finite float; anything else is `None`.
pub fn measure_value(value: &JsonValue) -> Option<f64> {
    let number = match value {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(text) => text.trim().parse::<f64>().ok()?,
        JsonValue::Bool(flag) => {
            if *flag {
                1.0
            } else {
                0.0
            }
        }
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Renders a categorical value as text; null and blank strings are missing.
pub fn category_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}
