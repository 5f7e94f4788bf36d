// crates/intake-gate-core/src/core/normalize.rs
// ============================================================================
// Module: Intake Gate Payload Normalizer
// Description: Content-type tolerant conversion of raw bodies to JSON values.
// Purpose: Accept JSON, form-encoded, and beacon-style text bodies uniformly.
// Dependencies: serde_json, url
// ============================================================================

//! ## Overview
//! Browsers submit lead forms in several shapes: `fetch` with JSON,
//! form posts, and `sendBeacon` calls that arrive as `text/plain` or
//! form-encoded bodies carrying a `json` field. The normalizer folds all of
//! them into one JSON object. Malformed input degrades to an empty object or
//! a `{"raw": ...}` wrapper; it never fails and never panics, so required
//! field validation happens exactly once, downstream.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;
use url::form_urlencoded;

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes a raw request body into a JSON object value.
///
/// - `application/json`: parsed; malformed bodies yield an empty object.
/// - `application/x-www-form-urlencoded`: decoded pairwise; a `json` field
///   that parses as a JSON object replaces the flat map.
/// - anything else (including a missing content type): the UTF-8 text is
///   parsed as JSON when possible, otherwise wrapped as `{"raw": "<text>"}`.
#[must_use]
pub fn normalize_payload(raw: &[u8], content_type: Option<&str>) -> Value {
    let declared = content_type.unwrap_or("").to_ascii_lowercase();
    if declared.contains("application/json") {
        return parse_json_object(raw).unwrap_or_else(|| Value::Object(Map::new()));
    }
    if declared.contains("application/x-www-form-urlencoded") {
        return parse_form_body(raw);
    }
    parse_json_object(raw).unwrap_or_else(|| wrap_raw_text(raw))
}

/// Parses bytes as JSON, accepting only object payloads.
fn parse_json_object(raw: &[u8]) -> Option<Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) | Err(_) => None,
    }
}

/// Decodes a form-encoded body into a JSON object, honoring a nested `json`
/// field when present.
fn parse_form_body(raw: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in form_urlencoded::parse(raw) {
        fields.insert(key.into_owned(), Value::String(value.into_owned()));
    }
    if let Some(Value::String(embedded)) = fields.get("json")
        && let Some(parsed) = parse_json_object(embedded.as_bytes())
    {
        return parsed;
    }
    Value::Object(fields)
}

/// Wraps non-JSON text as `{"raw": "<text>"}`, dropping invalid UTF-8.
fn wrap_raw_text(raw: &[u8]) -> Value {
    let text = String::from_utf8_lossy(raw).into_owned();
    let mut wrapper = Map::new();
    wrapper.insert("raw".to_string(), Value::String(text));
    Value::Object(wrapper)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::normalize_payload;

    #[test]
    fn json_bodies_parse() {
        let value = normalize_payload(br#"{"phone":"01012345678"}"#, Some("application/json"));
        assert_eq!(value, json!({"phone": "01012345678"}));
    }

    #[test]
    fn malformed_json_degrades_to_empty_object() {
        let value = normalize_payload(b"{not json", Some("application/json"));
        assert_eq!(value, json!({}));
    }

    #[test]
    fn form_bodies_decode_pairwise() {
        let value = normalize_payload(
            b"phone=010-1234-5678&region=Seoul",
            Some("application/x-www-form-urlencoded"),
        );
        assert_eq!(value, json!({"phone": "010-1234-5678", "region": "Seoul"}));
    }

    #[test]
    fn form_json_field_replaces_flat_map() {
        let value = normalize_payload(
            b"json=%7B%22phone%22%3A%22010%22%7D&ignored=1",
            Some("application/x-www-form-urlencoded"),
        );
        assert_eq!(value, json!({"phone": "010"}));
    }

    #[test]
    fn beacon_text_parses_as_json_or_wraps() {
        let parsed = normalize_payload(br#"{"phone":"010"}"#, Some("text/plain"));
        assert_eq!(parsed, json!({"phone": "010"}));
        let wrapped = normalize_payload(b"hello", None);
        assert_eq!(wrapped, json!({"raw": "hello"}));
    }

    #[test]
    fn non_object_json_is_rejected_not_adopted() {
        let value = normalize_payload(b"[1,2,3]", Some("application/json"));
        assert_eq!(value, json!({}));
    }
}
