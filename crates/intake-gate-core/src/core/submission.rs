// crates/intake-gate-core/src/core/submission.rs
// ============================================================================
// Module: Intake Gate Submission Types
// Description: Normalized inbound submission and lead business fields.
// Purpose: Provide a sanitized, bounded representation of untrusted input.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`SubmissionRequest`] is the normalized form of one inbound request.
//! Extraction is tolerant of both the nested `{lock: {...}, lead: {...}}`
//! JSON shape and flat form-encoded keys, but every business field is
//! sanitized and truncated before it can reach a store. Extraction never
//! guesses at missing business fields and never panics on malformed input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Field Limits
// ============================================================================

/// Maximum stored length of a phone number.
pub const MAX_PHONE_LENGTH: usize = 32;
/// Maximum stored length of a session/ad key.
pub const MAX_SESSION_KEY_LENGTH: usize = 128;
/// Maximum accepted length of a caller-supplied idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 128;
/// Maximum stored length of a region label.
pub const MAX_REGION_LENGTH: usize = 64;
/// Maximum stored length of an address.
pub const MAX_ADDRESS_LENGTH: usize = 256;
/// Maximum stored length of a reservation date string.
pub const MAX_RESERVED_DATE_LENGTH: usize = 32;
/// Maximum stored length of a contact preference label.
pub const MAX_CONTACT_PREF_LENGTH: usize = 32;
/// Maximum stored length of a free-form memo.
pub const MAX_MEMO_LENGTH: usize = 2000;
/// Maximum stored length of a single equipment code.
pub const MAX_EQUIPMENT_CODE_LENGTH: usize = 32;
/// Maximum number of equipment codes retained per submission.
pub const MAX_EQUIPMENT_CODES: usize = 16;
/// Maximum accepted length of a caller-supplied lock key.
pub const MAX_LOCK_KEY_LENGTH: usize = 128;
/// Maximum accepted length of a logical table name.
pub const MAX_TABLE_NAME_LENGTH: usize = 64;

// ============================================================================
// SECTION: Sanitization
// ============================================================================

/// Sanitizes one untrusted text field: strips control characters, trims
/// surrounding whitespace, and truncates to `max_chars` characters.
///
/// Returns `None` when the sanitized result is empty.
#[must_use]
pub fn sanitize_field(raw: &str, max_chars: usize) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_chars).collect())
}

/// Canonicalizes a phone number: keeps digits and one leading `+`.
///
/// Returns `None` when no digits remain.
#[must_use]
pub fn canonicalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut canonical = String::new();
    for (index, c) in trimmed.chars().enumerate() {
        if c == '+' && index == 0 {
            canonical.push(c);
        } else if c.is_ascii_digit() {
            canonical.push(c);
        }
    }
    if canonical.chars().any(|c| c.is_ascii_digit()) {
        Some(canonical.chars().take(MAX_PHONE_LENGTH).collect())
    } else {
        None
    }
}

/// Interprets a JSON value as a tolerant boolean flag.
///
/// Accepts JSON booleans, the strings `true/1/y/yes/on` (case-insensitive),
/// and the numbers `0`/`1`. Anything else is `false`.
#[must_use]
fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1" | "y" | "yes" | "on")
        }
        Value::Number(number) => number.as_i64() == Some(1),
        _ => false,
    }
}

/// Reads a string-ish JSON value (string or number) as text.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Looks up `key` in `primary`, falling back to the same key in `nested`.
fn lookup<'a>(primary: &'a Value, nested: Option<&'a Value>, key: &str) -> Option<&'a Value> {
    primary
        .get(key)
        .or_else(|| nested.and_then(|section| section.get(key)))
}

/// Reads an optional sanitized text field from the payload.
fn text_field(primary: &Value, nested: Option<&Value>, key: &str, max: usize) -> Option<String> {
    lookup(primary, nested, key)
        .and_then(value_as_text)
        .and_then(|raw| sanitize_field(&raw, max))
}

/// Reads an optional non-negative integer field from the payload.
fn millis_field(primary: &Value, nested: Option<&Value>, key: &str) -> Option<u64> {
    lookup(primary, nested, key).and_then(|value| match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    })
}

// ============================================================================
// SECTION: Lead Fields
// ============================================================================

/// Sanitized business attributes of one lead submission.
///
/// # Invariants
/// - Every field has passed [`sanitize_field`] with its per-field cap.
/// - `phone` is canonical: digits with an optional leading `+`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadFields {
    /// Canonical phone number.
    pub phone: Option<String>,
    /// Session or advertising key from the submitting page.
    pub session_key: Option<String>,
    /// Region label.
    pub region: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Requested reservation/visit date as submitted.
    pub reserved_date: Option<String>,
    /// Preferred contact channel.
    pub contact_pref: Option<String>,
    /// Free-form memo.
    pub memo: Option<String>,
    /// Privacy-policy consent flag.
    pub agree_privacy: bool,
    /// Marketing-contact consent flag.
    pub agree_marketing: bool,
    /// Equipment interest codes.
    pub equipment: Vec<String>,
}

impl LeadFields {
    /// Extracts sanitized lead fields from a normalized payload value.
    ///
    /// `nested` is the `lead` sub-object when the payload uses the nested
    /// shape; flat top-level keys are honored either way.
    fn from_value(payload: &Value, nested: Option<&Value>) -> Self {
        let phone = lookup(payload, nested, "phone")
            .and_then(value_as_text)
            .and_then(|raw| canonicalize_phone(&raw));
        let equipment = lookup(payload, nested, "equipment")
            .map(|value| match value {
                Value::Array(items) => items
                    .iter()
                    .filter_map(value_as_text)
                    .filter_map(|raw| sanitize_field(&raw, MAX_EQUIPMENT_CODE_LENGTH))
                    .take(MAX_EQUIPMENT_CODES)
                    .collect(),
                // Form-encoded bodies submit one comma-joined string.
                Value::String(joined) => joined
                    .split(',')
                    .filter_map(|raw| sanitize_field(raw, MAX_EQUIPMENT_CODE_LENGTH))
                    .take(MAX_EQUIPMENT_CODES)
                    .collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        Self {
            phone,
            session_key: text_field(payload, nested, "session_key", MAX_SESSION_KEY_LENGTH),
            region: text_field(payload, nested, "region", MAX_REGION_LENGTH),
            address: text_field(payload, nested, "address", MAX_ADDRESS_LENGTH),
            reserved_date: text_field(payload, nested, "reserved_date", MAX_RESERVED_DATE_LENGTH),
            contact_pref: text_field(payload, nested, "contact_pref", MAX_CONTACT_PREF_LENGTH),
            memo: text_field(payload, nested, "memo", MAX_MEMO_LENGTH),
            agree_privacy: lookup(payload, nested, "agree_privacy").is_some_and(coerce_flag),
            agree_marketing: lookup(payload, nested, "agree_marketing").is_some_and(coerce_flag),
            equipment,
        }
    }
}

// ============================================================================
// SECTION: Submission Request
// ============================================================================

/// Normalized inbound submission request.
///
/// # Invariants
/// - All text fields are sanitized and bounded at construction.
/// - Construction never fails; required-field validation happens in the
///   engine against the resolved table route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Logical target table name, when supplied by the caller.
    pub table: Option<String>,
    /// Overwrite-requested flag bypassing duplicate rejection.
    pub force: bool,
    /// Caller-supplied idempotency key.
    pub idempotency_key: Option<String>,
    /// Caller-supplied debounce key overriding the derived key.
    pub lock_key: Option<String>,
    /// Requested distributed-lock timeout in milliseconds.
    pub lock_timeout_ms: Option<u64>,
    /// Requested debounce window in milliseconds.
    pub debounce_ms: Option<u64>,
    /// Sanitized business fields.
    pub lead: LeadFields,
}

impl SubmissionRequest {
    /// Extracts a submission request from a normalized payload value.
    ///
    /// Accepts the nested shape (`lock` and `lead` sub-objects) and the flat
    /// shape produced by form-encoded bodies. Unknown keys are ignored.
    #[must_use]
    pub fn from_value(payload: &Value) -> Self {
        let lock = payload.get("lock");
        let lead = payload.get("lead");
        Self {
            table: text_field(payload, None, "table", MAX_TABLE_NAME_LENGTH),
            force: payload.get("force").is_some_and(coerce_flag),
            idempotency_key: text_field(
                payload,
                None,
                "idempotency_key",
                MAX_IDEMPOTENCY_KEY_LENGTH,
            ),
            lock_key: lock
                .and_then(|section| section.get("key"))
                .or_else(|| payload.get("lock_key"))
                .and_then(value_as_text)
                .and_then(|raw| sanitize_field(&raw, MAX_LOCK_KEY_LENGTH)),
            lock_timeout_ms: millis_field(payload, lock, "timeout_ms")
                .or_else(|| millis_field(payload, None, "lock_timeout_ms")),
            debounce_ms: millis_field(payload, lock, "debounce_ms")
                .or_else(|| millis_field(payload, None, "debounce_ms")),
            lead: LeadFields::from_value(payload, lead),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use serde_json::json;

    use super::*;

    #[test]
    fn sanitize_strips_controls_and_truncates() {
        let cleaned = sanitize_field("  ab\u{0000}c\n ", 2).unwrap();
        assert_eq!(cleaned, "ab");
        assert!(sanitize_field(" \u{0007} ", 8).is_none());
    }

    #[test]
    fn phone_canonicalization_keeps_digits_and_leading_plus() {
        assert_eq!(canonicalize_phone("010-1234-5678").unwrap(), "01012345678");
        assert_eq!(canonicalize_phone("+82 10 1234 5678").unwrap(), "+821012345678");
        assert!(canonicalize_phone("call me").is_none());
    }

    #[test]
    fn nested_and_flat_shapes_extract_identically() {
        let nested = SubmissionRequest::from_value(&json!({
            "table": "leads",
            "force": "1",
            "lock": {"key": "k1", "timeout_ms": 1500},
            "lead": {"phone": "010-1234-5678", "region": "Seoul", "agree_privacy": "y"},
        }));
        let flat = SubmissionRequest::from_value(&json!({
            "table": "leads",
            "force": true,
            "lock_key": "k1",
            "lock_timeout_ms": 1500,
            "phone": "010-1234-5678",
            "region": "Seoul",
            "agree_privacy": true,
        }));
        assert_eq!(nested, flat);
        assert!(nested.force);
        assert_eq!(nested.lead.phone.as_deref(), Some("01012345678"));
    }

    #[test]
    fn equipment_accepts_array_and_joined_string() {
        let array = SubmissionRequest::from_value(&json!({"equipment": ["wp", " ap "]}));
        let joined = SubmissionRequest::from_value(&json!({"equipment": "wp, ap"}));
        assert_eq!(array.lead.equipment, vec!["wp", "ap"]);
        assert_eq!(joined.lead.equipment, vec!["wp", "ap"]);
    }

    #[test]
    fn missing_fields_stay_absent() {
        let request = SubmissionRequest::from_value(&json!({}));
        assert!(request.table.is_none());
        assert!(request.lead.phone.is_none());
        assert!(!request.force);
        assert!(request.lead.equipment.is_empty());
    }
}
