// crates/intake-gate-core/src/core/identifiers.rs
// ============================================================================
// Module: Intake Gate Identifiers
// Description: Canonical identifiers for leads and dedup identity keys.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde, sha2
// ============================================================================

//! ## Overview
//! This module defines the identifiers used throughout Intake Gate. Lead
//! identifiers are store-assigned surrogate keys. Dedup keys carry the
//! identity kind so duplicate-resolution policies can tell a caller-supplied
//! idempotency key apart from a derived phone key or a synthetic fallback.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a dedup key value embedded verbatim in a lock name.
/// Longer values are replaced by their SHA-256 hex digest.
const MAX_INLINE_KEY_VALUE_LENGTH: usize = 120;

// ============================================================================
// SECTION: Lead Identifier
// ============================================================================

/// Store-assigned surrogate identifier of a persisted lead record.
///
/// # Invariants
/// - Assigned by the store at insert time; immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(i64);

impl LeadId {
    /// Creates a lead identifier from a raw store value.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Identity Key Kinds
// ============================================================================

/// Kind of identity key used for duplicate matching and locking.
///
/// # Invariants
/// - Wire labels are stable for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Canonical phone number.
    Phone,
    /// Session or advertising key supplied by the submitting page.
    SessionKey,
    /// Caller-supplied idempotency key.
    IdempotencyKey,
    /// Synthetic per-request key; provides no cross-request dedup guarantee.
    Synthetic,
}

impl KeyKind {
    /// Returns the kind as a stable lock-name segment.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::SessionKey => "session",
            Self::IdempotencyKey => "idem",
            Self::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Dedup Key
// ============================================================================

/// Effective identity key selected for one submission.
///
/// The same key value drives the local debounce slot, the distributed lock
/// name, and the duplicate lookup, so a submission is serialized against its
/// duplicates end to end.
///
/// # Invariants
/// - `value` is non-empty and already sanitized by the normalizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey {
    /// Identity kind that produced this key.
    pub kind: KeyKind,
    /// Sanitized key value.
    pub value: String,
}

impl DedupKey {
    /// Creates a dedup key from a kind and sanitized value.
    #[must_use]
    pub fn new(kind: KeyKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Returns whether this key can meaningfully deduplicate across requests.
    #[must_use]
    pub const fn is_dedupable(&self) -> bool {
        !matches!(self.kind, KeyKind::Synthetic)
    }

    /// Builds the namespaced lock name `{table}:{kind}:{value}` for this key.
    ///
    /// Over-long values are replaced by their SHA-256 hex digest so lock
    /// names stay bounded regardless of caller input.
    #[must_use]
    pub fn lock_name(&self, physical_table: &str) -> String {
        if self.value.len() <= MAX_INLINE_KEY_VALUE_LENGTH {
            format!("{physical_table}:{}:{}", self.kind, self.value)
        } else {
            let digest = Sha256::digest(self.value.as_bytes());
            let mut hex = String::with_capacity(digest.len() * 2);
            for byte in digest {
                hex.push_str(&format!("{byte:02x}"));
            }
            format!("{physical_table}:{}:sha256:{hex}", self.kind)
        }
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}
