// crates/intake-gate-core/src/core/dedup.rs
// ============================================================================
// Module: Intake Gate Dedup Key Derivation
// Description: Effective identity key selection for locking and resolution.
// Purpose: Apply the strict precedence idempotency > session > phone > synthetic.
// Dependencies: rand, crate::core
// ============================================================================

//! ## Overview
//! One submission yields exactly one effective identity key. The same key
//! drives the local debounce slot, the distributed lock name, and the
//! duplicate lookup, so every request racing on the same logical entity is
//! serialized by the same name. Submissions carrying none of the real
//! identity inputs fall back to a synthetic random key that intentionally
//! provides no cross-request dedup guarantee.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rand::RngCore;

use crate::core::identifiers::DedupKey;
use crate::core::identifiers::KeyKind;
use crate::core::submission::SubmissionRequest;

// ============================================================================
// SECTION: Derivation
// ============================================================================

/// Number of random bytes backing a synthetic fallback key.
const SYNTHETIC_KEY_BYTES: usize = 16;

/// Derives the effective identity key for a submission.
///
/// Precedence: explicit idempotency key, then session/ad key, then canonical
/// phone, then a synthetic per-request key. Callers relying on dedup must
/// supply one of the first three.
#[must_use]
pub fn derive_dedup_key(request: &SubmissionRequest) -> DedupKey {
    if let Some(key) = &request.idempotency_key {
        return DedupKey::new(KeyKind::IdempotencyKey, key.clone());
    }
    if let Some(session_key) = &request.lead.session_key {
        return DedupKey::new(KeyKind::SessionKey, session_key.clone());
    }
    if let Some(phone) = &request.lead.phone {
        return DedupKey::new(KeyKind::Phone, phone.clone());
    }
    DedupKey::new(KeyKind::Synthetic, synthetic_key())
}

/// Produces a random hex key for submissions with no identity input.
fn synthetic_key() -> String {
    let mut bytes = [0_u8; SYNTHETIC_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(SYNTHETIC_KEY_BYTES * 2);
    for byte in bytes {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}

// ============================================================================
// SECTION: Tests
// ============================================================================
