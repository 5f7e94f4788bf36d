// crates/intake-gate-core/src/core/outcome.rs
// ============================================================================
// Module: Intake Gate Outcomes
// Description: Pipeline outcome vocabulary and validation errors.
// Purpose: Give transports stable machine-readable statuses to map onto.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every submission resolves to exactly one [`IngestOutcome`] or an error.
//! Duplicate rejections and debounce short-circuits are business outcomes,
//! not failures; transports report them with a success status code and a
//! machine-readable label.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::LeadId;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Final outcome of one submission.
///
/// # Invariants
/// - `Inserted`/`Updated` imply a committed transaction.
/// - `Duplicate`/`Replayed`/`Debounced` imply no row was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestOutcome {
    /// A new record was inserted.
    Inserted {
        /// Identifier of the inserted record.
        id: LeadId,
        /// Server timestamp of the insert (epoch milliseconds).
        timestamp_ms: i64,
    },
    /// An existing record was updated in place.
    Updated {
        /// Identifier of the updated record.
        id: LeadId,
        /// Server timestamp of the update (epoch milliseconds).
        timestamp_ms: i64,
    },
    /// An unforced submission matched a recent record and was rejected.
    Duplicate {
        /// Identifier of the existing record.
        id: LeadId,
        /// Creation timestamp of the existing record (epoch milliseconds).
        created_at_ms: i64,
    },
    /// An idempotency marker matched; the original record is returned.
    Replayed {
        /// Identifier of the original record.
        id: LeadId,
    },
    /// The local debouncer held the key; no store work was attempted.
    Debounced {
        /// Remaining hold time in milliseconds.
        remaining_ms: u64,
    },
}

impl IngestOutcome {
    /// Returns whether a row was written for this outcome.
    #[must_use]
    pub const fn wrote_row(&self) -> bool {
        matches!(self, Self::Inserted { .. } | Self::Updated { .. })
    }
}

// ============================================================================
// SECTION: Validation Errors
// ============================================================================

/// Request validation errors; the caller must fix the request, not retry.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The requested logical table is not on the allow-list.
    #[error("unknown target table: {0}")]
    UnknownTable(String),
    /// The table's policy requires a phone number and none was supplied.
    #[error("missing required phone number")]
    MissingPhone,
}
