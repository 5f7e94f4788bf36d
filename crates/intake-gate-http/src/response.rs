// crates/intake-gate-http/src/response.rs
// ============================================================================
// Module: Collect Response Mapping
// Description: Wire responses and status-code mapping for the endpoint.
// Purpose: Give callers stable machine-readable statuses per outcome.
// Dependencies: axum, intake-gate-core, serde
// ============================================================================

//! ## Overview
//! Business outcomes (duplicates, debounce holds) are HTTP 200 with
//! `ok:false`; only infrastructure and caller errors use error codes:
//! 400 validation, 423 lock timeout, 500 transaction/connectivity failure.
//! Human-readable messages are supplementary; the `status` label is the
//! contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use intake_gate_core::IngestError;
use intake_gate_core::IngestOutcome;
use intake_gate_core::StoreError;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Wire Response
// ============================================================================

/// JSON body returned by the collect endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectResponse {
    /// Whether the submission was accepted (insert, update, or replay).
    pub ok: bool,
    /// Stable machine-readable status label.
    pub status: String,
    /// Record identifier, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Write timestamp (epoch milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<i64>,
    /// Creation timestamp of the matched record (epoch milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at_ms: Option<i64>,
    /// Remaining debounce hold (milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_ms: Option<u64>,
    /// Suggested retry delay for overload responses (milliseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// Marks idempotent replays of an earlier submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dup: Option<bool>,
    /// Supplementary human-readable message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CollectResponse {
    /// Builds an empty response scaffold for a status label.
    fn labeled(ok: bool, status: &str) -> Self {
        Self {
            ok,
            status: status.to_string(),
            id: None,
            timestamp_ms: None,
            created_at_ms: None,
            remaining_ms: None,
            retry_after_ms: None,
            dup: None,
            message: None,
        }
    }

    /// Maps an engine outcome to a status code and wire body.
    #[must_use]
    pub fn from_outcome(outcome: &IngestOutcome) -> (StatusCode, Self) {
        match outcome {
            IngestOutcome::Inserted {
                id,
                timestamp_ms,
            } => {
                let mut body = Self::labeled(true, "INSERTED");
                body.id = Some(id.get());
                body.timestamp_ms = Some(*timestamp_ms);
                (StatusCode::OK, body)
            }
            IngestOutcome::Updated {
                id,
                timestamp_ms,
            } => {
                let mut body = Self::labeled(true, "UPDATED");
                body.id = Some(id.get());
                body.timestamp_ms = Some(*timestamp_ms);
                (StatusCode::OK, body)
            }
            IngestOutcome::Duplicate {
                id,
                created_at_ms,
            } => {
                let mut body = Self::labeled(false, "DUPLICATE");
                body.id = Some(id.get());
                body.created_at_ms = Some(*created_at_ms);
                (StatusCode::OK, body)
            }
            IngestOutcome::Replayed {
                id,
            } => {
                let mut body = Self::labeled(true, "DUPLICATE_RETURN");
                body.id = Some(id.get());
                body.dup = Some(true);
                (StatusCode::OK, body)
            }
            IngestOutcome::Debounced {
                remaining_ms,
            } => {
                let mut body = Self::labeled(false, "LOCKED_SHORT");
                body.remaining_ms = Some(*remaining_ms);
                (StatusCode::OK, body)
            }
        }
    }

    /// Maps an engine error to a status code and wire body.
    #[must_use]
    pub fn from_error(error: &IngestError) -> (StatusCode, Self) {
        match error {
            IngestError::Validation(validation) => {
                let mut body = Self::labeled(false, "VALIDATION");
                body.message = Some(validation.to_string());
                (StatusCode::BAD_REQUEST, body)
            }
            IngestError::LockTimeout {
                ..
            } => (StatusCode::LOCKED, Self::labeled(false, "LOCK_TIMEOUT")),
            IngestError::Store(StoreError::Overloaded {
                retry_after_ms, ..
            }) => {
                let mut body = Self::labeled(false, "CONNECTIVITY");
                body.retry_after_ms = *retry_after_ms;
                (StatusCode::INTERNAL_SERVER_ERROR, body)
            }
            IngestError::Store(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Self::labeled(false, "TX_FAILED"))
            }
        }
    }

    /// Builds the oversized-body rejection.
    #[must_use]
    pub fn body_too_large(max_body_bytes: usize) -> (StatusCode, Self) {
        let mut body = Self::labeled(false, "VALIDATION");
        body.message = Some(format!("body exceeds {max_body_bytes} bytes"));
        (StatusCode::BAD_REQUEST, body)
    }

    /// Builds the disallowed-method rejection.
    #[must_use]
    pub fn method_not_allowed() -> (StatusCode, Self) {
        (StatusCode::METHOD_NOT_ALLOWED, Self::labeled(false, "METHOD_NOT_ALLOWED"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use intake_gate_core::IngestError;
    use intake_gate_core::IngestOutcome;
    use intake_gate_core::LeadId;
    use intake_gate_core::StoreError;
    use intake_gate_core::ValidationError;

    use super::CollectResponse;

    #[test]
    fn outcomes_map_to_success_codes() {
        let (code, body) = CollectResponse::from_outcome(&IngestOutcome::Inserted {
            id: LeadId::new(7),
            timestamp_ms: 1_000,
        });
        assert_eq!(code, StatusCode::OK);
        assert!(body.ok);
        assert_eq!(body.status, "INSERTED");
        assert_eq!(body.id, Some(7));

        let (code, body) = CollectResponse::from_outcome(&IngestOutcome::Duplicate {
            id: LeadId::new(7),
            created_at_ms: 900,
        });
        assert_eq!(code, StatusCode::OK);
        assert!(!body.ok);
        assert_eq!(body.status, "DUPLICATE");
        assert_eq!(body.created_at_ms, Some(900));

        let (_, body) = CollectResponse::from_outcome(&IngestOutcome::Replayed {
            id: LeadId::new(7),
        });
        assert_eq!(body.dup, Some(true));

        let (code, body) = CollectResponse::from_outcome(&IngestOutcome::Debounced {
            remaining_ms: 450,
        });
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "LOCKED_SHORT");
        assert_eq!(body.remaining_ms, Some(450));
    }

    #[test]
    fn errors_map_to_error_codes() {
        let (code, body) =
            CollectResponse::from_error(&IngestError::Validation(ValidationError::MissingPhone));
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert_eq!(body.status, "VALIDATION");

        let (code, body) = CollectResponse::from_error(&IngestError::LockTimeout {
            waited_ms: 3_000,
        });
        assert_eq!(code, StatusCode::LOCKED);
        assert_eq!(body.status, "LOCK_TIMEOUT");

        let (code, body) = CollectResponse::from_error(&IngestError::Store(StoreError::Overloaded {
            message: "pool".to_string(),
            retry_after_ms: Some(200),
        }));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "CONNECTIVITY");
        assert_eq!(body.retry_after_ms, Some(200));

        let (code, body) =
            CollectResponse::from_error(&IngestError::Store(StoreError::Store("boom".to_string())));
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "TX_FAILED");
    }
}
