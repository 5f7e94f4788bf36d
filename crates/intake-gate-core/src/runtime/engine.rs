// crates/intake-gate-core/src/runtime/engine.rs
// ============================================================================
// Module: Intake Gate Ingest Engine
// Description: Locked, idempotent submission ingestion over a store interface.
// Purpose: Execute normalize -> dedup -> debounce -> lock -> resolve -> write.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! The ingest engine is the single canonical execution path for submissions.
//! All transports must call [`IngestEngine::submit`] so the ordering
//! guarantees hold: for one effective identity key, only one request is ever
//! inside the duplicate-check-plus-write critical section, enforced by the
//! store's named application lock. The local debouncer short-circuits
//! double-clicks before any store work, and both locks are released on every
//! exit path, whether it is a success, a business rejection, or an error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use thiserror::Error;

use crate::core::dedup::derive_dedup_key;
use crate::core::identifiers::DedupKey;
use crate::core::outcome::IngestOutcome;
use crate::core::outcome::ValidationError;
use crate::core::routing::DedupPolicy;
use crate::core::routing::RoutingTable;
use crate::core::routing::TableRoute;
use crate::core::submission::LeadFields;
use crate::core::submission::MAX_MEMO_LENGTH;
use crate::core::submission::SubmissionRequest;
use crate::interfaces::LeadRow;
use crate::interfaces::LeadStore;
use crate::interfaces::LockAcquisition;
use crate::interfaces::StoreError;
use crate::interfaces::StoreSession;
use crate::runtime::debounce::DebounceDecision;
use crate::runtime::debounce::DebounceMap;
use crate::runtime::debounce::DebounceSlot;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Ingest pipeline errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; business outcomes such
///   as duplicates and debounce holds are [`IngestOutcome`] values, not errors.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request is invalid and must be fixed by the caller.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// The distributed lock could not be acquired in time; retryable.
    #[error("distributed lock timeout after {waited_ms} ms")]
    LockTimeout {
        /// Milliseconds waited before giving up.
        waited_ms: u64,
    },
    /// The store failed; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Ingest engine executing the locked submission pipeline.
pub struct IngestEngine<S> {
    /// Table routing allow-list.
    routes: RoutingTable,
    /// Lead store implementation.
    store: S,
    /// Per-instance local debouncer.
    debounce: DebounceMap,
}

impl<S> IngestEngine<S>
where
    S: LeadStore,
{
    /// Creates a new engine over a validated routing table.
    #[must_use]
    pub fn new(routes: RoutingTable, store: S) -> Self {
        Self {
            routes,
            store,
            debounce: DebounceMap::new(),
        }
    }

    /// Returns the engine's routing table.
    #[must_use]
    pub const fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Processes one normalized submission end to end.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Validation`] for unroutable or incomplete
    /// requests, [`IngestError::LockTimeout`] when the distributed lock is
    /// contended past its timeout, and [`IngestError::Store`] on
    /// infrastructure failure. All error paths roll back and release both
    /// locks.
    pub fn submit(&self, request: &SubmissionRequest) -> Result<IngestOutcome, IngestError> {
        let route = self
            .routes
            .resolve(request.table.as_deref())
            .ok_or_else(|| ValidationError::UnknownTable(request.table.clone().unwrap_or_default()))?;
        if route.require_phone
            && route.policy == DedupPolicy::RejectWithinWindow
            && request.lead.phone.is_none()
        {
            return Err(ValidationError::MissingPhone.into());
        }

        let key = derive_dedup_key(request);
        let lock_name = key.lock_name(&route.physical);
        let debounce_key = request.lock_key.clone().unwrap_or_else(|| lock_name.clone());
        let debounce_ttl = Duration::from_millis(route.clamp_debounce_ms(request.debounce_ms));

        // The debounce check runs before any duplicate detection so a
        // locked-out double-click is never misreported as a business
        // duplicate.
        match self.debounce.try_acquire(&debounce_key, debounce_ttl) {
            DebounceDecision::Held {
                remaining,
            } => {
                return Ok(IngestOutcome::Debounced {
                    remaining_ms: u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                });
            }
            DebounceDecision::Acquired => {}
        }
        let slot = DebounceSlot::new(&self.debounce, debounce_key);

        let lock_timeout = Duration::from_millis(route.clamp_lock_timeout_ms(request.lock_timeout_ms));
        let mut session = self.store.session()?;
        match session.acquire_lock(&lock_name, lock_timeout)? {
            LockAcquisition::Acquired => {}
            LockAcquisition::TimedOut => {
                // Session drop rolls back; slot drop releases the debounce key.
                return Err(IngestError::LockTimeout {
                    waited_ms: u64::try_from(lock_timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        }

        let outcome = resolve_and_write(session.as_mut(), route, request, &key)?;
        session.commit()?;

        // Successful writes keep the slot for its full TTL; read-only
        // duplicate outcomes release it immediately so a force retry does
        // not have to wait the window out.
        if outcome.wrote_row() {
            slot.keep();
        }
        Ok(outcome)
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Formats the idempotency marker embedded in stored memos.
#[must_use]
pub fn idempotency_marker(key: &str) -> String {
    format!("[ik:{key}]")
}

/// Appends the idempotency marker to a memo, respecting the memo cap.
///
/// The memo is truncated before appending so the marker itself can never be
/// cut off; a clipped marker would silently disable replay detection.
fn memo_with_marker(memo: Option<&str>, marker: &str) -> Option<String> {
    let room = MAX_MEMO_LENGTH.saturating_sub(marker.chars().count().saturating_add(1));
    match memo {
        Some(text) => {
            let clipped: String = text.chars().take(room).collect();
            if clipped.is_empty() {
                Some(marker.to_string())
            } else {
                Some(format!("{clipped} {marker}"))
            }
        }
        None => Some(marker.to_string()),
    }
}

/// Decides and executes the write for one submission, under the held lock.
///
/// The existence check and the write happen inside the same session, so no
/// other request for the same effective key can interleave between them.
fn resolve_and_write(
    session: &mut dyn StoreSession,
    route: &TableRoute,
    request: &SubmissionRequest,
    key: &DedupKey,
) -> Result<IngestOutcome, IngestError> {
    match route.policy {
        DedupPolicy::RejectWithinWindow => {
            reject_within_window(session, route, request)
        }
        DedupPolicy::MatchAndUpdate => match_and_update(session, route, request),
        DedupPolicy::IdempotencyMarker => idempotency_replay(session, route, request, key),
    }
}

/// REJECT_WITHIN_WINDOW: reject unforced phone matches inside the window.
fn reject_within_window(
    session: &mut dyn StoreSession,
    route: &TableRoute,
    request: &SubmissionRequest,
) -> Result<IngestOutcome, IngestError> {
    let window = Duration::from_millis(route.duplicate_window_ms);
    if let Some(phone) = &request.lead.phone
        && let Some(existing) = session.find_recent_by_phone(&route.physical, phone, window)?
        && !request.force
    {
        return Ok(IngestOutcome::Duplicate {
            id: existing.id,
            created_at_ms: existing.created_at_ms,
        });
    }
    // Forced submissions insert a new record; the matched row is untouched.
    let row = LeadRow::from_parts(&route.server_fields, &request.lead);
    let receipt = session.insert(&route.physical, &row)?;
    Ok(IngestOutcome::Inserted {
        id: receipt.id,
        timestamp_ms: receipt.timestamp_ms,
    })
}

/// MATCH_AND_UPDATE: upsert by session key; keyless submissions insert.
fn match_and_update(
    session: &mut dyn StoreSession,
    route: &TableRoute,
    request: &SubmissionRequest,
) -> Result<IngestOutcome, IngestError> {
    let row = LeadRow::from_parts(&route.server_fields, &request.lead);
    if let Some(session_key) = &request.lead.session_key {
        if let Some(existing) = session.find_by_session_key(&route.physical, session_key)? {
            let receipt = session.update(&route.physical, existing.id, &row)?;
            return Ok(IngestOutcome::Updated {
                id: receipt.id,
                timestamp_ms: receipt.timestamp_ms,
            });
        }
    }
    let receipt = session.insert(&route.physical, &row)?;
    Ok(IngestOutcome::Inserted {
        id: receipt.id,
        timestamp_ms: receipt.timestamp_ms,
    })
}

/// IDEMPOTENCY_MARKER: replay detection via a marker embedded in the memo.
fn idempotency_replay(
    session: &mut dyn StoreSession,
    route: &TableRoute,
    request: &SubmissionRequest,
    key: &DedupKey,
) -> Result<IngestOutcome, IngestError> {
    let Some(idempotency_key) = &request.idempotency_key else {
        // Without a caller key the marker provides no dedup; plain insert.
        let row = LeadRow::from_parts(&route.server_fields, &request.lead);
        let receipt = session.insert(&route.physical, &row)?;
        return Ok(IngestOutcome::Inserted {
            id: receipt.id,
            timestamp_ms: receipt.timestamp_ms,
        });
    };
    debug_assert_eq!(key.value, *idempotency_key);
    let marker = idempotency_marker(idempotency_key);
    if let Some(existing) = session.find_by_marker(&route.physical, &marker)? {
        return Ok(IngestOutcome::Replayed {
            id: existing.id,
        });
    }
    let lead = LeadFields {
        memo: memo_with_marker(request.lead.memo.as_deref(), &marker),
        ..request.lead.clone()
    };
    let row = LeadRow::from_parts(&route.server_fields, &lead);
    let receipt = session.insert(&route.physical, &row)?;
    Ok(IngestOutcome::Inserted {
        id: receipt.id,
        timestamp_ms: receipt.timestamp_ms,
    })
}
