// crates/intake-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Intake Gate Interfaces
// Description: Backend-agnostic store interfaces for the ingest pipeline.
// Purpose: Define the contract surface durable stores must implement.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Stores integrate through a session interface: one session is one store
//! transaction. The engine acquires the distributed lock, runs its duplicate
//! lookup, and issues at most one write inside a single session, then commits.
//! Dropping a session without committing must roll back every effect,
//! including the named application lock. Implementations consume untrusted
//! field values and must bind them as parameters, never interpolate them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::LeadId;
use crate::core::routing::ServerFields;
use crate::core::submission::LeadFields;

// ============================================================================
// SECTION: Write Payloads
// ============================================================================

/// Full column payload for one lead record write.
///
/// # Invariants
/// - Field values are sanitized and bounded before reaching a store.
/// - `status`, `source`, and `active` come from server configuration only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRow {
    /// Server-assigned workflow status.
    pub status: String,
    /// Server-assigned acquisition source.
    pub source: String,
    /// Server-assigned active flag.
    pub active: bool,
    /// Canonical phone number.
    pub phone: Option<String>,
    /// Session or advertising key.
    pub session_key: Option<String>,
    /// Region label.
    pub region: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Requested reservation date.
    pub reserved_date: Option<String>,
    /// Preferred contact channel.
    pub contact_pref: Option<String>,
    /// Free-form memo, including any embedded idempotency marker.
    pub memo: Option<String>,
    /// Privacy-policy consent flag.
    pub agree_privacy: bool,
    /// Marketing-contact consent flag.
    pub agree_marketing: bool,
    /// Equipment interest codes.
    pub equipment: Vec<String>,
}

impl LeadRow {
    /// Builds a row from server-set fields and sanitized lead fields.
    #[must_use]
    pub fn from_parts(server: &ServerFields, lead: &LeadFields) -> Self {
        Self {
            status: server.status.clone(),
            source: server.source.clone(),
            active: server.active,
            phone: lead.phone.clone(),
            session_key: lead.session_key.clone(),
            region: lead.region.clone(),
            address: lead.address.clone(),
            reserved_date: lead.reserved_date.clone(),
            contact_pref: lead.contact_pref.clone(),
            memo: lead.memo.clone(),
            agree_privacy: lead.agree_privacy,
            agree_marketing: lead.agree_marketing,
            equipment: lead.equipment.clone(),
        }
    }
}

/// A persisted lead record read back from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingLead {
    /// Store-assigned identifier.
    pub id: LeadId,
    /// Creation timestamp (epoch milliseconds).
    pub created_at_ms: i64,
    /// Last-modification timestamp (epoch milliseconds).
    pub updated_at_ms: i64,
    /// Stored column values.
    pub row: LeadRow,
}

/// Receipt for one committed-intent write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    /// Identifier of the written record.
    pub id: LeadId,
    /// Server timestamp of the write (epoch milliseconds).
    pub timestamp_ms: i64,
}

/// Result of a named-lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The lock is held by this session until commit or rollback.
    Acquired,
    /// The lock could not be acquired within the timeout.
    TimedOut,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors surfaced to the engine.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed submitted field values.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Underlying engine or statement error.
    #[error("store error: {0}")]
    Store(String),
    /// Invalid store data or target.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Store is overloaded and the caller should retry.
    #[error("store overloaded: {message}")]
    Overloaded {
        /// Retryable overload message.
        message: String,
        /// Optional retry delay in milliseconds.
        retry_after_ms: Option<u64>,
    },
}

// ============================================================================
// SECTION: Store Session
// ============================================================================

/// One store transaction scoped to one submission.
///
/// Dropping a session without calling [`StoreSession::commit`] rolls back all
/// effects, including the named application lock.
pub trait StoreSession {
    /// Acquires the named application lock, waiting up to `timeout`.
    ///
    /// The lock must be scoped to this session's transaction and released on
    /// commit or rollback; it must not depend on any target-table row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on infrastructure failure; a timeout is the
    /// [`LockAcquisition::TimedOut`] value, not an error.
    fn acquire_lock(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> Result<LockAcquisition, StoreError>;

    /// Finds the most recent record with the given canonical phone created
    /// within `window` of now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    fn find_recent_by_phone(
        &mut self,
        table: &str,
        phone: &str,
        window: Duration,
    ) -> Result<Option<ExistingLead>, StoreError>;

    /// Finds the record with the given session key, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    fn find_by_session_key(
        &mut self,
        table: &str,
        session_key: &str,
    ) -> Result<Option<ExistingLead>, StoreError>;

    /// Finds a record whose memo contains the given idempotency marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    fn find_by_marker(
        &mut self,
        table: &str,
        marker: &str,
    ) -> Result<Option<ExistingLead>, StoreError>;

    /// Inserts a new record, returning its id and server timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on statement failure.
    fn insert(&mut self, table: &str, row: &LeadRow) -> Result<WriteReceipt, StoreError>;

    /// Updates an existing record in place, returning the update timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on statement failure or when the record is gone.
    fn update(&mut self, table: &str, id: LeadId, row: &LeadRow)
    -> Result<WriteReceipt, StoreError>;

    /// Reads one record by id; used for verification and tooling.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    fn fetch(&mut self, table: &str, id: LeadId) -> Result<Option<ExistingLead>, StoreError>;

    /// Commits the transaction, releasing the application lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the commit fails; effects are rolled back.
    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Lead Store
// ============================================================================

/// Backend-agnostic lead store.
pub trait LeadStore {
    /// Opens a new session (one store transaction).
    ///
    /// Implementations must bound concurrent sessions and fail with
    /// [`StoreError::Overloaded`] instead of growing without limit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when no session can be opened.
    fn session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError>;
}

/// Shared, clonable handle to a dynamic lead store.
#[derive(Clone)]
pub struct SharedLeadStore {
    /// Inner store implementation.
    inner: Arc<dyn LeadStore + Send + Sync>,
}

impl SharedLeadStore {
    /// Wraps a concrete store into a shared handle.
    pub fn from_store<S>(store: S) -> Self
    where
        S: LeadStore + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(store),
        }
    }
}

impl LeadStore for SharedLeadStore {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        self.inner.session()
    }
}
