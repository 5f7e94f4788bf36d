// crates/intake-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Intake Gate In-Memory Store
// Description: Simple in-memory lead store for tests and examples.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! This module provides a simple in-memory implementation of [`LeadStore`]
//! for tests and local demos. It honors the full session contract (named
//! locks with bounded waits, buffered writes applied atomically at commit,
//! rollback on drop) but keeps everything in process memory. It is not
//! intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::core::identifiers::LeadId;
use crate::interfaces::ExistingLead;
use crate::interfaces::LeadRow;
use crate::interfaces::LeadStore;
use crate::interfaces::LockAcquisition;
use crate::interfaces::StoreError;
use crate::interfaces::StoreSession;
use crate::interfaces::WriteReceipt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on concurrently open sessions.
const DEFAULT_MAX_SESSIONS: usize = 64;

/// Returns the current wall clock as epoch milliseconds.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Lock Registry
// ============================================================================

/// Named-lock registry with bounded waits.
#[derive(Debug, Default)]
struct LockRegistry {
    /// Currently held lock names.
    held: Mutex<HashSet<String>>,
    /// Signalled whenever a lock is released.
    released: Condvar,
}

impl LockRegistry {
    /// Attempts to take `name`, waiting up to `timeout`.
    fn acquire(&self, name: &str, timeout: Duration) -> LockAcquisition {
        let deadline = Instant::now() + timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if !held.contains(name) {
                held.insert(name.to_string());
                return LockAcquisition::Acquired;
            }
            let now = Instant::now();
            if now >= deadline {
                return LockAcquisition::TimedOut;
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }
    }

    /// Releases `name` and wakes waiters.
    fn release(&self, name: &str) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(name);
        drop(held);
        self.released.notify_all();
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Shared mutable state of the in-memory store.
#[derive(Debug, Default)]
struct StoreState {
    /// Rows per physical table, in insertion order.
    tables: BTreeMap<String, Vec<ExistingLead>>,
}

/// In-memory lead store for tests and examples.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeadStore {
    /// Row storage protected by a mutex.
    state: Arc<Mutex<StoreState>>,
    /// Named application locks.
    locks: Arc<LockRegistry>,
    /// Next surrogate identifier.
    next_id: Arc<AtomicI64>,
    /// Count of open sessions, bounded by [`DEFAULT_MAX_SESSIONS`].
    open_sessions: Arc<AtomicUsize>,
}

impl InMemoryLeadStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every committed row of `table`, for assertions in tests.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<ExistingLead> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tables.get(table).cloned().unwrap_or_default()
    }
}

impl LeadStore for InMemoryLeadStore {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        let open = self.open_sessions.fetch_add(1, Ordering::SeqCst);
        if open >= DEFAULT_MAX_SESSIONS {
            self.open_sessions.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Overloaded {
                message: "too many open sessions".to_string(),
                retry_after_ms: Some(50),
            });
        }
        Ok(Box::new(InMemorySession {
            store: self,
            locks_held: Vec::new(),
            pending: Vec::new(),
        }))
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// Buffered write applied at commit time.
#[derive(Debug)]
enum PendingWrite {
    /// Insert a fully formed record.
    Insert {
        /// Target table.
        table: String,
        /// Record to append.
        lead: ExistingLead,
    },
    /// Replace the column values of an existing record.
    Update {
        /// Target table.
        table: String,
        /// Record identifier.
        id: LeadId,
        /// New column values.
        row: LeadRow,
        /// Update timestamp.
        updated_at_ms: i64,
    },
}

/// One in-memory transaction: reads see committed state, writes are buffered
/// and applied atomically at commit.
struct InMemorySession<'a> {
    /// Owning store.
    store: &'a InMemoryLeadStore,
    /// Application locks held by this session.
    locks_held: Vec<String>,
    /// Buffered writes.
    pending: Vec<PendingWrite>,
}

impl InMemorySession<'_> {
    /// Runs `select` over the committed rows of `table`.
    fn read_table<T>(&self, table: &str, select: impl FnOnce(&[ExistingLead]) -> T) -> T {
        let state = self.store.state.lock().unwrap_or_else(PoisonError::into_inner);
        select(state.tables.get(table).map_or(&[][..], Vec::as_slice))
    }
}

impl StoreSession for InMemorySession<'_> {
    fn acquire_lock(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> Result<LockAcquisition, StoreError> {
        match self.store.locks.acquire(name, timeout) {
            LockAcquisition::Acquired => {
                self.locks_held.push(name.to_string());
                Ok(LockAcquisition::Acquired)
            }
            LockAcquisition::TimedOut => Ok(LockAcquisition::TimedOut),
        }
    }

    fn find_recent_by_phone(
        &mut self,
        table: &str,
        phone: &str,
        window: Duration,
    ) -> Result<Option<ExistingLead>, StoreError> {
        let cutoff = now_ms().saturating_sub(i64::try_from(window.as_millis()).unwrap_or(i64::MAX));
        Ok(self.read_table(table, |rows| {
            rows.iter()
                .filter(|lead| {
                    lead.row.phone.as_deref() == Some(phone) && lead.created_at_ms >= cutoff
                })
                .max_by_key(|lead| (lead.created_at_ms, lead.id))
                .cloned()
        }))
    }

    fn find_by_session_key(
        &mut self,
        table: &str,
        session_key: &str,
    ) -> Result<Option<ExistingLead>, StoreError> {
        Ok(self.read_table(table, |rows| {
            rows.iter()
                .find(|lead| lead.row.session_key.as_deref() == Some(session_key))
                .cloned()
        }))
    }

    fn find_by_marker(
        &mut self,
        table: &str,
        marker: &str,
    ) -> Result<Option<ExistingLead>, StoreError> {
        Ok(self.read_table(table, |rows| {
            rows.iter()
                .find(|lead| lead.row.memo.as_deref().is_some_and(|memo| memo.contains(marker)))
                .cloned()
        }))
    }

    fn insert(&mut self, table: &str, row: &LeadRow) -> Result<WriteReceipt, StoreError> {
        let id = LeadId::new(self.store.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let timestamp_ms = now_ms();
        self.pending.push(PendingWrite::Insert {
            table: table.to_string(),
            lead: ExistingLead {
                id,
                created_at_ms: timestamp_ms,
                updated_at_ms: timestamp_ms,
                row: row.clone(),
            },
        });
        Ok(WriteReceipt {
            id,
            timestamp_ms,
        })
    }

    fn update(
        &mut self,
        table: &str,
        id: LeadId,
        row: &LeadRow,
    ) -> Result<WriteReceipt, StoreError> {
        let exists = self.read_table(table, |rows| rows.iter().any(|lead| lead.id == id));
        if !exists {
            return Err(StoreError::Invalid(format!("update target missing: {id}")));
        }
        let timestamp_ms = now_ms();
        self.pending.push(PendingWrite::Update {
            table: table.to_string(),
            id,
            row: row.clone(),
            updated_at_ms: timestamp_ms,
        });
        Ok(WriteReceipt {
            id,
            timestamp_ms,
        })
    }

    fn fetch(&mut self, table: &str, id: LeadId) -> Result<Option<ExistingLead>, StoreError> {
        Ok(self.read_table(table, |rows| rows.iter().find(|lead| lead.id == id).cloned()))
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut state = self.store.state.lock().unwrap_or_else(PoisonError::into_inner);
        for write in self.pending.drain(..) {
            match write {
                PendingWrite::Insert {
                    table,
                    lead,
                } => {
                    state.tables.entry(table).or_default().push(lead);
                }
                PendingWrite::Update {
                    table,
                    id,
                    row,
                    updated_at_ms,
                } => {
                    if let Some(lead) = state
                        .tables
                        .entry(table)
                        .or_default()
                        .iter_mut()
                        .find(|lead| lead.id == id)
                    {
                        lead.row = row;
                        lead.updated_at_ms = updated_at_ms;
                    }
                }
            }
        }
        drop(state);
        Ok(())
    }
}

impl Drop for InMemorySession<'_> {
    fn drop(&mut self) {
        for name in self.locks_held.drain(..) {
            self.store.locks.release(&name);
        }
        self.store.open_sessions.fetch_sub(1, Ordering::SeqCst);
        // Pending writes are discarded implicitly when not committed.
    }
}
