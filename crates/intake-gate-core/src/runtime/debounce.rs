// crates/intake-gate-core/src/runtime/debounce.rs
// ============================================================================
// Module: Intake Gate Local Debouncer
// Description: In-process suppression of near-duplicate submissions.
// Purpose: Collapse double-clicks before any database round trip.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The debouncer is a bounded per-instance map of key to expiry on the
//! monotonic clock. It is best-effort by design: a restart loses in-flight
//! slots, and a full map admits the request; the distributed lock and the
//! duplicate lookup downstream remain authoritative. A held slot means the
//! caller gets a `LOCKED_SHORT` outcome with the remaining wait time and no
//! store session is ever opened.
//!
//! Release policy: rejection and error paths release the slot immediately so
//! a legitimate `force` retry does not wait out the TTL; successful writes
//! leave the slot to expire naturally, keeping the immediate re-click after
//! a success debounced.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on tracked debounce slots.
const DEFAULT_MAX_SLOTS: usize = 65_536;

// ============================================================================
// SECTION: Debounce Map
// ============================================================================

/// Result of a debounce acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceDecision {
    /// The slot was taken; the caller owns it until release or expiry.
    Acquired,
    /// A prior acquisition is still live.
    Held {
        /// Remaining hold time.
        remaining: Duration,
    },
}

/// Bounded in-process debounce map keyed by lock name.
///
/// # Invariants
/// - Expiries use the monotonic clock; no persistence across restarts.
/// - The map is owned by its engine instance, never a process-wide global.
#[derive(Debug)]
pub struct DebounceMap {
    /// Live slots: key to expiry instant.
    slots: Mutex<HashMap<String, Instant>>,
    /// Maximum number of tracked slots.
    max_slots: usize,
}

impl Default for DebounceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl DebounceMap {
    /// Creates a debounce map with the default bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_SLOTS)
    }

    /// Creates a debounce map bounded to `max_slots` entries.
    #[must_use]
    pub fn with_capacity(max_slots: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_slots,
        }
    }

    /// Attempts to take the slot for `key` with the given time-to-live.
    ///
    /// Expired entries are evicted lazily. When the map is full after
    /// eviction, the request is admitted without a slot (fail open).
    pub fn try_acquire(&self, key: &str, ttl: Duration) -> DebounceDecision {
        let now = Instant::now();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(expiry) = slots.get(key) {
            if *expiry > now {
                return DebounceDecision::Held {
                    remaining: *expiry - now,
                };
            }
            slots.remove(key);
        }
        if slots.len() >= self.max_slots {
            slots.retain(|_, expiry| *expiry > now);
        }
        if slots.len() < self.max_slots {
            slots.insert(key.to_string(), now + ttl);
        }
        DebounceDecision::Acquired
    }

    /// Releases the slot for `key` immediately.
    pub fn release(&self, key: &str) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.remove(key);
    }

    /// Returns the number of live (unexpired) slots.
    #[must_use]
    pub fn live_slots(&self) -> usize {
        let now = Instant::now();
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|expiry| **expiry > now).count()
    }
}

// ============================================================================
// SECTION: Release Guard
// ============================================================================

/// Scope guard releasing a debounce slot unless explicitly kept.
///
/// The engine keeps the slot only after a successful write; every rejection
/// and error path releases on drop.
#[derive(Debug)]
pub struct DebounceSlot<'a> {
    /// Owning map.
    map: &'a DebounceMap,
    /// Slot key.
    key: String,
    /// Whether drop should release the slot.
    armed: bool,
}

impl<'a> DebounceSlot<'a> {
    /// Creates a guard for an acquired slot.
    #[must_use]
    pub fn new(map: &'a DebounceMap, key: String) -> Self {
        Self {
            map,
            key,
            armed: true,
        }
    }

    /// Keeps the slot, letting it expire with its TTL.
    pub fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for DebounceSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.map.release(&self.key);
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
