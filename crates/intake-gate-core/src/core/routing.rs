// crates/intake-gate-core/src/core/routing.rs
// ============================================================================
// Module: Intake Gate Table Routing
// Description: Allow-list mapping of logical table names to store targets.
// Purpose: Constrain caller-influenced table selection to validated routes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`RoutingTable`] is the only path from a caller-supplied table name to a
//! physical store identifier. Routes are constructed from configuration and
//! validated up front; physical identifiers are restricted to a strict
//! charset so they can be embedded in statements without interpolating any
//! client-controlled text. Each route also fixes the dedup policy, the
//! server-set record fields, and the lock/debounce bounds for its table.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a physical table identifier.
const MAX_PHYSICAL_NAME_LENGTH: usize = 64;

// ============================================================================
// SECTION: Dedup Policy
// ============================================================================

/// Duplicate-resolution policy applied to a target table.
///
/// # Invariants
/// - Wire labels are stable for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Reject unforced submissions matching a recent record by phone.
    RejectWithinWindow,
    /// Upsert by session key: update the matching record in place.
    MatchAndUpdate,
    /// Replay detection via an idempotency marker embedded in the memo.
    IdempotencyMarker,
}

// ============================================================================
// SECTION: Server Fields
// ============================================================================

/// Fixed record fields set by the server, never taken from client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFields {
    /// Workflow status assigned to new records.
    pub status: String,
    /// Acquisition source label.
    pub source: String,
    /// Active flag for new records.
    pub active: bool,
}

impl Default for ServerFields {
    fn default() -> Self {
        Self {
            status: "NEW".to_string(),
            source: "WEB".to_string(),
            active: true,
        }
    }
}

// ============================================================================
// SECTION: Table Route
// ============================================================================

/// One validated route from a logical table name to a store target.
///
/// # Invariants
/// - `physical` matches `[A-Za-z_][A-Za-z0-9_]*` and is length-bounded.
/// - All durations are non-zero; requested values are clamped to the caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRoute {
    /// Physical store identifier for this table.
    pub physical: String,
    /// Duplicate-resolution policy.
    pub policy: DedupPolicy,
    /// Whether submissions must carry a phone number.
    pub require_phone: bool,
    /// Server-set record fields.
    pub server_fields: ServerFields,
    /// Default debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Upper bound for caller-requested debounce windows.
    pub max_debounce_ms: u64,
    /// Default distributed-lock timeout in milliseconds.
    pub lock_timeout_ms: u64,
    /// Upper bound for caller-requested lock timeouts.
    pub max_lock_timeout_ms: u64,
    /// Duplicate-rejection window in milliseconds.
    pub duplicate_window_ms: u64,
}

impl TableRoute {
    /// Validates the route invariants.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when the physical identifier or a bound is
    /// invalid.
    pub fn validate(&self) -> Result<(), RoutingError> {
        if !is_valid_physical_name(&self.physical) {
            return Err(RoutingError::InvalidPhysicalName(self.physical.clone()));
        }
        if self.debounce_ms == 0
            || self.lock_timeout_ms == 0
            || self.duplicate_window_ms == 0
            || self.max_debounce_ms < self.debounce_ms
            || self.max_lock_timeout_ms < self.lock_timeout_ms
        {
            return Err(RoutingError::InvalidBounds(self.physical.clone()));
        }
        Ok(())
    }

    /// Clamps a caller-requested debounce window to this route's bounds.
    #[must_use]
    pub fn clamp_debounce_ms(&self, requested: Option<u64>) -> u64 {
        requested.map_or(self.debounce_ms, |value| value.clamp(1, self.max_debounce_ms))
    }

    /// Clamps a caller-requested lock timeout to this route's bounds.
    #[must_use]
    pub fn clamp_lock_timeout_ms(&self, requested: Option<u64>) -> u64 {
        requested.map_or(self.lock_timeout_ms, |value| value.clamp(1, self.max_lock_timeout_ms))
    }
}

/// Checks a physical identifier against the embedded-safe charset.
fn is_valid_physical_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_PHYSICAL_NAME_LENGTH {
        return false;
    }
    let mut chars = name.chars();
    let leads_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    leads_ok && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// SECTION: Routing Table
// ============================================================================

/// Routing errors raised at construction time.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// A physical identifier failed the charset or length check.
    #[error("invalid physical table identifier: {0}")]
    InvalidPhysicalName(String),
    /// A route carried zero or inverted duration bounds.
    #[error("invalid lock/debounce bounds for table: {0}")]
    InvalidBounds(String),
    /// The default table is not present in the route map.
    #[error("default table not routed: {0}")]
    UnknownDefaultTable(String),
    /// The route map is empty.
    #[error("routing table has no routes")]
    Empty,
}

/// Allow-list of logical table names to validated routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    /// Logical name applied when the caller supplies none.
    default_table: String,
    /// Validated routes keyed by logical name.
    routes: BTreeMap<String, TableRoute>,
}

impl RoutingTable {
    /// Builds a routing table after validating every route.
    ///
    /// # Errors
    ///
    /// Returns [`RoutingError`] when the map is empty, a route is invalid, or
    /// the default table is not routed.
    pub fn new(
        default_table: impl Into<String>,
        routes: BTreeMap<String, TableRoute>,
    ) -> Result<Self, RoutingError> {
        if routes.is_empty() {
            return Err(RoutingError::Empty);
        }
        for route in routes.values() {
            route.validate()?;
        }
        let default_table = default_table.into();
        if !routes.contains_key(&default_table) {
            return Err(RoutingError::UnknownDefaultTable(default_table));
        }
        Ok(Self {
            default_table,
            routes,
        })
    }

    /// Resolves a caller-supplied logical name, falling back to the default.
    ///
    /// Returns `None` when the name is not on the allow-list.
    #[must_use]
    pub fn resolve(&self, logical: Option<&str>) -> Option<&TableRoute> {
        let name = logical.unwrap_or(&self.default_table);
        self.routes.get(name)
    }

    /// Returns the physical identifiers of every routed table.
    #[must_use]
    pub fn physical_tables(&self) -> Vec<String> {
        self.routes.values().map(|route| route.physical.clone()).collect()
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

    use std::collections::BTreeMap;

    use super::*;

    fn route() -> TableRoute {
        TableRoute {
            physical: "leads".to_string(),
            policy: DedupPolicy::RejectWithinWindow,
            require_phone: true,
            server_fields: ServerFields::default(),
            debounce_ms: 5_000,
            max_debounce_ms: 30_000,
            lock_timeout_ms: 3_000,
            max_lock_timeout_ms: 10_000,
            duplicate_window_ms: 86_400_000,
        }
    }

    #[test]
    fn resolve_falls_back_to_default_and_rejects_unknown() {
        let mut routes = BTreeMap::new();
        routes.insert("leads".to_string(), route());
        let table = RoutingTable::new("leads", routes).unwrap();
        assert!(table.resolve(None).is_some());
        assert!(table.resolve(Some("leads")).is_some());
        assert!(table.resolve(Some("leads; DROP TABLE x")).is_none());
    }

    #[test]
    fn physical_identifier_charset_is_enforced() {
        let mut bad = route();
        bad.physical = "leads; drop".to_string();
        assert_eq!(bad.validate(), Err(RoutingError::InvalidPhysicalName(bad.physical.clone())));
    }

    #[test]
    fn clamps_bound_caller_requests() {
        let route = route();
        assert_eq!(route.clamp_lock_timeout_ms(None), 3_000);
        assert_eq!(route.clamp_lock_timeout_ms(Some(60_000)), 10_000);
        assert_eq!(route.clamp_debounce_ms(Some(0)), 1);
    }
}
