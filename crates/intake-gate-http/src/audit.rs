// crates/intake-gate-http/src/audit.rs
// ============================================================================
// Module: Collect Audit Logging
// Description: Structured audit events for collect request handling.
// Purpose: Emit redacted audit logs without hard dependencies.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Audit events describe request handling without exposing submitted data:
//! outcome labels, key kinds, sizes, and durations. Phone numbers, memos,
//! and other business fields never appear in events. Sinks are injected so
//! deployments can route events to their preferred logging pipeline without
//! redesign.

#![allow(
    clippy::print_stderr,
    reason = "The stderr sink is the logging pipeline of last resort."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use intake_gate_core::KeyKind;
use serde::Serialize;

// ============================================================================
// SECTION: Event
// ============================================================================

/// Collect endpoint audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct CollectAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// HTTP method of the request.
    pub method: String,
    /// Whether the caller origin matched the allow-list.
    pub origin_allowed: bool,
    /// Logical table requested, when present.
    pub table: Option<String>,
    /// Identity kind of the effective dedup key.
    pub key_kind: Option<KeyKind>,
    /// Stable outcome label reported to the caller.
    pub outcome: String,
    /// HTTP status code returned.
    pub http_status: u16,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Handling duration in milliseconds.
    pub duration_ms: u64,
}

impl CollectAuditEvent {
    /// Returns the current wall clock as epoch milliseconds.
    #[must_use]
    pub fn now_ms() -> u128 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_millis())
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Records one audit event.
    fn record(&self, event: &CollectAuditEvent);
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record(&self, event: &CollectAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            eprintln!("{payload}");
        }
    }
}

/// No-op audit sink for tests.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &CollectAuditEvent) {}
}
