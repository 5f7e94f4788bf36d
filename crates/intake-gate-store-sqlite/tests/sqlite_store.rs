// crates/intake-gate-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Durable session semantics over tempfile databases.
// ============================================================================
//! ## Overview
//! Validates round-tripping, transaction rollback, application-lock
//! timeouts, pool backpressure, and end-to-end engine behavior over the
//! SQLite store.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use intake_gate_core::DedupPolicy;
use intake_gate_core::IngestEngine;
use intake_gate_core::IngestOutcome;
use intake_gate_core::LeadFields;
use intake_gate_core::LeadRow;
use intake_gate_core::LeadStore;
use intake_gate_core::LockAcquisition;
use intake_gate_core::RoutingTable;
use intake_gate_core::ServerFields;
use intake_gate_core::StoreError;
use intake_gate_core::SubmissionRequest;
use intake_gate_core::TableRoute;
use intake_gate_store_sqlite::SqliteLeadStore;
use intake_gate_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

fn open_store(dir: &TempDir, pool_size: usize) -> SqliteLeadStore {
    let config = SqliteStoreConfig {
        path: dir.path().join("intake.db"),
        busy_timeout_ms: 5_000,
        pool_size,
        checkout_timeout_ms: 200,
    };
    SqliteLeadStore::new(config, &["leads".to_string()]).expect("open store")
}

fn sample_row() -> LeadRow {
    LeadRow {
        status: "NEW".to_string(),
        source: "WEB".to_string(),
        active: true,
        phone: Some("01012345678".to_string()),
        session_key: Some("ad-1".to_string()),
        region: Some("Seoul".to_string()),
        address: Some("12 Gil".to_string()),
        reserved_date: Some("2026-09-01".to_string()),
        contact_pref: Some("evening".to_string()),
        memo: Some("second floor".to_string()),
        agree_privacy: true,
        agree_marketing: false,
        equipment: vec!["wp".to_string(), "ap".to_string()],
    }
}

#[test]
fn inserted_rows_round_trip_exactly() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    let mut session = store.session().expect("session");
    let receipt = session.insert("leads", &sample_row()).expect("insert");
    session.commit().expect("commit");

    let mut session = store.session().expect("session");
    let fetched = session.fetch("leads", receipt.id).expect("fetch").expect("row exists");
    assert_eq!(fetched.row, sample_row());
    assert_eq!(fetched.created_at_ms, receipt.timestamp_ms);
    assert_eq!(fetched.updated_at_ms, receipt.timestamp_ms);
}

#[test]
fn dropped_sessions_leave_no_trace() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    {
        let mut session = store.session().expect("session");
        session.insert("leads", &sample_row()).expect("insert");
        session
            .acquire_lock("leads:phone:01012345678", Duration::from_millis(100))
            .expect("acquire");
        // Dropped without commit.
    }

    let mut session = store.session().expect("session");
    assert!(
        session
            .find_recent_by_phone("leads", "01012345678", Duration::from_secs(3600))
            .expect("query")
            .is_none()
    );
    // The lock insert was rolled back with the transaction.
    assert_eq!(
        session
            .acquire_lock("leads:phone:01012345678", Duration::from_millis(100))
            .expect("acquire"),
        LockAcquisition::Acquired
    );
}

#[test]
fn lookups_find_by_phone_session_key_and_marker() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    let mut row = sample_row();
    row.memo = Some("note [ik:req-1]".to_string());
    let mut session = store.session().expect("session");
    let receipt = session.insert("leads", &row).expect("insert");
    session.commit().expect("commit");

    let mut session = store.session().expect("session");
    let by_phone = session
        .find_recent_by_phone("leads", "01012345678", Duration::from_secs(3600))
        .expect("query")
        .expect("phone match");
    assert_eq!(by_phone.id, receipt.id);

    let by_key =
        session.find_by_session_key("leads", "ad-1").expect("query").expect("session match");
    assert_eq!(by_key.id, receipt.id);

    let by_marker =
        session.find_by_marker("leads", "[ik:req-1]").expect("query").expect("marker match");
    assert_eq!(by_marker.id, receipt.id);
    assert!(session.find_by_marker("leads", "[ik:req-2]").expect("query").is_none());
}

#[test]
fn recency_window_excludes_old_rows() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    let mut session = store.session().expect("session");
    session.insert("leads", &sample_row()).expect("insert");
    session.commit().expect("commit");

    let mut session = store.session().expect("session");
    assert!(
        session
            .find_recent_by_phone("leads", "01012345678", Duration::from_millis(0))
            .expect("query")
            .is_none()
    );
}

#[test]
fn update_rewrites_columns_in_place() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    let mut session = store.session().expect("session");
    let receipt = session.insert("leads", &sample_row()).expect("insert");
    session.commit().expect("commit");

    let mut updated = sample_row();
    updated.region = Some("Busan".to_string());
    updated.equipment = vec!["bidet".to_string()];
    let mut session = store.session().expect("session");
    session.update("leads", receipt.id, &updated).expect("update");
    session.commit().expect("commit");

    let mut session = store.session().expect("session");
    let fetched = session.fetch("leads", receipt.id).expect("fetch").expect("row exists");
    assert_eq!(fetched.row.region.as_deref(), Some("Busan"));
    assert_eq!(fetched.row.equipment, vec!["bidet"]);
    assert!(fetched.updated_at_ms >= fetched.created_at_ms);
}

#[test]
fn contended_lock_times_out_across_connections() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 2);

    let mut holder = store.session().expect("holder session");
    assert_eq!(
        holder.acquire_lock("leads:phone:010", Duration::from_millis(200)).expect("acquire"),
        LockAcquisition::Acquired
    );

    let contender_store = store.clone();
    let contender = thread::spawn(move || {
        let mut session = contender_store.session().expect("contender session");
        session.acquire_lock("leads:phone:010", Duration::from_millis(150)).expect("acquire")
    });
    assert_eq!(contender.join().expect("join"), LockAcquisition::TimedOut);

    drop(holder);
    let mut session = store.session().expect("session");
    assert_eq!(
        session.acquire_lock("leads:phone:010", Duration::from_millis(200)).expect("acquire"),
        LockAcquisition::Acquired
    );
}

#[test]
fn exhausted_pool_reports_overload() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 1);

    let held = store.session().expect("first session");
    match store.session() {
        Err(StoreError::Overloaded {
            retry_after_ms, ..
        }) => assert!(retry_after_ms.is_some()),
        other => panic!("expected overload, got {:?}", other.is_ok()),
    }
    drop(held);
    assert!(store.session().is_ok());
}

#[test]
fn hostile_table_names_are_refused() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 1);

    let mut session = store.session().expect("session");
    let result = session.insert("leads; DROP TABLE leads", &sample_row());
    assert!(matches!(result, Err(StoreError::Invalid(_))));
}

#[test]
fn engine_over_sqlite_rejects_window_duplicates() {
    let dir = TempDir::new().expect("tempdir");
    let store = open_store(&dir, 4);

    let route = TableRoute {
        physical: "leads".to_string(),
        policy: DedupPolicy::RejectWithinWindow,
        require_phone: true,
        server_fields: ServerFields::default(),
        debounce_ms: 5_000,
        max_debounce_ms: 30_000,
        lock_timeout_ms: 1_000,
        max_lock_timeout_ms: 10_000,
        duplicate_window_ms: 86_400_000,
    };
    let mut routes = BTreeMap::new();
    routes.insert("leads".to_string(), route);
    let engine =
        IngestEngine::new(RoutingTable::new("leads", routes).expect("routes"), store.clone());

    let request = |lock_key: &str, force: bool| SubmissionRequest {
        force,
        lock_key: Some(lock_key.to_string()),
        lead: LeadFields {
            phone: Some("01012345678".to_string()),
            ..LeadFields::default()
        },
        ..SubmissionRequest::default()
    };

    let first = engine.submit(&request("k1", false)).expect("first");
    assert!(matches!(first, IngestOutcome::Inserted { .. }));
    let second = engine.submit(&request("k2", false)).expect("second");
    assert!(matches!(second, IngestOutcome::Duplicate { .. }));
    let forced = engine.submit(&request("k3", true)).expect("forced");
    assert!(matches!(forced, IngestOutcome::Inserted { .. }));
}
