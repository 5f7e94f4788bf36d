// crates/intake-gate-core/tests/store_contract.rs
// ============================================================================
// Module: In-Memory Store Contract Tests
// Description: Ensures the session contract holds for the in-memory store.
// ============================================================================
//! ## Overview
//! Validates rollback-on-drop, atomic commit, lock release, and the bounded
//! session count for [`intake_gate_core::InMemoryLeadStore`].

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::time::Duration;

use intake_gate_core::InMemoryLeadStore;
use intake_gate_core::LeadRow;
use intake_gate_core::LeadStore;
use intake_gate_core::LockAcquisition;
use intake_gate_core::ServerFields;

fn sample_row(memo: &str) -> LeadRow {
    let mut row = LeadRow::from_parts(&ServerFields::default(), &Default::default());
    row.memo = Some(memo.to_string());
    row
}

#[test]
fn uncommitted_writes_are_invisible() {
    let store = InMemoryLeadStore::new();
    {
        let mut session = store.session().unwrap();
        session.insert("leads", &sample_row("draft")).unwrap();
        // Dropped without commit.
    }
    assert!(store.rows("leads").is_empty());
}

#[test]
fn commit_applies_buffered_writes_atomically() {
    let store = InMemoryLeadStore::new();
    let mut session = store.session().unwrap();
    let receipt = session.insert("leads", &sample_row("kept")).unwrap();
    assert!(store.rows("leads").is_empty());
    session.commit().unwrap();

    let rows = store.rows("leads");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, receipt.id);
    assert_eq!(rows[0].created_at_ms, receipt.timestamp_ms);
}

#[test]
fn update_replaces_columns_and_bumps_updated_at() {
    let store = InMemoryLeadStore::new();
    let mut session = store.session().unwrap();
    let receipt = session.insert("leads", &sample_row("before")).unwrap();
    session.commit().unwrap();

    let mut session = store.session().unwrap();
    session.update("leads", receipt.id, &sample_row("after")).unwrap();
    session.commit().unwrap();

    let rows = store.rows("leads");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].row.memo.as_deref(), Some("after"));
    assert!(rows[0].updated_at_ms >= rows[0].created_at_ms);
}

#[test]
fn dropped_session_releases_its_lock() {
    let store = InMemoryLeadStore::new();
    let mut first = store.session().unwrap();
    assert_eq!(
        first.acquire_lock("leads:phone:010", Duration::from_millis(50)).unwrap(),
        LockAcquisition::Acquired
    );

    let mut contender = store.session().unwrap();
    assert_eq!(
        contender.acquire_lock("leads:phone:010", Duration::from_millis(20)).unwrap(),
        LockAcquisition::TimedOut
    );

    drop(first);
    assert_eq!(
        contender.acquire_lock("leads:phone:010", Duration::from_millis(50)).unwrap(),
        LockAcquisition::Acquired
    );
}

#[test]
fn committed_session_releases_its_lock() {
    let store = InMemoryLeadStore::new();
    let mut first = store.session().unwrap();
    first.acquire_lock("leads:phone:010", Duration::from_millis(50)).unwrap();
    first.insert("leads", &sample_row("locked insert")).unwrap();
    first.commit().unwrap();

    let mut second = store.session().unwrap();
    assert_eq!(
        second.acquire_lock("leads:phone:010", Duration::from_millis(50)).unwrap(),
        LockAcquisition::Acquired
    );
}
