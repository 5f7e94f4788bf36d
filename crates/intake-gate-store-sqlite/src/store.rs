// crates/intake-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Lead Store
// Description: Durable LeadStore backed by SQLite WAL.
// Purpose: Persist lead records under transaction-scoped application locks.
// Dependencies: intake-gate-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`LeadStore`] using `SQLite`. The store
//! owns a bounded connection pool; one session checks out one connection,
//! opens a deferred transaction, and returns the connection at drop.
//!
//! The named application lock is a row in the dedicated `intake_locks` table.
//! Inserting it takes the database write lock bounded by `busy_timeout` set
//! to the caller's lock timeout, which serializes every process racing on
//! the same logical entity before any target-table row exists. Lock rows are
//! deleted before commit and undone by rollback, so a lock never outlives
//! its transaction. `SQLite`'s single-writer model makes the serialization
//! coarser than per-name; that over-serializes and never under-serializes.
//!
//! Every value is bound as a parameter. Physical table identifiers come from
//! the validated routing allow-list and are re-checked here before being
//! embedded in statement text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use intake_gate_core::ExistingLead;
use intake_gate_core::LeadId;
use intake_gate_core::LeadRow;
use intake_gate_core::LeadStore;
use intake_gate_core::LockAcquisition;
use intake_gate_core::StoreError;
use intake_gate_core::StoreSession;
use intake_gate_core::WriteReceipt;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout outside lock acquisition (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default connection pool size.
const DEFAULT_POOL_SIZE: usize = 4;
/// Default pool checkout timeout (ms).
const DEFAULT_CHECKOUT_TIMEOUT_MS: u64 = 2_000;
/// Name of the application lock table.
const LOCK_TABLE: &str = "intake_locks";
/// Column list shared by every lead statement.
const LEAD_COLUMNS: &str = "status, source, active, phone, session_key, region, address, \
                            reserved_date, contact_pref, memo, agree_privacy, agree_marketing, \
                            equipment, created_at_ms, updated_at_ms";

/// Returns the current wall clock as epoch milliseconds.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` store configuration.
///
/// # Invariants
/// - Timeouts are interpreted as milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Busy timeout applied outside lock acquisition (ms).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Bounded connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Pool checkout timeout (ms).
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
}

/// Returns the default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default pool size.
const fn default_pool_size() -> usize {
    DEFAULT_POOL_SIZE
}

/// Returns the default checkout timeout.
const fn default_checkout_timeout_ms() -> u64 {
    DEFAULT_CHECKOUT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding submitted field values.
#[derive(Debug, Error, Clone)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store data or target.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Pool exhausted; the caller should retry.
    #[error("sqlite store overloaded: {message}")]
    Overloaded {
        /// Retryable overload message.
        message: String,
        /// Optional retry delay in milliseconds.
        retry_after_ms: Option<u64>,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Overloaded {
                message,
                retry_after_ms,
            } => Self::Overloaded {
                message,
                retry_after_ms,
            },
        }
    }
}

/// Maps a rusqlite error into a store error without leaking payload text.
fn db_error(error: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(error.to_string())
}

/// Returns whether the error is a busy/locked conflict.
fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::DatabaseBusy || failure.code == ErrorCode::DatabaseLocked
    )
}

/// Re-checks a physical identifier before embedding it in statement text.
fn check_identifier(name: &str) -> Result<(), SqliteStoreError> {
    let mut chars = name.chars();
    let leads_ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if leads_ok && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(SqliteStoreError::Invalid(format!("unsafe table identifier: {name}")))
    }
}

// ============================================================================
// SECTION: Connection Pool
// ============================================================================

/// Bounded connection pool with condvar queuing.
struct ConnectionPool {
    /// Idle connections.
    idle: Mutex<Vec<Connection>>,
    /// Signalled when a connection is returned.
    available: Condvar,
}

impl ConnectionPool {
    /// Builds a pool from pre-opened connections.
    fn new(connections: Vec<Connection>) -> Self {
        Self {
            idle: Mutex::new(connections),
            available: Condvar::new(),
        }
    }

    /// Checks out a connection, waiting up to `timeout` for one to free up.
    fn checkout(&self, timeout: Duration) -> Result<Connection, SqliteStoreError> {
        let deadline = Instant::now() + timeout;
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(connection) = idle.pop() {
                return Ok(connection);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(SqliteStoreError::Overloaded {
                    message: "connection pool exhausted".to_string(),
                    retry_after_ms: Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
                });
            }
            let (guard, _) = self
                .available
                .wait_timeout(idle, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            idle = guard;
        }
    }

    /// Returns a connection to the pool and wakes one waiter.
    fn checkin(&self, connection: Connection) {
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        idle.push(connection);
        drop(idle);
        self.available.notify_one();
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed lead store with WAL and a bounded connection pool.
#[derive(Clone)]
pub struct SqliteLeadStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared connection pool.
    pool: Arc<ConnectionPool>,
}

impl SqliteLeadStore {
    /// Opens the database, bootstraps the schema for `physical_tables`, and
    /// fills the connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or the
    /// schema cannot be created.
    pub fn new(
        config: SqliteStoreConfig,
        physical_tables: &[String],
    ) -> Result<Self, SqliteStoreError> {
        let pool_size = config.pool_size.max(1);
        let mut connections = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            let connection = open_connection(&config)?;
            if index == 0 {
                bootstrap_schema(&connection, physical_tables)?;
            }
            connections.push(connection);
        }
        Ok(Self {
            config,
            pool: Arc::new(ConnectionPool::new(connections)),
        })
    }
}

impl LeadStore for SqliteLeadStore {
    fn session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        let timeout = Duration::from_millis(self.config.checkout_timeout_ms);
        let connection = self.pool.checkout(timeout)?;
        if let Err(err) = connection.execute_batch("BEGIN") {
            let error = db_error(&err);
            self.pool.checkin(connection);
            return Err(StoreError::from(error));
        }
        Ok(Box::new(SqliteSession {
            store: self,
            connection: Some(connection),
            lock_names: Vec::new(),
            committed: false,
        }))
    }
}

/// Opens one configured connection.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection =
        Connection::open(&config.path).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection
        .pragma_update(None, "journal_mode", "wal")
        .map_err(|err| db_error(&err))?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .map_err(|err| db_error(&err))?;
    Ok(connection)
}

/// Creates the lock table and one lead table per routed physical name.
fn bootstrap_schema(
    connection: &Connection,
    physical_tables: &[String],
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {LOCK_TABLE} (
                lock_name TEXT PRIMARY KEY,
                acquired_at_ms INTEGER NOT NULL
            );"
        ))
        .map_err(|err| db_error(&err))?;
    for table in physical_tables {
        check_identifier(table)?;
        connection
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    status TEXT NOT NULL,
                    source TEXT NOT NULL,
                    active INTEGER NOT NULL,
                    phone TEXT,
                    session_key TEXT,
                    region TEXT,
                    address TEXT,
                    reserved_date TEXT,
                    contact_pref TEXT,
                    memo TEXT,
                    agree_privacy INTEGER NOT NULL DEFAULT 0,
                    agree_marketing INTEGER NOT NULL DEFAULT 0,
                    equipment TEXT,
                    created_at_ms INTEGER NOT NULL,
                    updated_at_ms INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table}_phone_created
                    ON {table} (phone, created_at_ms);
                CREATE INDEX IF NOT EXISTS idx_{table}_session_key
                    ON {table} (session_key);"
            ))
            .map_err(|err| db_error(&err))?;
    }
    Ok(())
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One `SQLite` transaction on a pooled connection.
///
/// Drop without commit rolls back, releasing the application lock, and the
/// connection always returns to the pool.
struct SqliteSession<'a> {
    /// Owning store.
    store: &'a SqliteLeadStore,
    /// Checked-out connection; `None` only during drop.
    connection: Option<Connection>,
    /// Application lock names inserted by this session.
    lock_names: Vec<String>,
    /// Whether commit already ran.
    committed: bool,
}

impl SqliteSession<'_> {
    /// Returns the live connection.
    fn conn(&self) -> Result<&Connection, StoreError> {
        self.connection
            .as_ref()
            .ok_or_else(|| StoreError::Store("session connection already released".to_string()))
    }

    /// Reads one lead by an arbitrary predicate statement tail.
    fn select_lead(
        &self,
        table: &str,
        tail: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<ExistingLead>, StoreError> {
        check_identifier(table).map_err(StoreError::from)?;
        let connection = self.conn()?;
        let sql = format!("SELECT id, {LEAD_COLUMNS} FROM {table} {tail}");
        let mut statement = connection.prepare(&sql).map_err(|err| StoreError::from(db_error(&err)))?;
        statement
            .query_row(bind, row_to_lead)
            .optional()
            .map_err(|err| StoreError::from(db_error(&err)))
    }
}

/// Maps one result row to an [`ExistingLead`].
fn row_to_lead(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExistingLead> {
    let equipment: Option<String> = row.get(13)?;
    Ok(ExistingLead {
        id: LeadId::new(row.get(0)?),
        created_at_ms: row.get(14)?,
        updated_at_ms: row.get(15)?,
        row: LeadRow {
            status: row.get(1)?,
            source: row.get(2)?,
            active: row.get::<_, i64>(3)? != 0,
            phone: row.get(4)?,
            session_key: row.get(5)?,
            region: row.get(6)?,
            address: row.get(7)?,
            reserved_date: row.get(8)?,
            contact_pref: row.get(9)?,
            memo: row.get(10)?,
            agree_privacy: row.get::<_, i64>(11)? != 0,
            agree_marketing: row.get::<_, i64>(12)? != 0,
            equipment: equipment
                .map(|joined| joined.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
        },
    })
}

/// Joins equipment codes for storage; `None` when empty.
fn equipment_column(row: &LeadRow) -> Option<String> {
    if row.equipment.is_empty() {
        None
    } else {
        Some(row.equipment.join(","))
    }
}

impl StoreSession for SqliteSession<'_> {
    fn acquire_lock(
        &mut self,
        name: &str,
        timeout: Duration,
    ) -> Result<LockAcquisition, StoreError> {
        let connection = self.conn()?;
        // The lock insert takes the database write lock; bound the wait by
        // the caller's lock timeout instead of the store default.
        connection.busy_timeout(timeout).map_err(|err| StoreError::from(db_error(&err)))?;
        let result = connection.execute(
            &format!("INSERT OR REPLACE INTO {LOCK_TABLE} (lock_name, acquired_at_ms) VALUES (?1, ?2)"),
            params![name, now_ms()],
        );
        let default_timeout = Duration::from_millis(self.store.config.busy_timeout_ms);
        connection.busy_timeout(default_timeout).map_err(|err| StoreError::from(db_error(&err)))?;
        match result {
            Ok(_) => {
                self.lock_names.push(name.to_string());
                Ok(LockAcquisition::Acquired)
            }
            Err(err) if is_busy(&err) => Ok(LockAcquisition::TimedOut),
            Err(err) => Err(StoreError::from(db_error(&err))),
        }
    }

    fn find_recent_by_phone(
        &mut self,
        table: &str,
        phone: &str,
        window: Duration,
    ) -> Result<Option<ExistingLead>, StoreError> {
        let cutoff = now_ms().saturating_sub(i64::try_from(window.as_millis()).unwrap_or(i64::MAX));
        self.select_lead(
            table,
            "WHERE phone = ?1 AND created_at_ms >= ?2 ORDER BY created_at_ms DESC, id DESC LIMIT 1",
            &[&phone, &cutoff],
        )
    }

    fn find_by_session_key(
        &mut self,
        table: &str,
        session_key: &str,
    ) -> Result<Option<ExistingLead>, StoreError> {
        self.select_lead(table, "WHERE session_key = ?1 ORDER BY id LIMIT 1", &[&session_key])
    }

    fn find_by_marker(
        &mut self,
        table: &str,
        marker: &str,
    ) -> Result<Option<ExistingLead>, StoreError> {
        // instr() gives exact substring semantics with no wildcard parsing.
        self.select_lead(
            table,
            "WHERE memo IS NOT NULL AND instr(memo, ?1) > 0 ORDER BY id LIMIT 1",
            &[&marker],
        )
    }

    fn insert(&mut self, table: &str, row: &LeadRow) -> Result<WriteReceipt, StoreError> {
        check_identifier(table).map_err(StoreError::from)?;
        let connection = self.conn()?;
        let timestamp_ms = now_ms();
        connection
            .execute(
                &format!(
                    "INSERT INTO {table} ({LEAD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
                     ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"
                ),
                params![
                    row.status,
                    row.source,
                    i64::from(row.active),
                    row.phone,
                    row.session_key,
                    row.region,
                    row.address,
                    row.reserved_date,
                    row.contact_pref,
                    row.memo,
                    i64::from(row.agree_privacy),
                    i64::from(row.agree_marketing),
                    equipment_column(row),
                    timestamp_ms,
                    timestamp_ms,
                ],
            )
            .map_err(|err| StoreError::from(db_error(&err)))?;
        Ok(WriteReceipt {
            id: LeadId::new(connection.last_insert_rowid()),
            timestamp_ms,
        })
    }

    fn update(
        &mut self,
        table: &str,
        id: LeadId,
        row: &LeadRow,
    ) -> Result<WriteReceipt, StoreError> {
        check_identifier(table).map_err(StoreError::from)?;
        let connection = self.conn()?;
        let timestamp_ms = now_ms();
        let changed = connection
            .execute(
                &format!(
                    "UPDATE {table} SET phone = ?1, session_key = ?2, region = ?3, address = ?4, \
                     reserved_date = ?5, contact_pref = ?6, memo = ?7, agree_privacy = ?8, \
                     agree_marketing = ?9, equipment = ?10, updated_at_ms = ?11 WHERE id = ?12"
                ),
                params![
                    row.phone,
                    row.session_key,
                    row.region,
                    row.address,
                    row.reserved_date,
                    row.contact_pref,
                    row.memo,
                    i64::from(row.agree_privacy),
                    i64::from(row.agree_marketing),
                    equipment_column(row),
                    timestamp_ms,
                    id.get(),
                ],
            )
            .map_err(|err| StoreError::from(db_error(&err)))?;
        if changed != 1 {
            return Err(StoreError::Invalid(format!("update target missing: {id}")));
        }
        Ok(WriteReceipt {
            id,
            timestamp_ms,
        })
    }

    fn fetch(&mut self, table: &str, id: LeadId) -> Result<Option<ExistingLead>, StoreError> {
        let raw = id.get();
        self.select_lead(table, "WHERE id = ?1", &[&raw])
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let connection = self.conn()?;
        // Lock rows must not survive the transaction.
        for name in &self.lock_names {
            connection
                .execute(&format!("DELETE FROM {LOCK_TABLE} WHERE lock_name = ?1"), params![name])
                .map_err(|err| StoreError::from(db_error(&err)))?;
        }
        connection.execute_batch("COMMIT").map_err(|err| StoreError::from(db_error(&err)))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if !self.committed {
                // Rollback also undoes the lock-table insert.
                let _ = connection.execute_batch("ROLLBACK");
            }
            self.store.pool.checkin(connection);
        }
    }
}
