// crates/intake-gate-config/src/config.rs
// ============================================================================
// Module: Intake Gate Configuration
// Description: Configuration loading and validation for Intake Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: intake-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size limits. Missing
//! or invalid configuration fails closed: the server refuses to start rather
//! than running with a permissive default. The table section compiles into
//! the core routing allow-list, which is the only path from caller input to
//! a physical store identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use intake_gate_core::DedupPolicy;
use intake_gate_core::RoutingError;
use intake_gate_core::RoutingTable;
use intake_gate_core::ServerFields;
use intake_gate_core::TableRoute;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "intake-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "INTAKE_GATE_CONFIG";
/// Environment variable overriding the store database path.
pub const DB_PATH_ENV_VAR: &str = "INTAKE_GATE_DB_PATH";
/// Environment variable overriding the server bind address.
pub const BIND_ENV_VAR: &str = "INTAKE_GATE_BIND";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;
/// Minimum accepted request body cap in bytes.
const MIN_MAX_BODY_BYTES: usize = 1024;
/// Maximum accepted request body cap in bytes.
const MAX_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Maximum number of allowed CORS origins.
const MAX_ALLOWED_ORIGINS: usize = 64;
/// Maximum length of one allowed origin.
const MAX_ORIGIN_LENGTH: usize = 256;
/// Maximum number of routed tables.
const MAX_TABLES: usize = 64;
/// Minimum store busy timeout in milliseconds.
const MIN_BUSY_TIMEOUT_MS: u64 = 1;
/// Maximum store busy timeout in milliseconds.
const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Minimum connection pool size.
const MIN_POOL_SIZE: usize = 1;
/// Maximum connection pool size.
const MAX_POOL_SIZE: usize = 64;
/// Maximum pool checkout timeout in milliseconds.
const MAX_CHECKOUT_TIMEOUT_MS: u64 = 60_000;
/// Maximum lock timeout cap in milliseconds.
const MAX_LOCK_TIMEOUT_CAP_MS: u64 = 60_000;
/// Maximum debounce cap in milliseconds.
const MAX_DEBOUNCE_CAP_MS: u64 = 600_000;
/// Maximum duplicate window in milliseconds (31 days).
const MAX_DUPLICATE_WINDOW_MS: u64 = 31 * 24 * 60 * 60 * 1000;

/// Returns the default server bind address.
fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

/// Returns the default request body cap.
const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Returns the default store busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Returns the default connection pool size.
const fn default_pool_size() -> usize {
    4
}

/// Returns the default pool checkout timeout.
const fn default_checkout_timeout_ms() -> u64 {
    2_000
}

/// Returns the default logical table name.
fn default_table_name() -> String {
    "leads".to_string()
}

/// Returns the default debounce window.
const fn default_debounce_ms() -> u64 {
    5_000
}

/// Returns the default debounce cap.
const fn default_max_debounce_ms() -> u64 {
    30_000
}

/// Returns the default distributed-lock timeout.
const fn default_lock_timeout_ms() -> u64 {
    3_000
}

/// Returns the default distributed-lock timeout cap.
const fn default_max_lock_timeout_ms() -> u64 {
    10_000
}

/// Returns the default duplicate-rejection window (24 hours).
const fn default_duplicate_window_ms() -> u64 {
    24 * 60 * 60 * 1000
}

/// Returns the default record status constant.
fn default_status() -> String {
    "NEW".to_string()
}

/// Returns the default record source constant.
fn default_source() -> String {
    "WEB".to_string()
}

/// Returns the default record active flag.
const fn default_active() -> bool {
    true
}

/// Returns the default require-phone flag.
const fn default_require_phone() -> bool {
    true
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("config io error: {0}")]
    Io(String),
    /// Config file exceeded the size limit.
    #[error("config file too large: {actual} bytes (max {max})")]
    TooLarge {
        /// Maximum allowed bytes.
        max: u64,
        /// Actual file size in bytes.
        actual: u64,
    },
    /// Config file failed to parse as TOML.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Config contents failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<RoutingError> for ConfigError {
    fn from(error: RoutingError) -> Self {
        Self::Invalid(error.to_string())
    }
}

// ============================================================================
// SECTION: Server Config
// ============================================================================

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address, `host:port`.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Exact-match CORS origin allow-list.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            allowed_origins: Vec::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ============================================================================
// SECTION: Store Config
// ============================================================================

/// Store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-memory store for tests and local demos.
    Memory,
    /// Durable SQLite store.
    #[default]
    Sqlite,
}

/// Store connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Selected backend.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database path for the SQLite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Bounded connection pool size.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Pool checkout timeout in milliseconds.
    #[serde(default = "default_checkout_timeout_ms")]
    pub checkout_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_size: default_pool_size(),
            checkout_timeout_ms: default_checkout_timeout_ms(),
        }
    }
}

// ============================================================================
// SECTION: Pipeline Defaults
// ============================================================================

/// Default lock/debounce bounds applied to tables without overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Logical table applied when the caller supplies none.
    #[serde(default = "default_table_name")]
    pub default_table: String,
    /// Default debounce window in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Upper bound for caller-requested debounce windows.
    #[serde(default = "default_max_debounce_ms")]
    pub max_debounce_ms: u64,
    /// Default distributed-lock timeout in milliseconds.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Upper bound for caller-requested lock timeouts.
    #[serde(default = "default_max_lock_timeout_ms")]
    pub max_lock_timeout_ms: u64,
    /// Duplicate-rejection window in milliseconds.
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            default_table: default_table_name(),
            debounce_ms: default_debounce_ms(),
            max_debounce_ms: default_max_debounce_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_lock_timeout_ms: default_max_lock_timeout_ms(),
            duplicate_window_ms: default_duplicate_window_ms(),
        }
    }
}

// ============================================================================
// SECTION: Table Config
// ============================================================================

/// Per-table routing and policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Physical store identifier; defaults to the logical name.
    #[serde(default)]
    pub physical: Option<String>,
    /// Duplicate-resolution policy.
    pub policy: DedupPolicy,
    /// Whether submissions must carry a phone number.
    #[serde(default = "default_require_phone")]
    pub require_phone: bool,
    /// Server-assigned workflow status for new records.
    #[serde(default = "default_status")]
    pub status: String,
    /// Server-assigned acquisition source for new records.
    #[serde(default = "default_source")]
    pub source: String,
    /// Server-assigned active flag for new records.
    #[serde(default = "default_active")]
    pub active: bool,
    /// Per-table debounce window override.
    #[serde(default)]
    pub debounce_ms: Option<u64>,
    /// Per-table debounce cap override.
    #[serde(default)]
    pub max_debounce_ms: Option<u64>,
    /// Per-table lock timeout override.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
    /// Per-table lock timeout cap override.
    #[serde(default)]
    pub max_lock_timeout_ms: Option<u64>,
    /// Per-table duplicate window override.
    #[serde(default)]
    pub duplicate_window_ms: Option<u64>,
}

// ============================================================================
// SECTION: Intake Config
// ============================================================================

/// Root Intake Gate configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntakeConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Store connection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
    /// Routed tables keyed by logical name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

impl IntakeConfig {
    /// Resolves the configuration path from an explicit argument, the
    /// `INTAKE_GATE_CONFIG` environment variable, or the default filename.
    #[must_use]
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Ok(from_env) = env::var(CONFIG_ENV_VAR)
            && !from_env.is_empty()
        {
            return PathBuf::from(from_env);
        }
        PathBuf::from(DEFAULT_CONFIG_NAME)
    }

    /// Loads, parses, and validates a configuration file, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file is unreadable, oversized,
    /// unparsable, or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let metadata = fs::metadata(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::TooLarge {
                max: MAX_CONFIG_FILE_SIZE,
                actual: metadata.len(),
            });
        }
        let contents = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        let mut config = Self::from_toml_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string without validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment-variable overrides for connection settings.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = env::var(DB_PATH_ENV_VAR)
            && !path.is_empty()
        {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Ok(bind) = env::var(BIND_ENV_VAR)
            && !bind.is_empty()
        {
            self.server.bind = bind;
        }
    }

    /// Validates the configuration, failing closed on any violation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_store()?;
        self.validate_defaults()?;
        if self.tables.is_empty() {
            return Err(ConfigError::Invalid("at least one [tables.*] entry required".to_string()));
        }
        if self.tables.len() > MAX_TABLES {
            return Err(ConfigError::Invalid(format!(
                "too many tables: {} (max {MAX_TABLES})",
                self.tables.len()
            )));
        }
        // Route construction re-validates identifiers and bounds.
        self.routing_table()?;
        Ok(())
    }

    /// Validates the server section.
    fn validate_server(&self) -> Result<(), ConfigError> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.server.bind)))?;
        if self.server.max_body_bytes < MIN_MAX_BODY_BYTES
            || self.server.max_body_bytes > MAX_MAX_BODY_BYTES
        {
            return Err(ConfigError::Invalid(format!(
                "max_body_bytes out of range: {}",
                self.server.max_body_bytes
            )));
        }
        if self.server.allowed_origins.len() > MAX_ALLOWED_ORIGINS {
            return Err(ConfigError::Invalid(format!(
                "too many allowed origins: {}",
                self.server.allowed_origins.len()
            )));
        }
        for origin in &self.server.allowed_origins {
            let scheme_ok = origin.starts_with("https://") || origin.starts_with("http://");
            if !scheme_ok || origin.len() > MAX_ORIGIN_LENGTH || origin.ends_with('/') {
                return Err(ConfigError::Invalid(format!("invalid allowed origin: {origin}")));
            }
        }
        Ok(())
    }

    /// Validates the store section.
    fn validate_store(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid("sqlite store requires a path".to_string()));
        }
        if self.store.busy_timeout_ms < MIN_BUSY_TIMEOUT_MS
            || self.store.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid(format!(
                "busy_timeout_ms out of range: {}",
                self.store.busy_timeout_ms
            )));
        }
        if self.store.pool_size < MIN_POOL_SIZE || self.store.pool_size > MAX_POOL_SIZE {
            return Err(ConfigError::Invalid(format!(
                "pool_size out of range: {}",
                self.store.pool_size
            )));
        }
        if self.store.checkout_timeout_ms == 0
            || self.store.checkout_timeout_ms > MAX_CHECKOUT_TIMEOUT_MS
        {
            return Err(ConfigError::Invalid(format!(
                "checkout_timeout_ms out of range: {}",
                self.store.checkout_timeout_ms
            )));
        }
        Ok(())
    }

    /// Validates the defaults section.
    fn validate_defaults(&self) -> Result<(), ConfigError> {
        let defaults = &self.defaults;
        if defaults.max_lock_timeout_ms > MAX_LOCK_TIMEOUT_CAP_MS {
            return Err(ConfigError::Invalid(format!(
                "max_lock_timeout_ms out of range: {}",
                defaults.max_lock_timeout_ms
            )));
        }
        if defaults.max_debounce_ms > MAX_DEBOUNCE_CAP_MS {
            return Err(ConfigError::Invalid(format!(
                "max_debounce_ms out of range: {}",
                defaults.max_debounce_ms
            )));
        }
        if defaults.duplicate_window_ms > MAX_DUPLICATE_WINDOW_MS {
            return Err(ConfigError::Invalid(format!(
                "duplicate_window_ms out of range: {}",
                defaults.duplicate_window_ms
            )));
        }
        Ok(())
    }

    /// Compiles the table section into the core routing allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a route fails core validation.
    pub fn routing_table(&self) -> Result<RoutingTable, ConfigError> {
        let mut routes = BTreeMap::new();
        for (logical, table) in &self.tables {
            let route = TableRoute {
                physical: table.physical.clone().unwrap_or_else(|| logical.clone()),
                policy: table.policy,
                require_phone: table.require_phone,
                server_fields: ServerFields {
                    status: table.status.clone(),
                    source: table.source.clone(),
                    active: table.active,
                },
                debounce_ms: table.debounce_ms.unwrap_or(self.defaults.debounce_ms),
                max_debounce_ms: table.max_debounce_ms.unwrap_or(self.defaults.max_debounce_ms),
                lock_timeout_ms: table.lock_timeout_ms.unwrap_or(self.defaults.lock_timeout_ms),
                max_lock_timeout_ms: table
                    .max_lock_timeout_ms
                    .unwrap_or(self.defaults.max_lock_timeout_ms),
                duplicate_window_ms: table
                    .duplicate_window_ms
                    .unwrap_or(self.defaults.duplicate_window_ms),
            };
            routes.insert(logical.clone(), route);
        }
        Ok(RoutingTable::new(self.defaults.default_table.clone(), routes)?)
    }
}
