// crates/intake-gate-config/tests/load_validation.rs
// ============================================================================
// Module: Config Load and Validation Tests
// Description: Ensures configuration parsing fails closed on invalid input.
// ============================================================================
//! ## Overview
//! Validates TOML parsing, bound checks, routing compilation, and
//! environment-variable overrides for store connection settings.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]
#![allow(unsafe_code, reason = "Environment mutation requires unsafe in edition 2024.")]

use std::io::Write;

use intake_gate_config::ConfigError;
use intake_gate_config::IntakeConfig;
use intake_gate_config::StoreBackend;

const VALID_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:8080"
allowed_origins = ["https://forms.example.com"]

[store]
backend = "sqlite"
path = "intake.db"

[defaults]
default_table = "leads"

[tables.leads]
policy = "reject_within_window"

[tables.campaign]
policy = "match_and_update"
physical = "campaign_leads"
require_phone = false
status = "PENDING"
"#;

fn parsed(contents: &str) -> IntakeConfig {
    IntakeConfig::from_toml_str(contents).expect("parse")
}

#[test]
fn valid_config_passes_and_compiles_routes() {
    let config = parsed(VALID_CONFIG);
    config.validate().expect("valid config");

    let routes = config.routing_table().expect("routes");
    let default = routes.resolve(None).expect("default route");
    assert_eq!(default.physical, "leads");
    assert!(default.require_phone);
    assert_eq!(default.server_fields.status, "NEW");

    let campaign = routes.resolve(Some("campaign")).expect("campaign route");
    assert_eq!(campaign.physical, "campaign_leads");
    assert!(!campaign.require_phone);
    assert_eq!(campaign.server_fields.status, "PENDING");
}

#[test]
fn empty_tables_fail_closed() {
    let config = parsed(
        r#"
[store]
backend = "memory"
"#,
    );
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn sqlite_backend_requires_a_path() {
    let mut config = parsed(VALID_CONFIG);
    config.store.path = None;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn invalid_bind_address_is_rejected() {
    let mut config = parsed(VALID_CONFIG);
    config.server.bind = "not-an-address".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn origins_must_be_absolute_without_trailing_slash() {
    for origin in ["forms.example.com", "https://forms.example.com/"] {
        let mut config = parsed(VALID_CONFIG);
        config.server.allowed_origins = vec![origin.to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))), "accepted {origin}");
    }
}

#[test]
fn hostile_physical_names_are_rejected() {
    let config = parsed(
        r#"
[store]
backend = "memory"

[tables.leads]
policy = "reject_within_window"
physical = "leads; DROP TABLE x"
"#,
    );
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn unknown_keys_are_rejected() {
    assert!(matches!(
        IntakeConfig::from_toml_str("[server]\nsurprise = true\n"),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn pool_and_timeout_bounds_are_enforced() {
    let mut config = parsed(VALID_CONFIG);
    config.store.pool_size = 0;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = parsed(VALID_CONFIG);
    config.store.busy_timeout_ms = 600_000;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

    let mut config = parsed(VALID_CONFIG);
    config.defaults.max_lock_timeout_ms = 600_000;
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn table_overrides_shadow_defaults() {
    let config = parsed(
        r#"
[store]
backend = "memory"

[defaults]
default_table = "leads"
debounce_ms = 4000

[tables.leads]
policy = "reject_within_window"
debounce_ms = 1000
lock_timeout_ms = 500
"#,
    );
    config.validate().expect("valid config");
    let routes = config.routing_table().expect("routes");
    let route = routes.resolve(None).expect("route");
    assert_eq!(route.debounce_ms, 1_000);
    assert_eq!(route.lock_timeout_ms, 500);
}

#[test]
fn load_applies_env_overrides() {
    let mut file = tempfile::NamedTempFile::new().expect("temp config");
    file.write_all(VALID_CONFIG.as_bytes()).expect("write config");

    // Env overrides are process-global; run both assertions in one test to
    // avoid cross-test interference.
    // SAFETY: no other test in this binary touches these variables.
    unsafe {
        std::env::set_var("INTAKE_GATE_DB_PATH", "/tmp/override.db");
        std::env::set_var("INTAKE_GATE_BIND", "127.0.0.1:9999");
    }
    let config = IntakeConfig::load(file.path()).expect("load");
    // SAFETY: same single-owner discipline as above.
    unsafe {
        std::env::remove_var("INTAKE_GATE_DB_PATH");
        std::env::remove_var("INTAKE_GATE_BIND");
    }

    assert_eq!(config.store.backend, StoreBackend::Sqlite);
    assert_eq!(config.store.path.as_deref(), Some(std::path::Path::new("/tmp/override.db")));
    assert_eq!(config.server.bind, "127.0.0.1:9999");
}
