// crates/intake-gate-cli/src/main.rs
// ============================================================================
// Module: Intake Gate CLI Entry Point
// Description: Command dispatcher for serving and operating Intake Gate.
// Purpose: Provide serve, config-check, and store-bootstrap commands.
// Dependencies: clap, intake-gate-config, intake-gate-http, tokio
// ============================================================================

//! ## Overview
//! The CLI resolves configuration (explicit path, `INTAKE_GATE_CONFIG`, or
//! the default filename), validates it fail-closed, and either serves the
//! collect endpoint or runs an offline operation. All diagnostics go to
//! stderr; stdout carries only command output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::Subcommand;
use intake_gate_config::ConfigError;
use intake_gate_config::IntakeConfig;
use intake_gate_config::StoreBackend;
use intake_gate_http::IntakeServer;
use intake_gate_http::ServeError;
use intake_gate_store_sqlite::SqliteLeadStore;
use intake_gate_store_sqlite::SqliteStoreConfig;
use intake_gate_store_sqlite::SqliteStoreError;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Definition
// ============================================================================

/// Intake Gate: concurrency-safe, idempotent lead-submission ingestion.
#[derive(Debug, Parser)]
#[command(name = "intake-gate", version, about)]
struct Cli {
    /// Selected subcommand.
    #[command(subcommand)]
    command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the collect endpoint.
    Serve {
        /// Configuration file path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate configuration and exit.
    CheckConfig {
        /// Configuration file path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Create the store schema for every routed table and exit.
    InitStore {
        /// Configuration file path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures surfaced to the operator.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Server startup or serving failed.
    #[error(transparent)]
    Serve(#[from] ServeError),
    /// Store bootstrap failed.
    #[error(transparent)]
    Store(#[from] SqliteStoreError),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Process entry point.
fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(io::stderr(), "intake-gate: {error}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the parsed command.
fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Serve {
            config,
        } => serve(config),
        Command::CheckConfig {
            config,
        } => check_config(config),
        Command::InitStore {
            config,
        } => init_store(config),
    }
}

/// Loads configuration from the resolved path.
fn load_config(explicit: Option<PathBuf>) -> Result<IntakeConfig, ConfigError> {
    let path = IntakeConfig::resolve_path(explicit.as_deref());
    IntakeConfig::load(&path)
}

/// Runs the HTTP server until failure.
fn serve(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let server = IntakeServer::from_config(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Serve(ServeError::Transport(err.to_string())))?;
    runtime.block_on(server.serve())?;
    Ok(())
}

/// Validates configuration and reports the routed tables.
fn check_config(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let routes = config.routing_table()?;
    let mut stdout = io::stdout();
    let _ = writeln!(stdout, "config ok; routed tables: {}", routes.physical_tables().join(", "));
    Ok(())
}

/// Bootstraps the SQLite schema for every routed table.
fn init_store(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let routes = config.routing_table()?;
    match config.store.backend {
        StoreBackend::Memory => {
            let mut stdout = io::stdout();
            let _ = writeln!(stdout, "memory store needs no bootstrap");
            Ok(())
        }
        StoreBackend::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| ConfigError::Invalid("sqlite store requires a path".to_string()))?;
            let store_config = SqliteStoreConfig {
                path,
                busy_timeout_ms: config.store.busy_timeout_ms,
                pool_size: 1,
                checkout_timeout_ms: config.store.checkout_timeout_ms,
            };
            let _store = SqliteLeadStore::new(store_config, &routes.physical_tables())?;
            let mut stdout = io::stdout();
            let _ = writeln!(
                stdout,
                "store initialized; tables: {}",
                routes.physical_tables().join(", ")
            );
            Ok(())
        }
    }
}
