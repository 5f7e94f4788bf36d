// crates/intake-gate-http/src/server.rs
// ============================================================================
// Module: Collect HTTP Server
// Description: axum server exposing the ingest pipeline at POST /collect.
// Purpose: Translate HTTP concerns and route every submission via the engine.
// Dependencies: intake-gate-core, intake-gate-config, axum, tokio
// ============================================================================

//! ## Overview
//! One endpoint: `POST /collect` accepts JSON, form-encoded, and beacon-text
//! bodies; `OPTIONS /collect` answers preflight with 204 and no body; every
//! other method yields 405. Inputs are untrusted: bodies are size-capped
//! before parsing, origins are gated by exact allow-list match, and all
//! business decisions happen inside [`IngestEngine`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::post;
use intake_gate_config::IntakeConfig;
use intake_gate_config::StoreBackend;
use intake_gate_core::IngestEngine;
use intake_gate_core::InMemoryLeadStore;
use intake_gate_core::KeyKind;
use intake_gate_core::SharedLeadStore;
use intake_gate_core::SubmissionRequest;
use intake_gate_core::derive_dedup_key;
use intake_gate_core::normalize_payload;
use intake_gate_store_sqlite::SqliteLeadStore;
use intake_gate_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::audit::AuditSink;
use crate::audit::CollectAuditEvent;
use crate::audit::StderrAuditSink;
use crate::cors::allowed_origin;
use crate::cors::append_cors_headers;
use crate::response::CollectResponse;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HTTP server errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Configuration was invalid.
    #[error("server config error: {0}")]
    Config(String),
    /// Store or engine initialization failed.
    #[error("server init error: {0}")]
    Init(String),
    /// Transport failure while binding or serving.
    #[error("server transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Shared handler state.
struct ServerState {
    /// Ingest engine over the configured store.
    engine: IngestEngine<SharedLeadStore>,
    /// Exact-match CORS origin allow-list.
    allowed_origins: Vec<String>,
    /// Maximum accepted request body size.
    max_body_bytes: usize,
    /// Injected audit sink.
    audit: Arc<dyn AuditSink>,
}

/// Collect HTTP server instance.
pub struct IntakeServer {
    /// Bind address.
    bind: String,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl IntakeServer {
    /// Builds a server from validated configuration with stderr auditing.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError`] when the config is invalid or the store cannot
    /// be opened.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, ServeError> {
        Self::with_audit_sink(config, Arc::new(StderrAuditSink))
    }

    /// Builds a server with an injected audit sink.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError`] when the config is invalid or the store cannot
    /// be opened.
    pub fn with_audit_sink(
        config: &IntakeConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServeError> {
        config.validate().map_err(|err| ServeError::Config(err.to_string()))?;
        let routes = config.routing_table().map_err(|err| ServeError::Config(err.to_string()))?;
        let store = build_lead_store(config, &routes.physical_tables())?;
        let engine = IngestEngine::new(routes, store);
        Ok(Self {
            bind: config.server.bind.clone(),
            state: Arc::new(ServerState {
                engine,
                allowed_origins: config.server.allowed_origins.clone(),
                max_body_bytes: config.server.max_body_bytes,
                audit,
            }),
        })
    }

    /// Returns the application router for this server.
    #[must_use]
    pub fn app(&self) -> Router {
        Router::new()
            .route(
                "/collect",
                post(handle_collect).options(handle_preflight).fallback(handle_other_method),
            )
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until failure.
    ///
    /// # Errors
    ///
    /// Returns [`ServeError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServeError> {
        let addr: SocketAddr = self
            .bind
            .parse()
            .map_err(|_| ServeError::Config(format!("invalid bind address: {}", self.bind)))?;
        let app = self.app();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| ServeError::Transport(format!("bind failed: {err}")))?;
        axum::serve(listener, app)
            .await
            .map_err(|err| ServeError::Transport(format!("serve failed: {err}")))
    }
}

/// Builds the configured lead store behind a shared handle.
fn build_lead_store(
    config: &IntakeConfig,
    physical_tables: &[String],
) -> Result<SharedLeadStore, ServeError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(SharedLeadStore::from_store(InMemoryLeadStore::new())),
        StoreBackend::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .ok_or_else(|| ServeError::Config("sqlite store requires a path".to_string()))?;
            let store_config = SqliteStoreConfig {
                path,
                busy_timeout_ms: config.store.busy_timeout_ms,
                pool_size: config.store.pool_size,
                checkout_timeout_ms: config.store.checkout_timeout_ms,
            };
            let store = SqliteLeadStore::new(store_config, physical_tables)
                .map_err(|err| ServeError::Init(err.to_string()))?;
            Ok(SharedLeadStore::from_store(store))
        }
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /collect`.
async fn handle_collect(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    let started = Instant::now();
    let origin = allowed_origin(&headers, &state.allowed_origins);

    let mut table = None;
    let mut key_kind = None;
    let (code, body) = if bytes.len() > state.max_body_bytes {
        CollectResponse::body_too_large(state.max_body_bytes)
    } else {
        let content_type = headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok());
        let payload = normalize_payload(&bytes, content_type);
        let request = SubmissionRequest::from_value(&payload);
        table.clone_from(&request.table);
        key_kind = Some(derive_dedup_key(&request).kind);
        match state.engine.submit(&request) {
            Ok(outcome) => CollectResponse::from_outcome(&outcome),
            Err(error) => CollectResponse::from_error(&error),
        }
    };

    record_audit(
        &state,
        &Method::POST,
        origin.is_some(),
        table,
        key_kind,
        &body,
        code,
        bytes.len(),
        started,
    );
    respond(code, Some(&body), origin.as_deref())
}

/// Handles `OPTIONS /collect` preflight: 204, no body.
async fn handle_preflight(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let origin = allowed_origin(&headers, &state.allowed_origins);
    respond(StatusCode::NO_CONTENT, None, origin.as_deref())
}

/// Handles every other method on `/collect`: 405.
async fn handle_other_method(
    State(state): State<Arc<ServerState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();
    let origin = allowed_origin(&headers, &state.allowed_origins);
    let (code, body) = CollectResponse::method_not_allowed();
    record_audit(&state, &method, origin.is_some(), None, None, &body, code, 0, started);
    respond(code, Some(&body), origin.as_deref())
}

/// Builds the final response with CORS headers appended.
fn respond(code: StatusCode, body: Option<&CollectResponse>, origin: Option<&str>) -> Response {
    let mut response = match body {
        Some(body) => (code, axum::Json(body)).into_response(),
        None => code.into_response(),
    };
    append_cors_headers(response.headers_mut(), origin);
    response
}

/// Records one audit event for a handled request.
#[allow(
    clippy::too_many_arguments,
    reason = "Flat audit context; grouping would just relabel the same data."
)]
fn record_audit(
    state: &ServerState,
    method: &Method,
    origin_allowed: bool,
    table: Option<String>,
    key_kind: Option<KeyKind>,
    body: &CollectResponse,
    code: StatusCode,
    request_bytes: usize,
    started: Instant,
) {
    state.audit.record(&CollectAuditEvent {
        event: "collect",
        timestamp_ms: CollectAuditEvent::now_ms(),
        method: method.to_string(),
        origin_allowed,
        table,
        key_kind,
        outcome: body.status.clone(),
        http_status: code.as_u16(),
        request_bytes,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
}
