// crates/intake-gate-http/tests/collect_endpoint.rs
// ============================================================================
// Module: Collect Endpoint Tests
// Description: End-to-end HTTP behavior over an ephemeral port.
// ============================================================================
//! ## Overview
//! Boots the server over the in-memory store and exercises method routing,
//! CORS gating, content-type tolerant intake, and outcome status mapping.

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

use std::net::SocketAddr;
use std::sync::Arc;

use intake_gate_config::IntakeConfig;
use intake_gate_http::CollectResponse;
use intake_gate_http::IntakeServer;
use intake_gate_http::NoopAuditSink;
use serde_json::json;

const TEST_CONFIG: &str = r#"
[server]
bind = "127.0.0.1:0"
allowed_origins = ["https://forms.example.com"]
max_body_bytes = 4096

[store]
backend = "memory"

[defaults]
default_table = "leads"
debounce_ms = 2000

[tables.leads]
policy = "reject_within_window"
"#;

async fn spawn_server() -> SocketAddr {
    let config = IntakeConfig::from_toml_str(TEST_CONFIG).expect("parse config");
    let server =
        IntakeServer::with_audit_sink(&config, Arc::new(NoopAuditSink)).expect("build server");
    let app = server.app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

fn submit_body(phone: &str, lock_key: &str, force: bool) -> serde_json::Value {
    json!({
        "force": force,
        "lock": {"key": lock_key},
        "lead": {"phone": phone, "region": "Seoul"},
    })
}

#[tokio::test]
async fn options_answers_preflight_with_no_content() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, format!("http://{addr}/collect"))
        .header("Origin", "https://forms.example.com")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
        Some("https://forms.example.com")
    );
    assert_eq!(
        response.headers().get("access-control-allow-methods").and_then(|v| v.to_str().ok()),
        Some("POST, OPTIONS")
    );
}

#[tokio::test]
async fn non_post_methods_are_rejected() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response =
        client.get(format!("http://{addr}/collect")).send().await.expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    let body: CollectResponse = response.json().await.expect("json");
    assert_eq!(body.status, "METHOD_NOT_ALLOWED");
}

#[tokio::test]
async fn unlisted_origins_get_no_cors_header() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/collect"))
        .header("Origin", "https://evil.example.com")
        .json(&submit_body("010-1234-5678", "k1", false))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(response.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn submit_then_duplicate_then_force() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/collect");

    let first: CollectResponse = client
        .post(&url)
        .json(&submit_body("010-1234-5678", "k1", false))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert!(first.ok);
    assert_eq!(first.status, "INSERTED");
    let first_id = first.id.expect("id");

    let second: CollectResponse = client
        .post(&url)
        .json(&submit_body("010-1234-5678", "k2", false))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert!(!second.ok);
    assert_eq!(second.status, "DUPLICATE");
    assert_eq!(second.id, Some(first_id));
    assert!(second.created_at_ms.is_some());

    let forced: CollectResponse = client
        .post(&url)
        .json(&submit_body("010-1234-5678", "k3", true))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert!(forced.ok);
    assert_eq!(forced.status, "INSERTED");
    assert_ne!(forced.id, Some(first_id));
}

#[tokio::test]
async fn rapid_double_click_is_debounced() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/collect");

    let first: CollectResponse = client
        .post(&url)
        .json(&submit_body("010-2222-3333", "dup", false))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert_eq!(first.status, "INSERTED");

    let second = client
        .post(&url)
        .json(&submit_body("010-2222-3333", "dup", false))
        .send()
        .await
        .expect("request");
    assert_eq!(second.status(), reqwest::StatusCode::OK);
    let second: CollectResponse = second.json().await.expect("json");
    assert_eq!(second.status, "LOCKED_SHORT");
    assert!(second.remaining_ms.unwrap_or(0) > 0);
}

#[tokio::test]
async fn form_encoded_bodies_are_accepted() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response: CollectResponse = client
        .post(format!("http://{addr}/collect"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("phone=010-7777-8888&region=Busan&lock_key=form1")
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    assert!(response.ok);
    assert_eq!(response.status, "INSERTED");
}

#[tokio::test]
async fn missing_phone_is_a_validation_error() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/collect"))
        .json(&json!({"lead": {"region": "Seoul"}}))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: CollectResponse = response.json().await.expect("json");
    assert_eq!(body.status, "VALIDATION");
}

#[tokio::test]
async fn oversized_bodies_are_rejected_before_parsing() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/collect"))
        .header("Content-Type", "application/json")
        .body("x".repeat(8192))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: CollectResponse = response.json().await.expect("json");
    assert_eq!(body.status, "VALIDATION");
}
