//! REST gateway adapter tests using wiremock.
//!
//! These tests pin the gateway's URL layout and JSON wire format.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, header};
use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ledger_oauth::config::Config;
use ledger_oauth::error::{LedgerError, OAuthError};
use ledger_oauth::ledger::{
    CodeRecord, HttpLedger, LedgerGateway, LedgerWriter, RecordStatus, TokenRecord,
};
use ledger_oauth::server::oauth::{
    DenyPasswords, GrantStore, Hooks, OAuthRequest, TokenEngine,
};

fn setup_ledger(mock_server: &MockServer) -> HttpLedger {
    let config = Config::for_testing();
    HttpLedger::new(&format!("{}/api", mock_server.uri()), &config.ledger).unwrap()
}

/// Record identifiers are standard base64; `/` must travel percent-encoded.
fn encoded(id: &str) -> String {
    id.replace('/', "%2F")
}

fn sample_code() -> CodeRecord {
    CodeRecord::new("raw-code", "did:example:alice", "222222", "read", "http://localhost:9094/cb", Utc::now())
}

fn sample_token(raw: &str) -> TokenRecord {
    TokenRecord::new(
        raw,
        "did:example:alice",
        "222222",
        "read",
        "http://localhost:9094/cb",
        Utc::now(),
        Duration::from_secs(7200),
    )
}

// =============================================================================
// Reads
// =============================================================================

#[tokio::test]
async fn test_read_code_record() {
    let mock_server = MockServer::start().await;
    let record = sample_code();

    Mock::given(method("GET"))
        .and(path(format!("/api/codes/{}", encoded(&record.id))))
        .respond_with(ResponseTemplate::new(200).set_body_json(&record))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    let read = ledger.read_code_record(&record.id).await.unwrap();
    assert_eq!(read, Some(record));
}

#[tokio::test]
async fn test_read_missing_record_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    assert!(ledger.read_token_record("TI_missing").await.unwrap().is_none());
    assert!(ledger.read_code_record("CI_missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_gateway_failure_is_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("chaincode panic"))
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    let err = ledger.read_token_record("TI_x").await.unwrap_err();
    assert!(matches!(err, LedgerError::Status { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn test_read_malformed_record_is_parse_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Time_issueed": 42 })))
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    let err = ledger.read_code_record("CI_x").await.unwrap_err();
    assert!(matches!(err, LedgerError::Parse(_)), "got {err:?}");
}

#[tokio::test]
async fn test_tokens_by_owner() {
    let mock_server = MockServer::start().await;
    let record = sample_token("tok");

    Mock::given(method("GET"))
        .and(path("/api/tokens"))
        .and(query_param("owner", "did:example:alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record])))
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    let records = ledger.tokens_by_owner("did:example:alice").await.unwrap();
    assert_eq!(records, vec![record]);
}

// =============================================================================
// Writes
// =============================================================================

#[tokio::test]
async fn test_create_records_post_wire_format() {
    let mock_server = MockServer::start().await;
    let code = sample_code();
    let token = sample_token("tok");

    Mock::given(method("POST"))
        .and(path("/api/codes"))
        .and(body_json(serde_json::to_value(&code).unwrap()))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/tokens"))
        .and(body_json(serde_json::to_value(&token).unwrap()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    ledger.create_code_record(code).await.unwrap();
    ledger.create_token_record(token).await.unwrap();
}

#[tokio::test]
async fn test_duplicate_create_is_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/codes"))
        .respond_with(ResponseTemplate::new(409).set_body_string("identifier exists"))
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    let err = ledger.create_code_record(sample_code()).await.unwrap_err();
    assert!(matches!(err, LedgerError::Conflict { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_link_and_revoke_paths() {
    let mock_server = MockServer::start().await;
    let code = sample_code();
    let token = sample_token("tok");

    Mock::given(method("POST"))
        .and(path(format!("/api/codes/{}/link", encoded(&code.id))))
        .and(body_json(json!({ "ID_token": token.id })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/api/tokens/{}/revoke", encoded(&token.id))))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let ledger = setup_ledger(&mock_server);
    ledger.link_code_token(&code.id, &token.id).await.unwrap();
    ledger.revoke_token_record(&token.id).await.unwrap();
}

// =============================================================================
// Bearer Validation Against the Gateway
// =============================================================================

fn token_engine(ledger: HttpLedger) -> TokenEngine {
    let config = Config::for_testing();
    let ledger: Arc<dyn LedgerGateway> = Arc::new(ledger);
    let (writer, _pool) = LedgerWriter::spawn(
        Arc::clone(&ledger),
        config.ledger.queue_capacity,
        config.ledger.workers,
        config.ledger.enqueue_timeout,
    );
    TokenEngine::new(
        Arc::new(config.oauth),
        GrantStore::new(),
        ledger,
        writer,
        Arc::new(DenyPasswords),
        Hooks::default(),
        config.ledger.read_timeout,
    )
}

fn bearer(token: &str) -> OAuthRequest {
    OAuthRequest::new(Method::GET).with_header(header::AUTHORIZATION, &format!("Bearer {token}"))
}

#[tokio::test]
async fn test_bearer_validated_against_gateway_record() {
    let mock_server = MockServer::start().await;
    let live = sample_token("live-token");
    let mut revoked = sample_token("revoked-token");
    revoked.status = RecordStatus::Revoked;

    Mock::given(method("GET"))
        .and(path(format!("/api/tokens/{}", encoded(&live.id))))
        .respond_with(ResponseTemplate::new(200).set_body_json(&live))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/tokens/{}", encoded(&revoked.id))))
        .respond_with(ResponseTemplate::new(200).set_body_json(&revoked))
        .mount(&mock_server)
        .await;

    let engine = token_engine(setup_ledger(&mock_server));
    let record = engine.validate_bearer(&bearer("live-token")).await.unwrap();
    assert_eq!(record.owner_did, "did:example:alice");

    assert_eq!(
        engine.validate_bearer(&bearer("revoked-token")).await.unwrap_err(),
        OAuthError::InvalidAccessToken
    );
    // Unmatched paths answer 404.
    assert_eq!(
        engine.validate_bearer(&bearer("unknown-token")).await.unwrap_err(),
        OAuthError::InvalidAccessToken
    );
}

#[tokio::test]
async fn test_bearer_fails_closed_on_slow_gateway() {
    let mock_server = MockServer::start().await;
    let live = sample_token("live-token");

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&live).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let engine = token_engine(setup_ledger(&mock_server));
    assert_eq!(
        engine.validate_bearer(&bearer("live-token")).await.unwrap_err(),
        OAuthError::InvalidAccessToken
    );
}
