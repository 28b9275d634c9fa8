//! OAuth 2.0 endpoint handlers.
//!
//! Thin axum adapters: each handler folds query and form parameters into an
//! [`OAuthRequest`] and hands it to an engine.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use super::authorize::AuthorizeOutcome;
use super::types::OAuthRequest;
use crate::error::{ErrorResponse, OAuthError};
use crate::server::transport::HttpState;

type Params = HashMap<String, String>;

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Merge query and form parameters; form values win.
fn oauth_request(
    method: Method,
    headers: HeaderMap,
    query: Result<Query<Params>, QueryRejection>,
    form: Result<Form<Params>, FormRejection>,
) -> OAuthRequest {
    let mut params = query.map(|Query(q)| q).unwrap_or_default();
    if let Ok(Form(form)) = form {
        params.extend(form);
    }
    OAuthRequest { method, headers, params }
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// `GET|POST /authorize`
pub async fn handle_authorize(
    State(state): State<Arc<HttpState>>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<Params>, QueryRejection>,
    form: Result<Form<Params>, FormRejection>,
) -> Response {
    let request = oauth_request(method, headers, query, form);

    match state.authorize.handle_authorize_request(&request).await {
        AuthorizeOutcome::Redirect(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        AuthorizeOutcome::Error(error) => error.into_response(),
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /token` (and `GET` when enabled)
pub async fn handle_token(
    State(state): State<Arc<HttpState>>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<Params>, QueryRejection>,
    form: Result<Form<Params>, FormRejection>,
) -> Response {
    let request = oauth_request(method, headers, query, form);

    let mut response = match state.token.handle_token_request(&request).await {
        Ok(data) => Json(data).into_response(),
        Err(e) => e.to_response().into_response(),
    };

    // RFC 6749 §5.1
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

// ─── Protected Resource ──────────────────────────────────────────────────────

/// `GET /protected`
///
/// Answers with the token's audit view when the bearer token checks out.
pub async fn handle_protected(
    State(state): State<Arc<HttpState>>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<Params>, QueryRejection>,
    form: Result<Form<Params>, FormRejection>,
) -> Response {
    let request = oauth_request(method, headers, query, form);

    match state.token.validate_bearer(&request).await {
        Ok(record) => Json(serde_json::json!({
            "client_id": record.client_did,
            "user_id": record.owner_did,
            "scope": record.scope,
            "expires_in": (record.expires_at - Utc::now()).num_seconds().max(0)
        }))
        .into_response(),
        Err(e) => e.to_response().into_response(),
    }
}

// ─── Audit Queries ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub did: Option<String>,
}

/// `GET /audit/codes?did=`
pub async fn handle_audit_codes(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<AuditQuery>,
) -> Response {
    let Some(did) = query.did.filter(|d| !d.is_empty()) else {
        return OAuthError::InvalidRequest.to_response().into_response();
    };
    match state.ledger.codes_by_owner(&did).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => OAuthError::server(e).to_response().into_response(),
    }
}

/// `GET /audit/tokens?did=`
pub async fn handle_audit_tokens(
    State(state): State<Arc<HttpState>>,
    Query(query): Query<AuditQuery>,
) -> Response {
    let Some(did) = query.did.filter(|d| !d.is_empty()) else {
        return OAuthError::InvalidRequest.to_response().into_response();
    };
    match state.ledger.tokens_by_owner(&did).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => OAuthError::server(e).to_response().into_response(),
    }
}
