//! HTTP transport.
//!
//! Routes the OAuth endpoints, the protected-resource probe and the optional
//! audit queries onto an axum [`Router`].

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::oauth::handlers;
use super::oauth::{AuthorizationEngine, TokenEngine};
use crate::ledger::LedgerGateway;

/// Shared state for HTTP handlers.
pub struct HttpState {
    pub authorize: AuthorizationEngine,
    pub token: TokenEngine,
    /// Ledger handle for audit queries.
    pub ledger: Arc<dyn LedgerGateway>,
    /// `"memory"` or `"http"`, reported by the health check.
    pub ledger_kind: &'static str,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<HttpState>, audit_endpoints: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/authorize", get(handlers::handle_authorize).post(handlers::handle_authorize))
        // GET is rejected by the engine unless enabled in config
        .route("/token", get(handlers::handle_token).post(handlers::handle_token))
        .route("/protected", get(handlers::handle_protected));

    if audit_endpoints {
        router = router
            .route("/audit/codes", get(handlers::handle_audit_codes))
            .route("/audit/tokens", get(handlers::handle_audit_tokens));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ledger-oauth",
        "version": env!("CARGO_PKG_VERSION"),
        "ledger": state.ledger_kind
    }))
}

impl std::fmt::Debug for HttpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpState").field("ledger", &self.ledger_kind).finish_non_exhaustive()
    }
}
