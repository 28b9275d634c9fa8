//! Authorization endpoint logic.
//!
//! Validates `/authorize` requests, mints codes or implicit tokens, mirrors
//! them into the ledger through the write queue, and builds the redirect.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::Method;
use url::Url;

use super::hooks::{Hooks, OwnerIdentityResolver};
use super::store::{GrantStore, TokenGrant};
use super::types::{
    AuthorizeRequest, CodeChallengeMethod, GrantRequest, OAuthRequest, ResponseType,
    TokenResponse,
};
use crate::config::{OAuthConfig, oauth};
use crate::error::{ErrorResponse, OAuthError, OAuthResult};
use crate::ledger::{CodeRecord, LedgerWrite, LedgerWriter, TokenRecord};

/// What the transport should answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// 302 to this location (success or redirect-borne error).
    Redirect(String),
    /// No validated redirect URI: answer with a JSON error.
    Error(ErrorResponse),
}

/// Handles the authorization endpoint.
#[derive(Clone)]
pub struct AuthorizationEngine {
    config: Arc<OAuthConfig>,
    store: GrantStore,
    writer: LedgerWriter,
    identity: Arc<dyn OwnerIdentityResolver>,
    hooks: Hooks,
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(
        config: Arc<OAuthConfig>,
        store: GrantStore,
        writer: LedgerWriter,
        identity: Arc<dyn OwnerIdentityResolver>,
        hooks: Hooks,
    ) -> Self {
        Self { config, store, writer, identity, hooks }
    }

    /// Validate an authorization request and resolve its redirect URI.
    ///
    /// # Errors
    ///
    /// Any error here means no redirect URI has been validated yet.
    pub async fn validate_authorize_request(
        &self,
        request: &OAuthRequest,
    ) -> OAuthResult<AuthorizeRequest> {
        let client_id = request.form_value("client_id");
        if (request.method != Method::GET && request.method != Method::POST) || client_id.is_empty() {
            return Err(OAuthError::InvalidRequest);
        }

        let response_type = ResponseType::parse(request.form_value("response_type"))
            .filter(|rt| self.config.allows_response_type(*rt))
            .ok_or(OAuthError::UnsupportedResponseType)?;

        let code_challenge = request.form_value("code_challenge");
        if code_challenge.is_empty() && self.config.force_pkce {
            return Err(OAuthError::CodeChallengeRequired);
        }
        if !code_challenge.is_empty()
            && !(oauth::MIN_CODE_CHALLENGE_LEN..=oauth::MAX_CODE_CHALLENGE_LEN)
                .contains(&code_challenge.len())
        {
            return Err(OAuthError::InvalidCodeChallengeLen);
        }

        let code_challenge_method = match request.form_value("code_challenge_method") {
            "" => CodeChallengeMethod::default(),
            raw => CodeChallengeMethod::parse(raw).ok_or(OAuthError::UnsupportedCodeChallengeMethod)?,
        };
        if !self.config.allows_code_challenge_method(code_challenge_method) {
            return Err(OAuthError::UnsupportedCodeChallengeMethod);
        }

        let client = self.store.get_client(client_id).await.ok_or(OAuthError::InvalidClient)?;

        let redirect_uri = match request.form_value("redirect_uri") {
            "" => client.domain.clone(),
            uri => {
                validate_redirect_uri(&client.domain, uri)?;
                uri.to_owned()
            }
        };

        Ok(AuthorizeRequest {
            response_type,
            client_id: client_id.to_owned(),
            redirect_uri,
            scope: request.form_value("scope").to_owned(),
            state: request.form_value("state").to_owned(),
            code_challenge: code_challenge.to_owned(),
            code_challenge_method,
            user_id: String::new(),
            access_token_exp: None,
        })
    }

    /// Resolve the owner, apply policy hooks, mint the grant and queue its record.
    ///
    /// Returns the parameters to deliver through the redirect.
    ///
    /// # Errors
    ///
    /// Policy rejections, or `temporarily_unavailable` when the ledger queue is
    /// saturated (the minted grant is rolled back first).
    pub async fn issue_authorization(
        &self,
        req: &mut AuthorizeRequest,
        request: &OAuthRequest,
    ) -> OAuthResult<Vec<(String, String)>> {
        let client = self.store.get_client(&req.client_id).await.ok_or(OAuthError::InvalidClient)?;
        req.user_id = self.identity.resolve_owner(request, &client).await?;

        if let Some(f) = &self.hooks.authorize_scope {
            if let Some(scope) = f(request)?.filter(|s| !s.is_empty()) {
                req.scope = scope;
            }
        }
        if let Some(f) = &self.hooks.access_token_exp {
            req.access_token_exp = f(request)?;
        }

        self.hooks.check_client_authorized(&req.client_id, req.response_type.grant_type())?;
        self.hooks.check_client_scope(&GrantRequest {
            client_id: req.client_id.clone(),
            user_id: req.user_id.clone(),
            redirect_uri: req.redirect_uri.clone(),
            scope: req.scope.clone(),
            ..GrantRequest::default()
        })?;

        match req.response_type {
            ResponseType::Code => self.issue_code(req).await,
            ResponseType::Token => self.issue_implicit_token(req).await,
        }
    }

    async fn issue_code(&self, req: &AuthorizeRequest) -> OAuthResult<Vec<(String, String)>> {
        let issued = self.store.create_auth_code(req).await;
        let record = CodeRecord::new(
            &issued.code,
            &req.user_id,
            &req.client_id,
            &req.scope,
            &req.redirect_uri,
            issued.issued_at,
        );
        let record_id = record.id.clone();

        if let Err(e) = self.writer.submit(LedgerWrite::CreateCode(record)).await {
            self.store.remove_auth_code(&issued.code).await;
            return Err(e.into());
        }

        tracing::info!(
            client_id = %req.client_id,
            owner_did = %req.user_id,
            record_id = %record_id,
            "Issued authorization code"
        );
        Ok(vec![("code".to_owned(), issued.code)])
    }

    async fn issue_implicit_token(
        &self,
        req: &AuthorizeRequest,
    ) -> OAuthResult<Vec<(String, String)>> {
        let lifetime = req.access_token_exp.unwrap_or(self.config.implicit_token_lifetime);
        let token = self
            .store
            .create_token(TokenGrant {
                client_id: req.client_id.clone(),
                user_id: req.user_id.clone(),
                scope: req.scope.clone(),
                redirect_uri: req.redirect_uri.clone(),
                lifetime,
                with_refresh: false,
            })
            .await;
        let record = TokenRecord::new(
            &token.access,
            &token.user_id,
            &token.client_id,
            &token.scope,
            &token.redirect_uri,
            token.issued_at,
            lifetime,
        );
        let record_id = record.id.clone();

        if let Err(e) = self.writer.submit(LedgerWrite::CreateToken(record)).await {
            self.store.revoke_access_token(&token.access).await;
            return Err(e.into());
        }

        tracing::info!(
            client_id = %req.client_id,
            owner_did = %req.user_id,
            record_id = %record_id,
            "Issued implicit access token"
        );

        let mut response = TokenResponse::new(&token, &self.config.token_type);
        if let Some(f) = &self.hooks.extension_fields {
            response = response.with_extensions(f(&token));
        }
        Ok(response.to_params())
    }

    /// Build the redirect location.
    ///
    /// `code` responses go in the query, `token` responses in the fragment with
    /// the query cleared. Parameters are sorted by key; `state` is echoed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRedirectUri` if the redirect URI does not parse.
    pub fn build_redirect(req: &AuthorizeRequest, data: &[(String, String)]) -> OAuthResult<String> {
        let mut uri = Url::parse(&req.redirect_uri).map_err(|_| OAuthError::InvalidRedirectUri)?;

        let mut params: BTreeMap<String, String> = uri.query_pairs().into_owned().collect();
        if !req.state.is_empty() {
            params.insert("state".to_owned(), req.state.clone());
        }
        for (key, value) in data {
            params.insert(key.clone(), value.clone());
        }

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&params)
            .finish();

        match req.response_type {
            ResponseType::Code => uri.set_query(Some(&encoded)),
            ResponseType::Token => {
                uri.set_query(None);
                uri.set_fragment(Some(&encoded));
            }
        }

        Ok(uri.into())
    }

    /// Run the whole authorization flow for one request.
    pub async fn handle_authorize_request(&self, request: &OAuthRequest) -> AuthorizeOutcome {
        let mut req = match self.validate_authorize_request(request).await {
            Ok(req) => req,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected authorization request");
                return AuthorizeOutcome::Error(e.to_response());
            }
        };

        match self.issue_authorization(&mut req, request).await {
            Ok(data) => match Self::build_redirect(&req, &data) {
                Ok(location) => AuthorizeOutcome::Redirect(location),
                Err(e) => AuthorizeOutcome::Error(e.to_response()),
            },
            Err(e) => Self::redirect_error(&req, &e),
        }
    }

    fn redirect_error(req: &AuthorizeRequest, err: &OAuthError) -> AuthorizeOutcome {
        let response = err.to_response();
        match Self::build_redirect(req, &response.to_params()) {
            Ok(location) => AuthorizeOutcome::Redirect(location),
            Err(_) => AuthorizeOutcome::Error(response),
        }
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine").field("hooks", &self.hooks).finish_non_exhaustive()
    }
}

/// `host[:port]` as written in the URI.
fn authority(uri: &Url) -> String {
    match (uri.host_str(), uri.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_owned(),
        (None, _) => String::new(),
    }
}

/// The redirect URI's authority must be the client domain's authority or a
/// subdomain of it.
fn validate_redirect_uri(domain: &str, redirect_uri: &str) -> OAuthResult<()> {
    let base = Url::parse(domain).map_err(|_| OAuthError::InvalidRedirectUri)?;
    let redirect = Url::parse(redirect_uri).map_err(|_| OAuthError::InvalidRedirectUri)?;

    let base = authority(&base);
    let target = authority(&redirect);
    let subdomain = target
        .strip_suffix(base.as_str())
        .is_some_and(|prefix| prefix.ends_with('.'));
    if base.is_empty() || !(target == base || subdomain) {
        return Err(OAuthError::InvalidRedirectUri);
    }
    Ok(())
}
