//! In-memory grant store: the protocol fast path.
//!
//! The ledger is the audit path; this store decides whether a code or token is
//! live. Every read-modify-write happens under a single write lock so two
//! concurrent exchanges of the same code cannot both succeed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::types::{AuthCode, AuthorizeRequest, ClientInfo, IssuedToken, RefreshGrant};
use crate::config::{OAuthConfig, oauth};

/// Input for minting an access token.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub lifetime: Duration,
    pub with_refresh: bool,
}

/// A freshly minted authorization code.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
}

/// Result of rotating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub token: IssuedToken,
    /// Access token that the rotation invalidated.
    pub previous_access: String,
}

/// In-memory OAuth state store.
#[derive(Clone)]
pub struct GrantStore {
    clients: Arc<RwLock<HashMap<String, ClientInfo>>>,
    auth_codes: Arc<RwLock<HashMap<String, AuthCode>>>,
    access_tokens: Arc<RwLock<HashMap<String, IssuedToken>>>,
    refresh_tokens: Arc<RwLock<HashMap<String, RefreshGrant>>>,
    auth_code_lifetime: Duration,
    refresh_token_lifetime: Duration,
}

impl GrantStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clients: Arc::default(),
            auth_codes: Arc::default(),
            access_tokens: Arc::default(),
            refresh_tokens: Arc::default(),
            auth_code_lifetime: oauth::AUTH_CODE_LIFETIME,
            refresh_token_lifetime: oauth::REFRESH_TOKEN_LIFETIME,
        }
    }

    /// Store using the code and refresh lifetimes from `config`.
    #[must_use]
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            auth_code_lifetime: config.auth_code_lifetime,
            refresh_token_lifetime: config.refresh_token_lifetime,
            ..Self::new()
        }
    }

    /// Generate a random token using two UUIDs (256 bits).
    fn generate_token() -> String {
        format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
    }

    /// Register or replace a client.
    pub async fn set_client(&self, client: ClientInfo) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Look up a client by ID.
    pub async fn get_client(&self, client_id: &str) -> Option<ClientInfo> {
        self.clients.read().await.get(client_id).cloned()
    }

    /// Create an authorization code for a validated request.
    pub async fn create_auth_code(&self, req: &AuthorizeRequest) -> IssuedCode {
        let code = Self::generate_token();
        let issued_at = Utc::now();

        self.auth_codes.write().await.insert(
            code.clone(),
            AuthCode {
                client_id: req.client_id.clone(),
                user_id: req.user_id.clone(),
                redirect_uri: req.redirect_uri.clone(),
                scope: req.scope.clone(),
                code_challenge: req.code_challenge.clone(),
                code_challenge_method: req.code_challenge_method,
                access_token_exp: req.access_token_exp,
                issued_at,
                expires_in: self.auth_code_lifetime,
                used: false,
            },
        );

        IssuedCode { code, issued_at }
    }

    /// Consume an authorization code (one-time use).
    ///
    /// Returns the code details if valid, unused, and not expired. The code is
    /// burned even when later checks on the returned details fail.
    pub async fn consume_auth_code(&self, code: &str) -> Option<AuthCode> {
        let mut codes = self.auth_codes.write().await;
        let auth_code = codes.get_mut(code)?;

        if auth_code.used || auth_code.is_expired_at(Utc::now()) {
            return None;
        }

        auth_code.used = true;
        Some(auth_code.clone())
    }

    /// Drop a code whose issuance was rolled back.
    pub async fn remove_auth_code(&self, code: &str) -> bool {
        self.auth_codes.write().await.remove(code).is_some()
    }

    /// Mint an access token, plus a refresh token when requested.
    pub async fn create_token(&self, grant: TokenGrant) -> IssuedToken {
        let issued_at = Utc::now();
        let refresh = grant.with_refresh.then(Self::generate_token);

        let token = IssuedToken {
            access: Self::generate_token(),
            refresh: refresh.clone(),
            client_id: grant.client_id,
            user_id: grant.user_id,
            scope: grant.scope,
            redirect_uri: grant.redirect_uri,
            issued_at,
            expires_in: grant.lifetime,
        };

        self.access_tokens.write().await.insert(token.access.clone(), token.clone());

        if let Some(refresh) = refresh {
            self.refresh_tokens.write().await.insert(
                refresh,
                RefreshGrant {
                    access: token.access.clone(),
                    client_id: token.client_id.clone(),
                    user_id: token.user_id.clone(),
                    scope: token.scope.clone(),
                    redirect_uri: token.redirect_uri.clone(),
                    issued_at,
                    expires_in: self.refresh_token_lifetime,
                },
            );
        }

        token
    }

    /// Look up a live access token.
    pub async fn load_access_token(&self, access: &str) -> Option<IssuedToken> {
        let tokens = self.access_tokens.read().await;
        let token = tokens.get(access)?;
        if token.is_expired_at(Utc::now()) {
            return None;
        }
        Some(token.clone())
    }

    /// Look up a live refresh token.
    pub async fn load_refresh_token(&self, refresh: &str) -> Option<RefreshGrant> {
        let tokens = self.refresh_tokens.read().await;
        let grant = tokens.get(refresh)?;
        if grant.is_expired_at(Utc::now()) {
            return None;
        }
        Some(grant.clone())
    }

    /// Rotate a refresh token: invalidate the old pair and issue a new one.
    ///
    /// The token must have been issued to `client_id`; a token presented by
    /// another client is left untouched. `scope` replaces the granted scope
    /// when non-empty.
    pub async fn refresh_token(
        &self,
        client_id: &str,
        refresh: &str,
        scope: &str,
        lifetime: Duration,
    ) -> Option<RefreshedToken> {
        // Check and removal share the write lock, so the rotation is single-use.
        let old = {
            let mut tokens = self.refresh_tokens.write().await;
            if tokens.get(refresh)?.client_id != client_id {
                tracing::warn!(client_id = %client_id, "Refresh token presented by another client");
                return None;
            }
            tokens.remove(refresh)?
        };

        if old.is_expired_at(Utc::now()) {
            return None;
        }

        self.access_tokens.write().await.remove(&old.access);

        let scope = if scope.is_empty() { old.scope } else { scope.to_owned() };
        let token = self
            .create_token(TokenGrant {
                client_id: old.client_id,
                user_id: old.user_id,
                scope,
                redirect_uri: old.redirect_uri,
                lifetime,
                with_refresh: true,
            })
            .await;

        Some(RefreshedToken { token, previous_access: old.access })
    }

    /// Remove an access token and the refresh token issued with it.
    pub async fn revoke_access_token(&self, access: &str) -> bool {
        let Some(token) = self.access_tokens.write().await.remove(access) else {
            return false;
        };
        if let Some(refresh) = token.refresh {
            self.refresh_tokens.write().await.remove(&refresh);
        }
        true
    }

    /// Number of live entries as `(codes, access tokens, refresh tokens)`.
    pub async fn counts(&self) -> (usize, usize, usize) {
        (
            self.auth_codes.read().await.len(),
            self.access_tokens.read().await.len(),
            self.refresh_tokens.read().await.len(),
        )
    }

    /// Start background cleanup task for expired tokens and codes.
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(oauth::CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    /// Drop expired codes and tokens. Used codes go once expired too.
    pub async fn cleanup_expired(&self) {
        let now = Utc::now();

        {
            let mut codes = self.auth_codes.write().await;
            codes.retain(|_, code| !code.is_expired_at(now));
        }

        {
            let mut tokens = self.access_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, token| !token.is_expired_at(now));
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired access tokens");
            }
        }

        {
            let mut tokens = self.refresh_tokens.write().await;
            let before = tokens.len();
            tokens.retain(|_, grant| !grant.is_expired_at(now));
            let removed = before - tokens.len();
            if removed > 0 {
                tracing::debug!(count = removed, "Cleaned up expired refresh tokens");
            }
        }
    }
}

impl Default for GrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::oauth::types::{CodeChallengeMethod, ResponseType};

    fn authorize_request() -> AuthorizeRequest {
        AuthorizeRequest {
            response_type: ResponseType::Code,
            client_id: "client1".into(),
            redirect_uri: "http://localhost/callback".into(),
            scope: "read".into(),
            state: String::new(),
            code_challenge: String::new(),
            code_challenge_method: CodeChallengeMethod::Plain,
            user_id: "did:ro".into(),
            access_token_exp: None,
        }
    }

    fn grant(with_refresh: bool) -> TokenGrant {
        TokenGrant {
            client_id: "client1".into(),
            user_id: "did:ro".into(),
            scope: "read write".into(),
            redirect_uri: String::new(),
            lifetime: Duration::from_secs(3600),
            with_refresh,
        }
    }

    #[tokio::test]
    async fn test_client_lookup() {
        let store = GrantStore::new();
        store.set_client(ClientInfo::new("222222", "22222222", "http://localhost:9094")).await;

        let client = store.get_client("222222").await.unwrap();
        assert_eq!(client.secret, "22222222");
        assert!(store.get_client("unknown").await.is_none());
    }

    #[tokio::test]
    async fn test_auth_code_lifecycle() {
        let store = GrantStore::new();
        let issued = store.create_auth_code(&authorize_request()).await;
        assert_eq!(issued.code.len(), 64);

        // First consume succeeds
        let code = store.consume_auth_code(&issued.code).await.unwrap();
        assert_eq!(code.client_id, "client1");
        assert_eq!(code.user_id, "did:ro");

        // Second consume fails (already used)
        assert!(store.consume_auth_code(&issued.code).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() {
        let config = OAuthConfig { auth_code_lifetime: Duration::ZERO, ..OAuthConfig::default() };
        let store = GrantStore::from_config(&config);
        let issued = store.create_auth_code(&authorize_request()).await;

        assert!(store.consume_auth_code(&issued.code).await.is_none());
        store.cleanup_expired().await;
        assert_eq!(store.counts().await.0, 0);
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let store = GrantStore::new();
        let token = store.create_token(grant(false)).await;
        assert!(token.refresh.is_none());

        let loaded = store.load_access_token(&token.access).await.unwrap();
        assert_eq!(loaded.client_id, "client1");
        assert!(store.load_access_token("invalid").await.is_none());

        assert!(store.revoke_access_token(&token.access).await);
        assert!(store.load_access_token(&token.access).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_rotation() {
        let store = GrantStore::new();
        let token = store.create_token(grant(true)).await;
        let refresh = token.refresh.clone().unwrap();

        let rotated = store.refresh_token("client1", &refresh, "read", Duration::from_secs(60)).await.unwrap();
        assert_eq!(rotated.previous_access, token.access);
        assert_eq!(rotated.token.scope, "read");
        assert!(rotated.token.refresh.is_some());

        // Old access token is invalid, new one is valid
        assert!(store.load_access_token(&token.access).await.is_none());
        assert!(store.load_access_token(&rotated.token.access).await.is_some());

        // Old refresh token can't be reused
        assert!(store.refresh_token("client1", &refresh, "", Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_scope_when_empty() {
        let store = GrantStore::new();
        let token = store.create_token(grant(true)).await;
        let rotated = store
            .refresh_token("client1", token.refresh.as_deref().unwrap(), "", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(rotated.token.scope, "read write");
    }

    #[tokio::test]
    async fn test_refresh_bound_to_issuing_client() {
        let store = GrantStore::new();
        let token = store.create_token(grant(true)).await;
        let refresh = token.refresh.clone().unwrap();

        assert!(store.refresh_token("client2", &refresh, "", Duration::from_secs(60)).await.is_none());

        // The rejected attempt leaves the pair intact.
        assert!(store.load_access_token(&token.access).await.is_some());
        assert!(store.load_refresh_token(&refresh).await.is_some());
        assert!(store.refresh_token("client1", &refresh, "", Duration::from_secs(60)).await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_consume_has_one_winner() {
        let store = GrantStore::new();
        let issued = store.create_auth_code(&authorize_request()).await;

        let (a, b) =
            tokio::join!(store.consume_auth_code(&issued.code), store.consume_auth_code(&issued.code));
        assert_eq!(usize::from(a.is_some()) + usize::from(b.is_some()), 1);
    }
}
