//! Pluggable capabilities consulted by the engines.
//!
//! Identity resolution and password checks are traits so deployments can
//! swap in real DID authentication. Policy hooks are optional closures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::types::{ClientInfo, GrantRequest, GrantType, IssuedToken, OAuthRequest, RefreshGrant};
use crate::error::{OAuthError, OAuthResult};

/// Resolves the resource owner's DID before a code or implicit token is issued.
#[async_trait]
pub trait OwnerIdentityResolver: Send + Sync {
    async fn resolve_owner(&self, request: &OAuthRequest, client: &ClientInfo)
    -> OAuthResult<String>;
}

/// Resolver that always answers with the same DID.
#[derive(Debug, Clone)]
pub struct FixedOwnerIdentity {
    did: String,
}

impl FixedOwnerIdentity {
    #[must_use]
    pub fn new(did: impl Into<String>) -> Self {
        Self { did: did.into() }
    }
}

#[async_trait]
impl OwnerIdentityResolver for FixedOwnerIdentity {
    async fn resolve_owner(&self, _: &OAuthRequest, _: &ClientInfo) -> OAuthResult<String> {
        if self.did.is_empty() {
            return Err(OAuthError::AccessDenied);
        }
        Ok(self.did.clone())
    }
}

/// Checks resource-owner credentials for the password grant.
///
/// `Ok(None)` means the credentials did not match (`invalid_grant`).
pub trait PasswordAuthorizer: Send + Sync {
    fn authorize(&self, username: &str, password: &str) -> OAuthResult<Option<String>>;
}

impl<F> PasswordAuthorizer for F
where
    F: Fn(&str, &str) -> OAuthResult<Option<String>> + Send + Sync,
{
    fn authorize(&self, username: &str, password: &str) -> OAuthResult<Option<String>> {
        self(username, password)
    }
}

/// Rejects every password grant with `access_denied`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyPasswords;

impl PasswordAuthorizer for DenyPasswords {
    fn authorize(&self, _: &str, _: &str) -> OAuthResult<Option<String>> {
        Err(OAuthError::AccessDenied)
    }
}

/// Fixed username/password table. The username doubles as the user ID.
#[derive(Debug, Clone, Default)]
pub struct StaticPasswords {
    users: HashMap<String, String>,
}

impl StaticPasswords {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl PasswordAuthorizer for StaticPasswords {
    fn authorize(&self, username: &str, password: &str) -> OAuthResult<Option<String>> {
        Ok(self
            .users
            .get(username)
            .filter(|expected| expected.as_str() == password)
            .map(|_| username.to_owned()))
    }
}

pub type ClientAuthorizedFn = Arc<dyn Fn(&str, GrantType) -> OAuthResult<bool> + Send + Sync>;
pub type ClientScopeFn = Arc<dyn Fn(&GrantRequest) -> OAuthResult<bool> + Send + Sync>;
pub type AuthorizeScopeFn = Arc<dyn Fn(&OAuthRequest) -> OAuthResult<Option<String>> + Send + Sync>;
pub type AccessTokenExpFn =
    Arc<dyn Fn(&OAuthRequest) -> OAuthResult<Option<Duration>> + Send + Sync>;
pub type RefreshingScopeFn = Arc<dyn Fn(&GrantRequest, &str) -> OAuthResult<bool> + Send + Sync>;
pub type RefreshingValidationFn = Arc<dyn Fn(&RefreshGrant) -> OAuthResult<bool> + Send + Sync>;
pub type ExtensionFieldsFn =
    Arc<dyn Fn(&IssuedToken) -> serde_json::Map<String, serde_json::Value> + Send + Sync>;

/// Optional policy hooks. Unset hooks allow everything.
#[derive(Clone, Default)]
pub struct Hooks {
    /// May this client use this grant? `false` ⇒ `unauthorized_client`.
    pub client_authorized: Option<ClientAuthorizedFn>,
    /// May this client receive the requested scope? `false` ⇒ `invalid_scope`.
    pub client_scope: Option<ClientScopeFn>,
    /// Replace the requested scope at `/authorize`.
    pub authorize_scope: Option<AuthorizeScopeFn>,
    /// Override the access-token lifetime at `/authorize`.
    pub access_token_exp: Option<AccessTokenExpFn>,
    /// Check a narrowed refresh scope against the granted one.
    pub refreshing_scope: Option<RefreshingScopeFn>,
    /// Veto a refresh. `false` ⇒ `invalid_scope`.
    pub refreshing_validation: Option<RefreshingValidationFn>,
    /// Extra fields for token responses; standard fields win on collision.
    pub extension_fields: Option<ExtensionFieldsFn>,
}

impl Hooks {
    #[must_use]
    pub fn with_client_authorized<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, GrantType) -> OAuthResult<bool> + Send + Sync + 'static,
    {
        self.client_authorized = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_client_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&GrantRequest) -> OAuthResult<bool> + Send + Sync + 'static,
    {
        self.client_scope = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_authorize_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&OAuthRequest) -> OAuthResult<Option<String>> + Send + Sync + 'static,
    {
        self.authorize_scope = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_access_token_exp<F>(mut self, f: F) -> Self
    where
        F: Fn(&OAuthRequest) -> OAuthResult<Option<Duration>> + Send + Sync + 'static,
    {
        self.access_token_exp = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_refreshing_scope<F>(mut self, f: F) -> Self
    where
        F: Fn(&GrantRequest, &str) -> OAuthResult<bool> + Send + Sync + 'static,
    {
        self.refreshing_scope = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_refreshing_validation<F>(mut self, f: F) -> Self
    where
        F: Fn(&RefreshGrant) -> OAuthResult<bool> + Send + Sync + 'static,
    {
        self.refreshing_validation = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn with_extension_fields<F>(mut self, f: F) -> Self
    where
        F: Fn(&IssuedToken) -> serde_json::Map<String, serde_json::Value> + Send + Sync + 'static,
    {
        self.extension_fields = Some(Arc::new(f));
        self
    }

    pub(crate) fn check_client_authorized(&self, client_id: &str, grant: GrantType) -> OAuthResult<()> {
        match &self.client_authorized {
            Some(f) if !f(client_id, grant)? => Err(OAuthError::UnauthorizedClient),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_client_scope(&self, req: &GrantRequest) -> OAuthResult<()> {
        match &self.client_scope {
            Some(f) if !f(req)? => Err(OAuthError::InvalidScope),
            _ => Ok(()),
        }
    }

    /// Refresh scope check; without a hook the request must narrow the grant.
    pub(crate) fn check_refreshing_scope(&self, req: &GrantRequest, granted: &str) -> OAuthResult<()> {
        let allowed = match &self.refreshing_scope {
            Some(f) => f(req, granted)?,
            None => scope_is_subset(&req.scope, granted),
        };
        if allowed { Ok(()) } else { Err(OAuthError::InvalidScope) }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("client_authorized", &self.client_authorized.is_some())
            .field("client_scope", &self.client_scope.is_some())
            .field("authorize_scope", &self.authorize_scope.is_some())
            .field("access_token_exp", &self.access_token_exp.is_some())
            .field("refreshing_scope", &self.refreshing_scope.is_some())
            .field("refreshing_validation", &self.refreshing_validation.is_some())
            .field("extension_fields", &self.extension_fields.is_some())
            .finish()
    }
}

/// Whether every space-delimited scope in `requested` appears in `granted`.
#[must_use]
pub fn scope_is_subset(requested: &str, granted: &str) -> bool {
    let granted: Vec<&str> = granted.split_whitespace().collect();
    requested.split_whitespace().all(|scope| granted.contains(&scope))
}
