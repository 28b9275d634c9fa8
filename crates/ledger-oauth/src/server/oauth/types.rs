//! OAuth 2.0 protocol types.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `response_type` values accepted at the authorization endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Code,
    Token,
}

impl ResponseType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "token" => Some(Self::Token),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }

    /// Grant that a successful authorization of this type produces.
    #[must_use]
    pub const fn grant_type(self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::Token => GrantType::Implicit,
        }
    }
}

/// Grant types.
///
/// `Implicit` is never requested at the token endpoint; it names the grant
/// behind `response_type=token` for client-authorization hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantType {
    AuthorizationCode,
    Password,
    ClientCredentials,
    RefreshToken,
    Implicit,
}

impl GrantType {
    /// Parse a token-endpoint `grant_type`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "authorization_code" => Some(Self::AuthorizationCode),
            "password" => Some(Self::Password),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PKCE transformation (RFC 7636 §4.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CodeChallengeMethod {
    #[default]
    Plain,
    S256,
}

impl CodeChallengeMethod {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

/// Transport-neutral view of an inbound request.
///
/// `params` holds query and form parameters merged, form values winning.
#[derive(Debug, Clone)]
pub struct OAuthRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
}

impl OAuthRequest {
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self { method, headers: HeaderMap::new(), params: HashMap::new() }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Add a header. Invalid header values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Parameter value, or `""` when absent.
    #[must_use]
    pub fn form_value(&self, key: &str) -> &str {
        self.params.get(key).map_or("", String::as_str)
    }
}

/// A registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: String,
    pub secret: String,
    /// Base URL redirect URIs must live under.
    pub domain: String,
    /// Owner identity used by the client-credentials grant.
    pub user_id: Option<String>,
}

impl ClientInfo {
    #[must_use]
    pub fn new(id: impl Into<String>, secret: impl Into<String>, domain: impl Into<String>) -> Self {
        Self { id: id.into(), secret: secret.into(), domain: domain.into(), user_id: None }
    }
}

/// A validated authorization request.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub response_type: ResponseType,
    pub client_id: String,
    /// Validated against the client's domain; never empty once validated.
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    /// Resource-owner DID, resolved before issuance.
    pub user_id: String,
    /// Access-token lifetime override from the expiry hook.
    pub access_token_exp: Option<Duration>,
}

/// A validated token-endpoint request.
#[derive(Debug, Clone, Default)]
pub struct GrantRequest {
    pub client_id: String,
    pub client_secret: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code: String,
    pub code_verifier: String,
    pub refresh: String,
}

/// An authorization code held by the grant store.
#[derive(Debug, Clone)]
pub struct AuthCode {
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub code_challenge: String,
    pub code_challenge_method: CodeChallengeMethod,
    pub access_token_exp: Option<Duration>,
    pub issued_at: DateTime<Utc>,
    pub expires_in: Duration,
    pub used: bool,
}

impl AuthCode {
    /// Check if the code has expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expired(self.issued_at, self.expires_in, now)
    }
}

/// An issued access token, optionally paired with a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access: String,
    pub refresh: Option<String>,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub issued_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl IssuedToken {
    /// Check if the access token has expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expired(self.issued_at, self.expires_in, now)
    }
}

/// A refresh token held by the grant store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    /// Access token this refresh token was issued with.
    pub access: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub redirect_uri: String,
    pub issued_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl RefreshGrant {
    /// Check if the refresh token has expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expired(self.issued_at, self.expires_in, now)
    }
}

/// Successful token response body (RFC 6749 §5.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Extension fields, flattened into the top-level object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    const RESERVED: [&'static str; 5] =
        ["access_token", "token_type", "expires_in", "scope", "refresh_token"];

    #[must_use]
    pub fn new(token: &IssuedToken, token_type: &str) -> Self {
        Self {
            access_token: token.access.clone(),
            token_type: token_type.to_owned(),
            expires_in: token.expires_in.as_secs(),
            scope: (!token.scope.is_empty()).then(|| token.scope.clone()),
            refresh_token: token.refresh.clone(),
            extra: serde_json::Map::new(),
        }
    }

    /// Add extension fields. Standard fields are never overridden.
    #[must_use]
    pub fn with_extensions(mut self, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        for (key, value) in fields {
            if !Self::RESERVED.contains(&key.as_str()) {
                self.extra.entry(key).or_insert(value);
            }
        }
        self
    }

    /// Flatten into string parameters for a redirect fragment.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("access_token".to_owned(), self.access_token.clone()),
            ("token_type".to_owned(), self.token_type.clone()),
            ("expires_in".to_owned(), self.expires_in.to_string()),
        ];
        if let Some(scope) = &self.scope {
            params.push(("scope".to_owned(), scope.clone()));
        }
        if let Some(refresh) = &self.refresh_token {
            params.push(("refresh_token".to_owned(), refresh.clone()));
        }
        for (key, value) in &self.extra {
            let value = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            params.push((key.clone(), value));
        }
        params
    }
}

fn expired(issued_at: DateTime<Utc>, lifetime: Duration, now: DateTime<Utc>) -> bool {
    chrono::Duration::from_std(lifetime)
        .ok()
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .is_some_and(|deadline| now >= deadline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for rt in [ResponseType::Code, ResponseType::Token] {
            assert_eq!(ResponseType::parse(rt.as_str()), Some(rt));
        }
        assert_eq!(ResponseType::parse("id_token"), None);
        assert_eq!(GrantType::parse("implicit"), None);
        assert_eq!(CodeChallengeMethod::parse("s256"), None);
        assert_eq!(CodeChallengeMethod::default(), CodeChallengeMethod::Plain);
    }

    #[test]
    fn test_form_value_defaults_to_empty() {
        let request = OAuthRequest::new(Method::GET).with_param("client_id", "222222");
        assert_eq!(request.form_value("client_id"), "222222");
        assert_eq!(request.form_value("scope"), "");
    }

    #[test]
    fn test_token_response_shape() {
        let token = IssuedToken {
            access: "tok".into(),
            refresh: None,
            client_id: "c".into(),
            user_id: String::new(),
            scope: String::new(),
            redirect_uri: String::new(),
            issued_at: Utc::now(),
            expires_in: Duration::from_secs(7200),
        };
        let mut fields = serde_json::Map::new();
        fields.insert("access_token".into(), "hijack".into());
        fields.insert("tenant".into(), serde_json::json!(7));

        let response = TokenResponse::new(&token, "Bearer").with_extensions(fields);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["access_token"], "tok");
        assert_eq!(json["expires_in"], 7200);
        assert_eq!(json["tenant"], 7);
        assert!(json.get("scope").is_none());
        assert!(json.get("refresh_token").is_none());

        let params = response.to_params();
        assert!(params.contains(&("tenant".to_owned(), "7".to_owned())));
    }

    #[test]
    fn test_expiry() {
        let issued = Utc::now();
        let token = IssuedToken {
            access: "a".into(),
            refresh: None,
            client_id: "c".into(),
            user_id: String::new(),
            scope: String::new(),
            redirect_uri: String::new(),
            issued_at: issued,
            expires_in: Duration::from_secs(60),
        };
        assert!(!token.is_expired_at(issued + chrono::Duration::seconds(59)));
        assert!(token.is_expired_at(issued + chrono::Duration::seconds(60)));
    }
}
