//! Error types for the ledger-backed OAuth server.
//!
//! Uses `thiserror` for structured error handling with automatic `From` implementations.
//! [`OAuthError::to_response`] is the single place where internal failures are mapped
//! onto the RFC 6749 error taxonomy.

use std::time::Duration;

use axum::http::StatusCode;
use serde::Serialize;

/// Errors from the ledger gateway layer.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    /// HTTP transport error (connection, DNS, TLS, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Middleware error
    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Record JSON could not be parsed
    #[error("Failed to parse ledger response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Ledger gateway URL is malformed
    #[error("Invalid ledger URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Unexpected HTTP status from the ledger gateway
    #[error("Ledger returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or message
        message: String,
    },

    /// The write would violate an append-only invariant
    #[error("Ledger conflict on {id}: {reason}")]
    Conflict {
        /// Record identifier
        id: String,
        /// Which invariant was violated
        reason: String,
    },

    /// A write referenced a record that does not exist
    #[error("Ledger record not found: {id}")]
    NotFound {
        /// Record identifier
        id: String,
    },

    /// A synchronous read did not complete in time
    #[error("Ledger read timed out after {0:?}")]
    Timeout(Duration),

    /// The write queue stayed full for the whole enqueue window
    #[error("Ledger write queue is full")]
    QueueFull,

    /// The write queue has shut down
    #[error("Ledger write queue is closed")]
    Closed,
}

impl LedgerError {
    /// Create a conflict error.
    #[must_use]
    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict { id: id.into(), reason: reason.into() }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// OAuth 2.0 protocol errors.
///
/// Every variant maps to exactly one wire-level `error` code via [`OAuthError::code`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OAuthError {
    #[error("invalid_request")]
    InvalidRequest,

    /// PKCE is mandated but the request carries no `code_challenge`.
    #[error("code_challenge_required")]
    CodeChallengeRequired,

    /// `code_challenge` length is outside `[43, 128]`.
    #[error("invalid_code_challenge_len")]
    InvalidCodeChallengeLen,

    #[error("unsupported_code_challenge_method")]
    UnsupportedCodeChallengeMethod,

    /// Redirect URI does not belong to the client's registered domain.
    #[error("invalid_redirect_uri")]
    InvalidRedirectUri,

    #[error("unauthorized_client")]
    UnauthorizedClient,

    #[error("access_denied")]
    AccessDenied,

    #[error("unsupported_response_type")]
    UnsupportedResponseType,

    #[error("unsupported_grant_type")]
    UnsupportedGrantType,

    #[error("invalid_scope")]
    InvalidScope,

    #[error("invalid_grant")]
    InvalidGrant,

    #[error("invalid_client")]
    InvalidClient,

    #[error("invalid_access_token")]
    InvalidAccessToken,

    #[error("temporarily_unavailable")]
    TemporarilyUnavailable,

    /// Unexpected internal failure. The detail is logged, never sent to clients.
    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    /// Create a server error from any displayable failure.
    #[must_use]
    pub fn server(detail: impl std::fmt::Display) -> Self {
        Self::ServerError(detail.to_string())
    }

    /// Wire-level `error` code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::CodeChallengeRequired
            | Self::InvalidCodeChallengeLen
            | Self::UnsupportedCodeChallengeMethod
            | Self::InvalidRedirectUri => "invalid_request",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidClient => "invalid_client",
            Self::InvalidAccessToken => "invalid_access_token",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::ServerError(_) => "server_error",
        }
    }

    /// Human-readable `error_description`.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InvalidRequest => {
                "The request is missing a required parameter, includes an invalid parameter value, \
                 includes a parameter more than once, or is otherwise malformed"
            }
            Self::CodeChallengeRequired => "PKCE is required. code_challenge is missing",
            Self::InvalidCodeChallengeLen => {
                "Code challenge length must be between 43 and 128 characters long"
            }
            Self::UnsupportedCodeChallengeMethod => "Selected code_challenge_method not supported",
            Self::InvalidRedirectUri => {
                "The redirect_uri does not match the domain registered for this client"
            }
            Self::UnauthorizedClient => {
                "The client is not authorized to request an authorization code using this method"
            }
            Self::AccessDenied => "The resource owner or authorization server denied the request",
            Self::UnsupportedResponseType => {
                "The authorization server does not support obtaining an authorization code using \
                 this method"
            }
            Self::UnsupportedGrantType => {
                "The authorization grant type is not supported by the authorization server"
            }
            Self::InvalidScope => "The requested scope is invalid, unknown, or malformed",
            Self::InvalidGrant => {
                "The provided authorization grant (e.g., authorization code, resource owner \
                 credentials) or refresh token is invalid, expired, revoked, does not match the \
                 redirection URI used in the authorization request, or was issued to another client"
            }
            Self::InvalidClient => "Client authentication failed",
            Self::InvalidAccessToken => {
                "The access token provided is expired, revoked, malformed, or invalid"
            }
            Self::TemporarilyUnavailable => {
                "The authorization server is currently unable to handle the request due to a \
                 temporary overloading or maintenance of the server"
            }
            Self::ServerError(_) => {
                "The authorization server encountered an unexpected condition that prevented it \
                 from fulfilling the request"
            }
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::UnauthorizedClient | Self::InvalidClient => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::TemporarilyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Map to the client-facing error response.
    ///
    /// Internal details are logged here and replaced by the generic description.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        if let Self::ServerError(detail) = self {
            tracing::error!(error = %detail, "Internal error");
        }

        let response = ErrorResponse {
            error: self.code(),
            error_description: self.description(),
            status: self.status(),
        };
        tracing::debug!(error = response.error, status = response.status.as_u16(), "Response error");
        response
    }
}

impl From<LedgerError> for OAuthError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::QueueFull => Self::TemporarilyUnavailable,
            other => Self::server(other),
        }
    }
}

/// Client-facing error body (`{error, error_description}`) plus its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub error_description: &'static str,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ErrorResponse {
    /// Parameters for a redirect-borne error.
    #[must_use]
    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("error".to_owned(), self.error.to_owned()),
            ("error_description".to_owned(), self.error_description.to_owned()),
        ]
    }
}

/// Result type alias for protocol operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pkce_errors_are_invalid_request_class() {
        for err in [
            OAuthError::CodeChallengeRequired,
            OAuthError::InvalidCodeChallengeLen,
            OAuthError::UnsupportedCodeChallengeMethod,
        ] {
            assert_eq!(err.code(), "invalid_request");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
        assert_ne!(
            OAuthError::InvalidCodeChallengeLen.description(),
            OAuthError::CodeChallengeRequired.description()
        );
    }

    #[test]
    fn test_status_table() {
        assert_eq!(OAuthError::UnauthorizedClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuthError::InvalidClient.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(OAuthError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(OAuthError::InvalidGrant.status(), StatusCode::BAD_REQUEST);
        assert_eq!(OAuthError::UnsupportedGrantType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(OAuthError::InvalidAccessToken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            OAuthError::server("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_server_error_hides_detail() {
        let response = OAuthError::server("database password is hunter2").to_response();
        assert_eq!(response.error, "server_error");
        assert!(!response.error_description.contains("hunter2"));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "server_error");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn test_ledger_error_mapping() {
        assert_eq!(OAuthError::from(LedgerError::QueueFull), OAuthError::TemporarilyUnavailable);
        assert_eq!(OAuthError::from(LedgerError::Closed).code(), "server_error");
    }
}
