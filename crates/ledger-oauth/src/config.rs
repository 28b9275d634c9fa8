//! Configuration for the ledger-backed OAuth server.

use std::time::Duration;

use crate::server::oauth::types::{CodeChallengeMethod, GrantType, ResponseType};

/// Protocol defaults.
pub mod oauth {
    use std::time::Duration;

    /// Token type announced in token responses.
    pub const TOKEN_TYPE: &str = "Bearer";

    /// Authorization code lifetime (10 minutes).
    pub const AUTH_CODE_LIFETIME: Duration = Duration::from_secs(600);

    /// Access token lifetime for code, password, client and refresh grants (2 hours).
    pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::from_secs(2 * 3600);

    /// Access token lifetime for the implicit grant (1 hour).
    pub const IMPLICIT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

    /// Refresh token lifetime (3 days).
    pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::from_secs(72 * 3600);

    /// Minimum PKCE `code_challenge` length (RFC 7636 §4.2).
    pub const MIN_CODE_CHALLENGE_LEN: usize = 43;

    /// Maximum PKCE `code_challenge` length (RFC 7636 §4.2).
    pub const MAX_CODE_CHALLENGE_LEN: usize = 128;

    /// Interval between sweeps of expired grants.
    pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Resource-owner DID used when no identity resolver is configured.
    pub const DEFAULT_OWNER_DID: &str = "did:example:owner";
}

/// Ledger connection defaults.
pub mod ledger {
    use std::time::Duration;

    /// Whole-request timeout for the ledger gateway.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout for the ledger gateway.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Upper bound on a synchronous record read.
    pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

    /// Pending writes allowed before backpressure applies.
    pub const QUEUE_CAPACITY: usize = 1024;

    /// Fixed number of write workers.
    pub const WORKERS: usize = 4;

    /// How long a request waits for queue capacity before failing.
    pub const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

    /// Transport-level retries for the HTTP adapter.
    pub const MAX_RETRIES: u32 = 3;
}

/// OAuth protocol configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Token type announced in token responses.
    pub token_type: String,

    /// Response types accepted at `/authorize`.
    pub allowed_response_types: Vec<ResponseType>,

    /// Grant types accepted at `/token`.
    pub allowed_grant_types: Vec<GrantType>,

    /// PKCE methods accepted at `/authorize`.
    pub allowed_code_challenge_methods: Vec<CodeChallengeMethod>,

    /// Require PKCE on every authorization code flow.
    pub force_pkce: bool,

    /// Accept `GET /token` in addition to `POST`.
    pub allow_get_access_request: bool,

    /// Authorization code lifetime.
    pub auth_code_lifetime: Duration,

    /// Access token lifetime (all grants except implicit).
    pub access_token_lifetime: Duration,

    /// Access token lifetime for the implicit grant.
    pub implicit_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,
}

impl OAuthConfig {
    /// Check if a response type is allowed.
    #[must_use]
    pub fn allows_response_type(&self, rt: ResponseType) -> bool {
        self.allowed_response_types.contains(&rt)
    }

    /// Check if a grant type is allowed.
    #[must_use]
    pub fn allows_grant_type(&self, gt: GrantType) -> bool {
        self.allowed_grant_types.contains(&gt)
    }

    /// Check if a code challenge method is allowed.
    #[must_use]
    pub fn allows_code_challenge_method(&self, ccm: CodeChallengeMethod) -> bool {
        self.allowed_code_challenge_methods.contains(&ccm)
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_type: oauth::TOKEN_TYPE.to_string(),
            allowed_response_types: vec![ResponseType::Code, ResponseType::Token],
            allowed_grant_types: vec![
                GrantType::AuthorizationCode,
                GrantType::Password,
                GrantType::ClientCredentials,
                GrantType::RefreshToken,
            ],
            allowed_code_challenge_methods: vec![
                CodeChallengeMethod::Plain,
                CodeChallengeMethod::S256,
            ],
            force_pkce: false,
            allow_get_access_request: false,
            auth_code_lifetime: oauth::AUTH_CODE_LIFETIME,
            access_token_lifetime: oauth::ACCESS_TOKEN_LIFETIME,
            implicit_token_lifetime: oauth::IMPLICIT_TOKEN_LIFETIME,
            refresh_token_lifetime: oauth::REFRESH_TOKEN_LIFETIME,
        }
    }
}

/// Ledger connection and write-pool configuration.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Base URL of the ledger REST gateway. `None` selects the in-process ledger.
    pub url: Option<String>,

    /// Whole-request timeout.
    pub request_timeout: Duration,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Bound on synchronous reads; elapsing counts as "not found".
    pub read_timeout: Duration,

    /// Bounded write queue capacity.
    pub queue_capacity: usize,

    /// Number of write workers.
    pub workers: usize,

    /// Maximum wait for queue capacity.
    pub enqueue_timeout: Duration,

    /// Transport-level retries for the HTTP adapter.
    pub max_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout: ledger::REQUEST_TIMEOUT,
            connect_timeout: ledger::CONNECT_TIMEOUT,
            read_timeout: ledger::READ_TIMEOUT,
            queue_capacity: ledger::QUEUE_CAPACITY,
            workers: ledger::WORKERS,
            enqueue_timeout: ledger::ENQUEUE_TIMEOUT,
            max_retries: ledger::MAX_RETRIES,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Protocol settings.
    pub oauth: OAuthConfig,

    /// Ledger settings.
    pub ledger: LedgerConfig,

    /// Expose `/audit/codes` and `/audit/tokens`.
    pub audit_endpoints: bool,
}

impl Config {
    /// Create a configuration with default protocol settings.
    #[must_use]
    pub fn new(ledger_url: Option<String>) -> Self {
        Self {
            ledger: LedgerConfig { url: ledger_url, ..LedgerConfig::default() },
            ..Self::default()
        }
    }

    /// Create a test configuration: in-process ledger, small queue, fast timeouts.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            oauth: OAuthConfig::default(),
            ledger: LedgerConfig {
                url: None,
                request_timeout: Duration::from_secs(2),
                connect_timeout: Duration::from_secs(1),
                read_timeout: Duration::from_millis(500),
                queue_capacity: 16,
                workers: 2,
                enqueue_timeout: Duration::from_millis(50),
                max_retries: 0, // No retries in tests
            },
            audit_endpoints: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns error if environment variables are invalid.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new(std::env::var("LEDGER_URL").ok());

        if let Some(force) = env_parse::<bool>("FORCE_PKCE")? {
            config.oauth.force_pkce = force;
        }
        if let Some(allow) = env_parse::<bool>("ALLOW_GET_ACCESS_REQUEST")? {
            config.oauth.allow_get_access_request = allow;
        }
        if let Some(workers) = env_parse::<usize>("LEDGER_WORKERS")? {
            anyhow::ensure!(workers > 0, "LEDGER_WORKERS must be at least 1");
            config.ledger.workers = workers;
        }
        if let Some(capacity) = env_parse::<usize>("LEDGER_QUEUE_CAPACITY")? {
            anyhow::ensure!(capacity > 0, "LEDGER_QUEUE_CAPACITY must be at least 1");
            config.ledger.queue_capacity = capacity;
        }

        Ok(config)
    }

    /// Check if a remote ledger is configured.
    #[must_use]
    pub const fn has_remote_ledger(&self) -> bool {
        self.ledger.url.is_some()
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(None),
    }
}
