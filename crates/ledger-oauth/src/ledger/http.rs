//! REST gateway adapter for the ledger.
//!
//! Provides async HTTP client with:
//! - Connection pooling via reqwest
//! - Retry middleware with exponential backoff for transient failures
//! - 404 on reads mapped to "not found"

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::de::DeserializeOwned;
use url::Url;

use super::LedgerGateway;
use super::record::{CodeRecord, TokenRecord};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// Ledger adapter speaking JSON to a REST gateway in front of the chaincode.
#[derive(Clone)]
pub struct HttpLedger {
    /// HTTP client with middleware.
    client: ClientWithMiddleware,

    /// Gateway base URL (always ends with `/`).
    base_url: Url,
}

impl HttpLedger {
    /// Create a new adapter for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or HTTP client initialization fails.
    pub fn new(base_url: &str, config: &LedgerConfig) -> LedgerResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(100), Duration::from_secs(5))
            .build_with_max_retries(config.max_retries);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client, base_url })
    }

    /// Build `base/collection/{id}/{suffix...}` with each segment percent-encoded.
    ///
    /// Identifiers are standard base64 and may contain `/` and `+`.
    fn url(&self, segments: &[&str]) -> LedgerResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| LedgerError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    /// GET a single record; 404 means absent.
    async fn get_record<T>(&self, url: Url) -> LedgerResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.client.get(url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;
        serde_json::from_value(value).map(Some).map_err(LedgerError::from)
    }

    /// GET a list of records filtered by owner DID.
    async fn get_by_owner<T>(&self, collection: &str, owner_did: &str) -> LedgerResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let url = self.url(&[collection])?;
        let response = self.client.get(url).query(&[("owner", owner_did)]).send().await?;
        let response = Self::handle_response(response).await?;
        let value: serde_json::Value = response.json().await?;
        serde_json::from_value(value).map_err(LedgerError::from)
    }

    /// POST a JSON body, expecting any 2xx acknowledgement.
    async fn post<B>(&self, url: Url, body: &B) -> LedgerResult<()>
    where
        B: serde::Serialize + Sync,
    {
        let body_str = serde_json::to_string(body)?;

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body_str)
            .send()
            .await?;

        Self::handle_response(response).await?;
        Ok(())
    }

    /// Handle gateway response status codes.
    async fn handle_response(response: reqwest::Response) -> LedgerResult<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().to_string();
        let text = response.text().await.unwrap_or_default();
        match status.as_u16() {
            404 => Err(LedgerError::not_found(url)),
            409 => Err(LedgerError::conflict(url, text)),
            code => Err(LedgerError::Status { status: code, message: text }),
        }
    }
}

#[async_trait]
impl LedgerGateway for HttpLedger {
    async fn create_code_record(&self, record: CodeRecord) -> LedgerResult<()> {
        self.post(self.url(&["codes"])?, &record).await
    }

    async fn read_code_record(&self, id: &str) -> LedgerResult<Option<CodeRecord>> {
        self.get_record(self.url(&["codes", id])?).await
    }

    async fn create_token_record(&self, record: TokenRecord) -> LedgerResult<()> {
        self.post(self.url(&["tokens"])?, &record).await
    }

    async fn read_token_record(&self, id: &str) -> LedgerResult<Option<TokenRecord>> {
        self.get_record(self.url(&["tokens", id])?).await
    }

    async fn link_code_token(&self, code_id: &str, token_id: &str) -> LedgerResult<()> {
        let body = serde_json::json!({ "ID_token": token_id });
        self.post(self.url(&["codes", code_id, "link"])?, &body).await
    }

    async fn revoke_token_record(&self, token_id: &str) -> LedgerResult<()> {
        self.post(self.url(&["tokens", token_id, "revoke"])?, &serde_json::json!({})).await
    }

    async fn codes_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<CodeRecord>> {
        self.get_by_owner("codes", owner_did).await
    }

    async fn tokens_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<TokenRecord>> {
        self.get_by_owner("tokens", owner_did).await
    }
}

impl std::fmt::Debug for HttpLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpLedger").field("base_url", &self.base_url.as_str()).finish()
    }
}
