//! Authorization server assembly.
//!
//! [`AuthServer`] wires the grant store, the ledger adapter, the write queue
//! and both engines together, then serves them over HTTP.

pub mod oauth;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;

use crate::config::{Config, oauth as defaults};
use crate::ledger::{HttpLedger, LedgerGateway, LedgerWriter, MemoryLedger, WorkerPool};
use oauth::{
    AuthorizationEngine, ClientInfo, DenyPasswords, FixedOwnerIdentity, GrantStore, Hooks,
    OwnerIdentityResolver, PasswordAuthorizer, TokenEngine,
};
use transport::HttpState;

/// Ledger-backed OAuth 2.0 authorization server.
pub struct AuthServer {
    config: Config,
    store: GrantStore,
    ledger: Arc<dyn LedgerGateway>,
    ledger_kind: &'static str,
    identity: Arc<dyn OwnerIdentityResolver>,
    passwords: Arc<dyn PasswordAuthorizer>,
    hooks: Hooks,
}

impl AuthServer {
    /// Create a server over an existing ledger adapter.
    #[must_use]
    pub fn new(config: Config, ledger: Arc<dyn LedgerGateway>) -> Self {
        let store = GrantStore::from_config(&config.oauth);
        Self {
            config,
            store,
            ledger,
            ledger_kind: "custom",
            identity: Arc::new(FixedOwnerIdentity::new(defaults::DEFAULT_OWNER_DID)),
            passwords: Arc::new(DenyPasswords),
            hooks: Hooks::default(),
        }
    }

    /// Create a server with the ledger adapter the configuration selects.
    ///
    /// # Errors
    ///
    /// Returns error if the ledger URL is invalid or the HTTP client fails to build.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let (ledger, kind): (Arc<dyn LedgerGateway>, &'static str) = match &config.ledger.url {
            Some(url) => (Arc::new(HttpLedger::new(url, &config.ledger)?), "http"),
            None => (Arc::new(MemoryLedger::new()), "memory"),
        };
        let mut server = Self::new(config, ledger);
        server.ledger_kind = kind;
        Ok(server)
    }

    /// Use a different resource-owner identity resolver.
    #[must_use]
    pub fn with_identity(mut self, identity: Arc<dyn OwnerIdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    /// Use a password checker for the password grant.
    #[must_use]
    pub fn with_passwords(mut self, passwords: Arc<dyn PasswordAuthorizer>) -> Self {
        self.passwords = passwords;
        self
    }

    /// Install policy hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Register a client.
    pub async fn register_client(&self, client: ClientInfo) {
        tracing::info!(client_id = %client.id, domain = %client.domain, "Registered client");
        self.store.set_client(client).await;
    }

    /// Grant store shared by both engines.
    #[must_use]
    pub const fn store(&self) -> &GrantStore {
        &self.store
    }

    /// Ledger adapter.
    #[must_use]
    pub fn ledger(&self) -> Arc<dyn LedgerGateway> {
        Arc::clone(&self.ledger)
    }

    /// Start the ledger workers and build the router.
    ///
    /// The workers finish once the router (and every engine clone) is dropped.
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn build(&self) -> (Router, WorkerPool) {
        let ledger_config = &self.config.ledger;
        let (writer, pool) = LedgerWriter::spawn(
            Arc::clone(&self.ledger),
            ledger_config.queue_capacity,
            ledger_config.workers,
            ledger_config.enqueue_timeout,
        );

        let oauth_config = Arc::new(self.config.oauth.clone());
        let authorize = AuthorizationEngine::new(
            Arc::clone(&oauth_config),
            self.store.clone(),
            writer.clone(),
            Arc::clone(&self.identity),
            self.hooks.clone(),
        );
        let token = TokenEngine::new(
            oauth_config,
            self.store.clone(),
            Arc::clone(&self.ledger),
            writer,
            Arc::clone(&self.passwords),
            self.hooks.clone(),
            ledger_config.read_timeout,
        );

        let state = Arc::new(HttpState {
            authorize,
            token,
            ledger: Arc::clone(&self.ledger),
            ledger_kind: self.ledger_kind,
        });

        (transport::create_router(state, self.config.audit_endpoints), pool)
    }

    /// Run the server in HTTP mode.
    ///
    /// # Errors
    ///
    /// Returns error on server failure.
    pub async fn run_http(self, port: u16) -> anyhow::Result<()> {
        let (router, pool) = self.build();
        let cleanup = Arc::new(self.store.clone()).start_cleanup_task();
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        tracing::info!(
            ledger = self.ledger_kind,
            workers = pool.len(),
            "HTTP server listening on http://{}",
            addr
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        cleanup.abort();
        tracing::info!("Draining ledger write queue");
        pool.join().await;

        tracing::info!("HTTP server shut down");
        Ok(())
    }
}

impl std::fmt::Debug for AuthServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthServer")
            .field("ledger", &self.ledger_kind)
            .field("audit_endpoints", &self.config.audit_endpoints)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received shutdown signal");
}
