//! Ledger-backed OAuth 2.0 authorization server.
//!
//! Issues authorization codes and access/refresh tokens from an in-memory
//! grant store and mirrors a hashed copy of each into an append-only audit
//! ledger, linking resource-owner DIDs to the authorizations granted on their
//! behalf.
//!
//! # Features
//!
//! - **Grant types**: authorization code (with PKCE), implicit, password,
//!   client credentials, refresh token
//! - **Fail-closed ledger reads**: an unreachable ledger looks like a missing record
//! - **Bounded audit writes**: a fixed worker pool drains a backpressured queue
//! - **Pluggable ledger**: in-process or REST gateway adapters
//!
//! # Example
//!
//! ```no_run
//! use ledger_oauth::{AuthServer, Config, server::oauth::ClientInfo};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = AuthServer::from_config(Config::from_env()?)?;
//!     server
//!         .register_client(ClientInfo::new("222222", "22222222", "http://localhost:9094"))
//!         .await;
//!     server.run_http(9096).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod server;

pub use config::Config;
pub use error::{LedgerError, OAuthError};
pub use ledger::{HttpLedger, LedgerGateway, MemoryLedger};
pub use server::AuthServer;
