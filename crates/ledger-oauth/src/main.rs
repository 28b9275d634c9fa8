//! Ledger-backed OAuth 2.0 server - Entry Point
//!
//! Registers a single client and serves the OAuth endpoints over HTTP.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledger_oauth::{
    AuthServer, Config,
    server::oauth::{ClientInfo, FixedOwnerIdentity, StaticPasswords},
};

#[derive(Parser, Debug)]
#[command(name = "ledger-oauth")]
#[command(about = "OAuth2 authorization server with an append-only audit ledger")]
#[command(version)]
struct Cli {
    /// Client ID to register
    #[arg(short = 'i', long, default_value = "222222", env = "CLIENT_ID")]
    client_id: String,

    /// Client secret
    #[arg(short = 's', long, default_value = "22222222", env = "CLIENT_SECRET")]
    client_secret: String,

    /// Client domain (default redirect URI)
    #[arg(short = 'r', long, default_value = "http://localhost:9094", env = "CLIENT_DOMAIN")]
    domain: String,

    /// HTTP server port
    #[arg(short = 'p', long, default_value = "9096", env = "PORT")]
    port: u16,

    /// Ledger REST gateway base URL (in-process ledger when unset)
    #[arg(long, env = "LEDGER_URL")]
    ledger_url: Option<String>,

    /// DID recorded as resource owner for every grant
    #[arg(long, env = "OWNER_DID")]
    owner_did: Option<String>,

    /// Require PKCE on authorization code flows
    #[arg(long)]
    force_pkce: bool,

    /// Password grant user as name:password (repeatable)
    #[arg(long = "user", value_name = "NAME:PASSWORD")]
    users: Vec<String>,

    /// Expose /audit/codes and /audit/tokens
    #[arg(long)]
    audit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

fn parse_users(users: &[String]) -> anyhow::Result<StaticPasswords> {
    users.iter().try_fold(StaticPasswords::new(), |acc, entry| {
        let (name, password) = entry
            .split_once(':')
            .filter(|(name, _)| !name.is_empty())
            .ok_or_else(|| anyhow::anyhow!("invalid --user value {entry:?}, expected NAME:PASSWORD"))?;
        Ok(acc.with_user(name, password))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting ledger OAuth server");

    let mut config = Config::from_env()?;
    if cli.ledger_url.is_some() {
        config.ledger.url = cli.ledger_url;
    }
    config.oauth.force_pkce |= cli.force_pkce;
    config.audit_endpoints |= cli.audit;

    let mut server = AuthServer::from_config(config)?;
    if let Some(did) = cli.owner_did {
        server = server.with_identity(Arc::new(FixedOwnerIdentity::new(did)));
    }
    let passwords = parse_users(&cli.users)?;
    if !passwords.is_empty() {
        server = server.with_passwords(Arc::new(passwords));
    }

    server.register_client(ClientInfo::new(cli.client_id, cli.client_secret, cli.domain)).await;

    tracing::info!(port = cli.port, "Running in HTTP mode");
    server.run_http(cli.port).await
}
