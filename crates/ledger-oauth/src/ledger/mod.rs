//! Append-only audit ledger boundary.
//!
//! The protocol path never depends on the ledger for issuing grants; it mirrors
//! hashed codes and tokens into it and reads them back when they are redeemed.
//!
//! - [`LedgerGateway`]: the capability consumed by the engines
//! - [`MemoryLedger`]: in-process adapter (tests, single-node demos)
//! - [`HttpLedger`]: REST gateway adapter in front of the chaincode
//! - [`LedgerWriter`]: bounded queue + fixed worker pool for detached writes

mod http;
mod memory;
pub mod record;
mod writer;

use async_trait::async_trait;

pub use http::HttpLedger;
pub use memory::MemoryLedger;
pub use record::{
    CodeRecord, RecordStatus, TokenRecord, code_record_id, hash_secret, token_record_id,
};
pub use writer::{LedgerWrite, LedgerWriter, WorkerPool};

use crate::error::LedgerResult;

/// Abstract append-only record store keyed by hash-derived identifiers.
///
/// Reads return `Ok(None)` for a missing record. Callers on the protocol path
/// treat `Err` exactly like `None`.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Append a code record.
    async fn create_code_record(&self, record: CodeRecord) -> LedgerResult<()>;

    /// Look up a code record by `CI_` identifier.
    async fn read_code_record(&self, id: &str) -> LedgerResult<Option<CodeRecord>>;

    /// Append a token record.
    async fn create_token_record(&self, record: TokenRecord) -> LedgerResult<()>;

    /// Look up a token record by `TI_` identifier.
    async fn read_token_record(&self, id: &str) -> LedgerResult<Option<TokenRecord>>;

    /// Mark a code exchanged and link the token it produced. Fails if already linked.
    async fn link_code_token(&self, code_id: &str, token_id: &str) -> LedgerResult<()>;

    /// Move a token record to `Revoked`.
    async fn revoke_token_record(&self, token_id: &str) -> LedgerResult<()>;

    /// All code records issued on behalf of a resource owner.
    async fn codes_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<CodeRecord>>;

    /// All token records issued on behalf of a resource owner.
    async fn tokens_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<TokenRecord>>;
}
