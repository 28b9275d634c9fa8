//! In-process ledger adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::LedgerGateway;
use super::record::{CodeRecord, RecordStatus, TokenRecord};
use crate::error::{LedgerError, LedgerResult};

/// Append-only ledger held in memory.
///
/// Identifiers are write-once; only status and the code's linked token change.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    codes: Arc<RwLock<HashMap<String, CodeRecord>>>,
    tokens: Arc<RwLock<HashMap<String, TokenRecord>>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of code records.
    pub async fn code_count(&self) -> usize {
        self.codes.read().await.len()
    }

    /// Number of token records.
    pub async fn token_count(&self) -> usize {
        self.tokens.read().await.len()
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn create_code_record(&self, record: CodeRecord) -> LedgerResult<()> {
        let mut codes = self.codes.write().await;
        if codes.contains_key(&record.id) {
            return Err(LedgerError::conflict(&record.id, "record already exists"));
        }
        codes.insert(record.id.clone(), record);
        Ok(())
    }

    async fn read_code_record(&self, id: &str) -> LedgerResult<Option<CodeRecord>> {
        Ok(self.codes.read().await.get(id).cloned())
    }

    async fn create_token_record(&self, record: TokenRecord) -> LedgerResult<()> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&record.id) {
            return Err(LedgerError::conflict(&record.id, "record already exists"));
        }
        tokens.insert(record.id.clone(), record);
        Ok(())
    }

    async fn read_token_record(&self, id: &str) -> LedgerResult<Option<TokenRecord>> {
        Ok(self.tokens.read().await.get(id).cloned())
    }

    async fn link_code_token(&self, code_id: &str, token_id: &str) -> LedgerResult<()> {
        let mut codes = self.codes.write().await;
        let record = codes.get_mut(code_id).ok_or_else(|| LedgerError::not_found(code_id))?;
        record.link_token(token_id)
    }

    async fn revoke_token_record(&self, token_id: &str) -> LedgerResult<()> {
        let mut tokens = self.tokens.write().await;
        let record = tokens.get_mut(token_id).ok_or_else(|| LedgerError::not_found(token_id))?;
        record.status = record
            .status
            .transition(RecordStatus::Revoked)
            .map_err(|e| LedgerError::conflict(token_id, e.to_string()))?;
        Ok(())
    }

    async fn codes_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<CodeRecord>> {
        let codes = self.codes.read().await;
        let mut found: Vec<CodeRecord> =
            codes.values().filter(|r| r.owner_did == owner_did).cloned().collect();
        found.sort_by_key(|r| r.issued_at);
        Ok(found)
    }

    async fn tokens_by_owner(&self, owner_did: &str) -> LedgerResult<Vec<TokenRecord>> {
        let tokens = self.tokens.read().await;
        let mut found: Vec<TokenRecord> =
            tokens.values().filter(|r| r.owner_did == owner_did).cloned().collect();
        found.sort_by_key(|r| r.issued_at);
        Ok(found)
    }
}

impl std::fmt::Debug for MemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLedger").finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn code(raw: &str, owner: &str) -> CodeRecord {
        CodeRecord::new(raw, owner, "did:client", "read", "http://localhost/cb", Utc::now())
    }

    #[tokio::test]
    async fn test_create_and_read_code() {
        let ledger = MemoryLedger::new();
        let record = code("abc", "did:ro");
        ledger.create_code_record(record.clone()).await.unwrap();

        let read = ledger.read_code_record(&record.id).await.unwrap();
        assert_eq!(read, Some(record));
        assert!(ledger.read_code_record("CI_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_identifier_rejected() {
        let ledger = MemoryLedger::new();
        ledger.create_code_record(code("abc", "did:ro")).await.unwrap();

        let err = ledger.create_code_record(code("abc", "did:other")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Conflict { .. }));
        assert_eq!(ledger.code_count().await, 1);
    }

    #[tokio::test]
    async fn test_link_is_write_once() {
        let ledger = MemoryLedger::new();
        let record = code("abc", "did:ro");
        ledger.create_code_record(record.clone()).await.unwrap();

        ledger.link_code_token(&record.id, "TI_first").await.unwrap();
        assert!(ledger.link_code_token(&record.id, "TI_second").await.is_err());

        let read = ledger.read_code_record(&record.id).await.unwrap().unwrap();
        assert_eq!(read.status, RecordStatus::Exchanged);
        assert_eq!(read.linked_token_id, "TI_first");
    }

    #[tokio::test]
    async fn test_revoke_token() {
        let ledger = MemoryLedger::new();
        let record = TokenRecord::new(
            "tok",
            "did:ro",
            "did:client",
            "",
            "",
            Utc::now(),
            std::time::Duration::from_secs(60),
        );
        ledger.create_token_record(record.clone()).await.unwrap();
        ledger.revoke_token_record(&record.id).await.unwrap();

        let read = ledger.read_token_record(&record.id).await.unwrap().unwrap();
        assert_eq!(read.status, RecordStatus::Revoked);
        assert!(matches!(
            ledger.revoke_token_record("TI_missing").await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_by_owner() {
        let ledger = MemoryLedger::new();
        ledger.create_code_record(code("a", "did:alice")).await.unwrap();
        ledger.create_code_record(code("b", "did:bob")).await.unwrap();
        ledger.create_code_record(code("c", "did:alice")).await.unwrap();

        let alice = ledger.codes_by_owner("did:alice").await.unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice.iter().all(|r| r.owner_did == "did:alice"));
        assert!(ledger.tokens_by_owner("did:alice").await.unwrap().is_empty());
    }
}
