//! Detached ledger writes.
//!
//! Requests never await a ledger write. They enqueue a [`LedgerWrite`] on a
//! bounded channel that a fixed pool of workers drains:
//!
//! ```text
//! request ──submit()──▶ [ bounded mpsc queue ] ──▶ worker 0..N ──▶ LedgerGateway
//!            │
//!            └─ waits at most `enqueue_timeout`, then QueueFull
//! ```
//!
//! Failed writes are logged with their record identifier and dropped. Workers
//! are detached from request tasks, so a cancelled request never aborts a write.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::LedgerGateway;
use super::record::{CodeRecord, TokenRecord};
use crate::error::{LedgerError, LedgerResult};

/// A write job for the audit ledger.
#[derive(Debug, Clone)]
pub enum LedgerWrite {
    CreateCode(CodeRecord),
    CreateToken(TokenRecord),
    LinkCodeToken { code_id: String, token_id: String },
    RevokeToken { token_id: String },
    /// Mirror a rotated token and revoke the one it replaces, in that order.
    RotateToken { record: TokenRecord, previous_id: String },
}

impl LedgerWrite {
    /// Identifier of the record this write touches.
    #[must_use]
    pub fn record_id(&self) -> &str {
        match self {
            Self::CreateCode(record) => &record.id,
            Self::CreateToken(record) => &record.id,
            Self::LinkCodeToken { code_id, .. } => code_id,
            Self::RevokeToken { token_id } => token_id,
            Self::RotateToken { record, .. } => &record.id,
        }
    }

    /// Short operation name for logs.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::CreateCode(_) => "create_code_record",
            Self::CreateToken(_) => "create_token_record",
            Self::LinkCodeToken { .. } => "link_code_token",
            Self::RevokeToken { .. } => "revoke_token_record",
            Self::RotateToken { .. } => "rotate_token_record",
        }
    }

    async fn apply(self, ledger: &dyn LedgerGateway) -> LedgerResult<()> {
        match self {
            Self::CreateCode(record) => ledger.create_code_record(record).await,
            Self::CreateToken(record) => ledger.create_token_record(record).await,
            Self::LinkCodeToken { code_id, token_id } => {
                ledger.link_code_token(&code_id, &token_id).await
            }
            Self::RevokeToken { token_id } => ledger.revoke_token_record(&token_id).await,
            Self::RotateToken { record, previous_id } => {
                let created = ledger.create_token_record(record).await;
                ledger.revoke_token_record(&previous_id).await?;
                created
            }
        }
    }
}

/// Producer side of the write queue. Cheap to clone.
#[derive(Clone)]
pub struct LedgerWriter {
    tx: mpsc::Sender<LedgerWrite>,
    enqueue_timeout: Duration,
}

/// Handles of the worker tasks.
///
/// Workers exit once every [`LedgerWriter`] clone is dropped and the queue is drained.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish its remaining writes.
    pub async fn join(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Ledger worker panicked");
            }
        }
    }
}

impl LedgerWriter {
    /// Start `workers` tasks draining a queue of `capacity` pending writes.
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn spawn(
        ledger: Arc<dyn LedgerGateway>,
        capacity: usize,
        workers: usize,
        enqueue_timeout: Duration,
    ) -> (Self, WorkerPool) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let ledger = Arc::clone(&ledger);
                tokio::spawn(run_worker(worker, rx, ledger))
            })
            .collect();

        (Self { tx, enqueue_timeout }, WorkerPool { handles })
    }

    /// Enqueue a write without waiting for it to land.
    ///
    /// Applies backpressure: waits up to the enqueue timeout for capacity.
    pub async fn submit(&self, write: LedgerWrite) -> LedgerResult<()> {
        match self.tx.send_timeout(write, self.enqueue_timeout).await {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendTimeoutError::Timeout(write)) => {
                tracing::warn!(
                    record_id = %write.record_id(),
                    operation = write.operation(),
                    "Ledger write queue full"
                );
                Err(LedgerError::QueueFull)
            }
            Err(mpsc::error::SendTimeoutError::Closed(write)) => {
                tracing::error!(record_id = %write.record_id(), "Ledger write queue closed");
                Err(LedgerError::Closed)
            }
        }
    }

    /// Claim one queue slot ahead of a state change that must not be undone.
    ///
    /// Waits up to the enqueue timeout, like [`submit`](Self::submit). Sending
    /// through the returned permit never blocks or fails.
    pub async fn reserve(&self) -> LedgerResult<mpsc::Permit<'_, LedgerWrite>> {
        match tokio::time::timeout(self.enqueue_timeout, self.tx.reserve()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => {
                tracing::error!("Ledger write queue closed");
                Err(LedgerError::Closed)
            }
            Err(_) => {
                tracing::warn!("Ledger write queue full, no slot reserved");
                Err(LedgerError::QueueFull)
            }
        }
    }

    /// Remaining queue capacity.
    #[must_use]
    pub fn available_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

impl std::fmt::Debug for LedgerWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerWriter")
            .field("available_capacity", &self.tx.capacity())
            .field("max_capacity", &self.tx.max_capacity())
            .finish()
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<LedgerWrite>>>,
    ledger: Arc<dyn LedgerGateway>,
) {
    loop {
        // Only the receive holds the lock; writes run concurrently across workers.
        let next = rx.lock().await.recv().await;
        let Some(write) = next else {
            break;
        };

        let record_id = write.record_id().to_owned();
        let operation = write.operation();
        match write.apply(ledger.as_ref()).await {
            Ok(()) => {
                tracing::debug!(worker, record_id = %record_id, operation, "Ledger write committed");
            }
            Err(e) => {
                tracing::error!(
                    worker,
                    record_id = %record_id,
                    operation,
                    error = %e,
                    "Ledger write failed, manual reconciliation required"
                );
            }
        }
    }
    tracing::debug!(worker, "Ledger worker stopped");
}
