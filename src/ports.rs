//! Ports to the external collaborators of the monitoring core: the
//! transaction record store and the user directory. Postgres adapters live
//! in `crate::adapters`; tests substitute in-memory implementations.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{TransactionRecord, TxStatus};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid status transition to {0}")]
    InvalidTransition(TxStatus),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// On-chain facts attached to a record when it reaches a terminal state.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationUpdate {
    pub block_number: i64,
    pub gas_used: Option<i64>,
    pub gas_price: Option<i64>,
}

/// Persistence port for transaction records.
///
/// All status writes go through `update_status`, the single idempotent
/// consumer both reconciliation paths feed: the update is conditional on the
/// row still being pending, so concurrent or duplicate writers commute.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert(&self, record: &TransactionRecord) -> StoreResult<TransactionRecord>;

    /// Insert a confirmed external-deposit record. Returns `None` when a
    /// record with the same hash already exists (racing duplicate event).
    async fn insert_deposit(
        &self,
        record: &TransactionRecord,
    ) -> StoreResult<Option<TransactionRecord>>;

    async fn get(&self, id: Uuid) -> StoreResult<TransactionRecord>;

    async fn find_by_hash(&self, tx_hash: &str) -> StoreResult<Option<TransactionRecord>>;

    async fn select_pending(&self, network: &str) -> StoreResult<Vec<TransactionRecord>>;

    /// Conditionally move a pending record to a terminal status. Returns
    /// `false` when the record was already terminal (the caller lost the
    /// race or saw a duplicate); `Err(InvalidTransition)` when asked to
    /// write a non-terminal status.
    async fn update_status(
        &self,
        id: Uuid,
        status: TxStatus,
        confirmation: Option<&ConfirmationUpdate>,
    ) -> StoreResult<bool>;

    /// Transactions sent or received by a user, newest first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<TransactionRecord>>;
}

/// Read-only port into the application's user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Resolve a wallet address (lowercase hex) to an active user id.
    async fn lookup_by_address(&self, address: &str) -> StoreResult<Option<Uuid>>;
}
