//! Shared fakes for integration tests: in-memory implementations of the
//! record store and user directory ports, plus builders for records and
//! transfer events.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use stablepay_core::chain::TransferEvent;
use stablepay_core::domain::{NewPayment, TransactionRecord, TxStatus};
use stablepay_core::ports::{
    ConfirmationUpdate, RecordStore, StoreError, StoreResult, UserDirectory,
};

/// Record store backed by a mutex-guarded vector. The mutex makes every
/// operation atomic, mirroring the row-level conditional updates of the
/// Postgres adapter.
#[derive(Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<TransactionRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_row(&self, record: TransactionRecord) {
        self.rows.lock().await.push(record);
    }

    pub async fn all(&self) -> Vec<TransactionRecord> {
        self.rows.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, record: &TransactionRecord) -> StoreResult<TransactionRecord> {
        self.rows.lock().await.push(record.clone());
        Ok(record.clone())
    }

    async fn insert_deposit(
        &self,
        record: &TransactionRecord,
    ) -> StoreResult<Option<TransactionRecord>> {
        let mut rows = self.rows.lock().await;
        if rows
            .iter()
            .any(|r| r.tx_hash.is_some() && r.tx_hash == record.tx_hash)
        {
            return Ok(None);
        }
        rows.push(record.clone());
        Ok(Some(record.clone()))
    }

    async fn get(&self, id: Uuid) -> StoreResult<TransactionRecord> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn find_by_hash(&self, tx_hash: &str) -> StoreResult<Option<TransactionRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|r| r.tx_hash.as_deref() == Some(tx_hash))
            .cloned())
    }

    async fn select_pending(&self, network: &str) -> StoreResult<Vec<TransactionRecord>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.status == TxStatus::Pending && r.network == network)
            .cloned()
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TxStatus,
        confirmation: Option<&ConfirmationUpdate>,
    ) -> StoreResult<bool> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTransition(status));
        }

        let mut rows = self.rows.lock().await;
        let Some(row) = rows.iter_mut().find(|r| r.id == id) else {
            return Ok(false);
        };
        if !row.status.can_transition_to(status) {
            return Ok(false);
        }

        row.status = status;
        if let Some(update) = confirmation {
            row.block_number = Some(update.block_number);
            if update.gas_used.is_some() {
                row.gas_used = update.gas_used;
            }
            if update.gas_price.is_some() {
                row.gas_price = update.gas_price;
            }
        }
        row.updated_at = chrono::Utc::now();
        Ok(true)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|r| r.from_user_id == Some(user_id) || r.to_user_id == Some(user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }
}

/// User directory backed by an address → user id map.
#[derive(Default)]
pub struct InMemoryDirectory {
    users: HashMap<String, Uuid>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, address: &str, user_id: Uuid) -> Self {
        self.users.insert(address.to_lowercase(), user_id);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn lookup_by_address(&self, address: &str) -> StoreResult<Option<Uuid>> {
        Ok(self.users.get(&address.to_lowercase()).copied())
    }
}

pub const SENDER_ADDRESS: &str = "0xaaaa00000000000000000000000000000000aaaa";
pub const RECIPIENT_ADDRESS: &str = "0xbbbb00000000000000000000000000000000bbbb";

pub fn amount(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn pending_payment(
    tx_hash: &str,
    from_user_id: Option<Uuid>,
    to_user_id: Option<Uuid>,
    network: &str,
) -> TransactionRecord {
    TransactionRecord::new_payment(NewPayment {
        from_address: SENDER_ADDRESS.to_string(),
        to_address: RECIPIENT_ADDRESS.to_string(),
        from_user_id,
        to_user_id,
        amount: amount("10.000000"),
        network: network.to_string(),
        tx_hash: Some(tx_hash.to_string()),
        memo: None,
        payment_link_id: None,
    })
}

pub fn transfer_event(tx_hash: &str, block_number: i64) -> TransferEvent {
    TransferEvent {
        from: SENDER_ADDRESS.to_string(),
        to: RECIPIENT_ADDRESS.to_string(),
        amount: amount("10.000000"),
        tx_hash: tx_hash.to_string(),
        block_number,
    }
}

/// Drains every event currently queued on a notification receiver.
pub fn drain(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<stablepay_core::notify::NotificationEvent>,
) -> Vec<stablepay_core::notify::NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
