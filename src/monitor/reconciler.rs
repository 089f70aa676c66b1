//! Event reconciler: matches observed Transfer events against transaction
//! records and folds them into the store.
//!
//! Two producers feed the same status-guarded update: this reconciler and
//! the confirmation worker pool. Whichever path observes chain truth first
//! wins; the loser sees zero rows updated and emits nothing, so duplicate
//! delivery of an event is safe without locking.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, TransferEvent};
use crate::domain::{TransactionRecord, TxStatus};
use crate::notify::{EventKind, NotificationDispatcher};
use crate::ports::{ConfirmationUpdate, RecordStore, StoreError, UserDirectory};

pub struct Reconciler {
    store: Arc<dyn RecordStore>,
    users: Arc<dyn UserDirectory>,
    chain: ChainClient,
    dispatcher: Arc<NotificationDispatcher>,
    network: String,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        users: Arc<dyn UserDirectory>,
        chain: ChainClient,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let network = chain.network().to_string();
        Self {
            store,
            users,
            chain,
            dispatcher,
            network,
        }
    }

    /// Entry point for one observed Transfer event. Never propagates an
    /// error: a failed reconciliation leaves the record pending for the
    /// poller path to retry.
    pub async fn handle_event(&self, event: TransferEvent) {
        debug!(
            network = %self.network,
            tx_hash = %event.tx_hash,
            block = event.block_number,
            "transfer event observed"
        );

        if let Err(e) = self.reconcile(&event).await {
            error!(
                network = %self.network,
                tx_hash = %event.tx_hash,
                error = %e,
                "failed to reconcile transfer event"
            );
        }
    }

    async fn reconcile(&self, event: &TransferEvent) -> Result<(), StoreError> {
        match self.store.find_by_hash(&event.tx_hash).await? {
            Some(record) => self.confirm_existing(record, event).await,
            None => self.record_external_deposit(event).await,
        }
    }

    /// A known hash: drive the record pending → confirmed. A Transfer log
    /// only exists for a transfer that executed, so this path never marks
    /// failed; reverts are caught on the worker's receipt path.
    async fn confirm_existing(
        &self,
        record: TransactionRecord,
        event: &TransferEvent,
    ) -> Result<(), StoreError> {
        if record.status.is_terminal() {
            debug!(tx_hash = %event.tx_hash, status = %record.status, "duplicate event for settled record");
            return Ok(());
        }

        let update = ConfirmationUpdate {
            block_number: event.block_number,
            gas_used: None,
            gas_price: None,
        };
        if !self
            .store
            .update_status(record.id, TxStatus::Confirmed, Some(&update))
            .await?
        {
            debug!(tx_hash = %event.tx_hash, "lost confirmation race, no-op");
            return Ok(());
        }

        info!(
            network = %self.network,
            tx_hash = %event.tx_hash,
            block = event.block_number,
            "transaction confirmed by transfer event"
        );

        if let Some(sender) = record.from_user_id {
            self.dispatcher
                .emit(
                    sender,
                    EventKind::TransactionConfirmed,
                    json!({
                        "transaction_id": record.id.to_string(),
                        "tx_hash": event.tx_hash,
                        "status": "confirmed",
                        "block_number": event.block_number,
                    }),
                )
                .await;
        }

        if let Some(recipient) = record.to_user_id {
            self.dispatcher
                .emit(
                    recipient,
                    EventKind::TransactionReceived,
                    json!({
                        "transaction_id": record.id.to_string(),
                        "tx_hash": event.tx_hash,
                        "amount": event.amount.to_string(),
                        "from": event.from,
                        "block_number": event.block_number,
                    }),
                )
                .await;
            self.push_balance(recipient, &record.to_address).await;
        }

        Ok(())
    }

    /// An unseen hash: if the recipient is one of our users this is an
    /// external deposit, recorded as already confirmed. Otherwise the event
    /// has no application-level subscriber and is dropped.
    async fn record_external_deposit(&self, event: &TransferEvent) -> Result<(), StoreError> {
        let Some(user_id) = self.users.lookup_by_address(&event.to).await? else {
            debug!(tx_hash = %event.tx_hash, to = %event.to, "transfer to unknown address, dropping");
            return Ok(());
        };

        let record = TransactionRecord::external_deposit(
            event.tx_hash.clone(),
            event.from.clone(),
            event.to.clone(),
            user_id,
            event.amount.clone(),
            event.block_number,
            self.network.clone(),
        );

        let Some(inserted) = self.store.insert_deposit(&record).await? else {
            debug!(tx_hash = %event.tx_hash, "deposit already recorded, no-op");
            return Ok(());
        };

        info!(
            network = %self.network,
            tx_hash = %event.tx_hash,
            %user_id,
            "external deposit recorded"
        );

        self.dispatcher
            .emit(
                user_id,
                EventKind::TransactionReceived,
                json!({
                    "transaction_id": inserted.id.to_string(),
                    "tx_hash": event.tx_hash,
                    "amount": event.amount.to_string(),
                    "from": event.from,
                    "block_number": event.block_number,
                }),
            )
            .await;
        self.push_balance(user_id, &event.to).await;

        Ok(())
    }

    /// Pushes a fresh balance to the recipient. Skipped on a chain error;
    /// the confirmed state is already durable and the client can refetch.
    async fn push_balance(&self, user_id: Uuid, address: &str) {
        match self.chain.get_balance(address).await {
            Ok(balance) => {
                self.dispatcher
                    .emit(
                        user_id,
                        EventKind::BalanceUpdated,
                        json!({
                            "balance": balance.to_string(),
                            "network": self.network,
                        }),
                    )
                    .await;
            }
            Err(e) => {
                warn!(
                    network = %self.network,
                    %address,
                    error = %e,
                    "balance query failed, skipping balance notification"
                );
            }
        }
    }
}
