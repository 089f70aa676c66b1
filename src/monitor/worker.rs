//! Confirmation worker pool.
//!
//! Workers consume monitor jobs produced by the pending-transaction poller,
//! block until the referenced hash reaches the required confirmation depth,
//! and fold the outcome into the record store through the same
//! status-guarded update the event reconciler uses. Transient failures are
//! retried with exponential backoff up to a bounded attempt count; past
//! that, the record is marked failed and the owning user notified once.

use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::chain::ChainClient;
use crate::domain::TxStatus;
use crate::notify::{EventKind, NotificationDispatcher};
use crate::ports::{ConfirmationUpdate, RecordStore};

/// An ephemeral work item: monitor one pending record until its hash
/// confirms or fails. Requeued (as a new job) by the poller if the record
/// is still pending after a crash.
#[derive(Debug, Clone)]
pub struct MonitorJob {
    pub record_id: Uuid,
    pub tx_hash: String,
    pub network: String,
    pub user_id: Option<Uuid>,
}

/// Bounded-retry state for a job: how many attempts in total and how long
/// to wait before the next one. The delay doubles with each attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay to apply after a failed attempt (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

pub(crate) struct WorkerContext {
    pub store: Arc<dyn RecordStore>,
    pub chains: HashMap<String, ChainClient>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub in_flight: Arc<Mutex<HashSet<Uuid>>>,
    pub retry: RetryPolicy,
    pub required_confirmations: u32,
    pub confirmation_timeout: Duration,
}

pub(crate) async fn run_worker(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<MonitorJob>>>,
    ctx: Arc<WorkerContext>,
) {
    debug!(worker_id, "confirmation worker started");

    loop {
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else { break };
        process_job(&ctx, job).await;
    }

    debug!(worker_id, "confirmation worker stopped");
}

async fn process_job(ctx: &WorkerContext, job: MonitorJob) {
    let Some(chain) = ctx.chains.get(&job.network) else {
        error!(network = %job.network, record_id = %job.record_id, "job references unknown network");
        ctx.in_flight.lock().await.remove(&job.record_id);
        return;
    };

    let mut attempt = 1u32;
    loop {
        match chain
            .wait_for_confirmation(&job.tx_hash, ctx.required_confirmations, ctx.confirmation_timeout)
            .await
        {
            Ok(receipt) => {
                let status = if receipt.succeeded {
                    TxStatus::Confirmed
                } else {
                    TxStatus::Failed
                };
                let update = ConfirmationUpdate {
                    block_number: receipt.block_number,
                    gas_used: Some(receipt.gas_used),
                    gas_price: receipt.effective_gas_price,
                };

                match ctx.store.update_status(job.record_id, status, Some(&update)).await {
                    Ok(true) => {
                        debug!(tx_hash = %job.tx_hash, %status, "monitored transaction settled");
                        notify_settled(ctx, &job, status, receipt.block_number).await;
                    }
                    Ok(false) => {
                        // The event reconciler got there first.
                        debug!(tx_hash = %job.tx_hash, "record already terminal");
                    }
                    Err(e) => {
                        error!(tx_hash = %job.tx_hash, error = %e, "failed to persist confirmation");
                    }
                }
                break;
            }
            Err(e) if attempt < ctx.retry.max_attempts => {
                warn!(
                    tx_hash = %job.tx_hash,
                    attempt,
                    error = %e,
                    "confirmation attempt failed, retrying"
                );
                sleep(ctx.retry.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    tx_hash = %job.tx_hash,
                    attempts = ctx.retry.max_attempts,
                    error = %e,
                    "confirmation attempts exhausted, marking failed"
                );
                match ctx.store.update_status(job.record_id, TxStatus::Failed, None).await {
                    Ok(true) => {
                        if let Some(user_id) = job.user_id {
                            ctx.dispatcher
                                .emit(
                                    user_id,
                                    EventKind::TransactionFailed,
                                    json!({
                                        "transaction_id": job.record_id.to_string(),
                                        "tx_hash": job.tx_hash,
                                        "error": "confirmation timeout",
                                    }),
                                )
                                .await;
                        }
                    }
                    Ok(false) => {
                        debug!(tx_hash = %job.tx_hash, "record already terminal");
                    }
                    Err(store_err) => {
                        error!(tx_hash = %job.tx_hash, error = %store_err, "failed to persist terminal failure");
                    }
                }
                break;
            }
        }
    }

    ctx.in_flight.lock().await.remove(&job.record_id);
}

async fn notify_settled(ctx: &WorkerContext, job: &MonitorJob, status: TxStatus, block_number: i64) {
    let Some(user_id) = job.user_id else { return };

    let kind = if status == TxStatus::Confirmed {
        EventKind::TransactionConfirmed
    } else {
        EventKind::TransactionFailed
    };

    ctx.dispatcher
        .emit(
            user_id,
            kind,
            json!({
                "transaction_id": job.record_id.to_string(),
                "tx_hash": job.tx_hash,
                "status": status.as_str(),
                "block_number": block_number,
            }),
        )
        .await;
}
