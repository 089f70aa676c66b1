//! Pending-transaction poller.
//!
//! A fallback reconciliation path for transfers whose confirmation event was
//! missed by the log subscription (e.g. during a reconnect gap). Each tick
//! scans the record store for rows still pending on one network and hands
//! each one to the confirmation worker pool, at most one outstanding job per
//! record.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::worker::MonitorJob;
use crate::ports::{RecordStore, StoreError};

/// Scan failures in a row before the poller reports itself degraded. A
/// single connectivity blip must not look like a mass transaction failure.
const DEGRADED_SCAN_THRESHOLD: u32 = 3;

pub(crate) async fn run_poller(
    network: String,
    store: Arc<dyn RecordStore>,
    job_tx: mpsc::Sender<MonitorJob>,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(%network, interval_secs = poll_interval.as_secs(), "pending-transaction poller started");
    let mut consecutive_failures = 0u32;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = sleep(poll_interval) => {
                match scan_once(&network, store.as_ref(), &job_tx, &in_flight).await {
                    Ok(0) => {
                        consecutive_failures = 0;
                    }
                    Ok(enqueued) => {
                        consecutive_failures = 0;
                        debug!(%network, enqueued, "enqueued monitor jobs for pending transactions");
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        if consecutive_failures >= DEGRADED_SCAN_THRESHOLD {
                            error!(
                                %network,
                                consecutive_failures,
                                error = %e,
                                "pending scan failing repeatedly, monitoring degraded"
                            );
                        } else {
                            warn!(%network, error = %e, "pending scan failed");
                        }
                    }
                }
            }
        }
    }

    info!(%network, "pending-transaction poller stopped");
}

async fn scan_once(
    network: &str,
    store: &dyn RecordStore,
    job_tx: &mpsc::Sender<MonitorJob>,
    in_flight: &Mutex<HashSet<Uuid>>,
) -> Result<usize, StoreError> {
    let pending = store.select_pending(network).await?;
    if pending.is_empty() {
        return Ok(0);
    }

    let mut enqueued = 0;
    for record in pending {
        // Rows without a hash have not been broadcast yet; nothing to watch.
        let Some(tx_hash) = record.tx_hash.clone() else {
            continue;
        };

        if !in_flight.lock().await.insert(record.id) {
            continue;
        }

        let job = MonitorJob {
            record_id: record.id,
            tx_hash,
            network: record.network.clone(),
            user_id: record.from_user_id,
        };
        if job_tx.send(job).await.is_err() {
            in_flight.lock().await.remove(&record.id);
            break;
        }
        enqueued += 1;
    }

    Ok(enqueued)
}
