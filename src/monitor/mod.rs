//! Blockchain monitoring subsystem.
//!
//! Two independent producers observe chain truth — the Transfer-log
//! subscription (reconciler) and the pending-transaction poller feeding the
//! confirmation worker pool — and both terminate in the same idempotent,
//! status-guarded record update. `start_monitoring` returns an explicit
//! handle; there is no process-global monitoring state, so independent
//! instances can run side by side (and under test).

pub mod poller;
pub mod reconciler;
pub mod worker;

pub use reconciler::Reconciler;
pub use worker::{MonitorJob, RetryPolicy};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chain::ChainClient;
use crate::notify::NotificationDispatcher;
use crate::ports::{RecordStore, UserDirectory};
use worker::WorkerContext;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Cadence of the pending-transaction fallback scan.
    pub poll_interval: Duration,
    /// Blocks on top of a transaction's block before it counts as final.
    pub required_confirmations: u32,
    /// Upper bound on one confirmation wait; a never-confirming hash must
    /// not occupy a worker slot indefinitely.
    pub confirmation_timeout: Duration,
    pub workers: usize,
    pub retry: RetryPolicy,
    pub job_queue_depth: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            required_confirmations: 1,
            confirmation_timeout: Duration::from_secs(120),
            workers: 4,
            retry: RetryPolicy::default(),
            job_queue_depth: 256,
        }
    }
}

/// External collaborators the monitoring core runs against.
pub struct MonitorDeps {
    pub store: Arc<dyn RecordStore>,
    pub users: Arc<dyn UserDirectory>,
    pub chains: HashMap<String, ChainClient>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

/// Handle to a running monitoring instance.
pub struct MonitorHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Signals shutdown and waits for the subsystem to wind down: the
    /// subscription listeners and pollers exit at the signal, the job queue
    /// closes, and workers finish their in-flight confirmation waits.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "monitor task panicked during shutdown");
            }
        }
        info!("blockchain monitoring stopped");
    }
}

/// Starts listeners, pollers and the confirmation worker pool for every
/// configured network.
pub fn start_monitoring(deps: MonitorDeps, config: MonitorConfig) -> MonitorHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (job_tx, job_rx) = mpsc::channel::<MonitorJob>(config.job_queue_depth);
    let in_flight = Arc::new(Mutex::new(HashSet::new()));
    let mut tasks = Vec::new();

    for (network, chain) in &deps.chains {
        info!(%network, "starting chain monitor");

        let reconciler = Arc::new(Reconciler::new(
            deps.store.clone(),
            deps.users.clone(),
            chain.clone(),
            deps.dispatcher.clone(),
        ));
        let mut events = chain.subscribe_transfers(shutdown_rx.clone());
        tasks.push(tokio::spawn(async move {
            // Each event reconciles in its own task so one slow lookup
            // cannot delay delivery of subsequent events.
            while let Some(event) = events.recv().await {
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    reconciler.handle_event(event).await;
                });
            }
        }));

        tasks.push(tokio::spawn(poller::run_poller(
            network.clone(),
            deps.store.clone(),
            job_tx.clone(),
            in_flight.clone(),
            config.poll_interval,
            shutdown_rx.clone(),
        )));
    }

    // The pollers hold the only senders; the queue closes, and the workers
    // drain and exit, once every poller has stopped.
    drop(job_tx);

    let queue = Arc::new(Mutex::new(job_rx));
    let ctx = Arc::new(WorkerContext {
        store: deps.store,
        chains: deps.chains,
        dispatcher: deps.dispatcher,
        in_flight,
        retry: config.retry,
        required_confirmations: config.required_confirmations,
        confirmation_timeout: config.confirmation_timeout,
    });
    for worker_id in 0..config.workers {
        tasks.push(tokio::spawn(worker::run_worker(
            worker_id,
            queue.clone(),
            ctx.clone(),
        )));
    }

    info!(networks = ctx.chains.len(), workers = config.workers, "blockchain monitoring started");

    MonitorHandle {
        shutdown: shutdown_tx,
        tasks,
    }
}
