mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common::{drain, pending_payment, InMemoryDirectory, InMemoryStore};
use stablepay_core::chain::ChainClient;
use stablepay_core::domain::TxStatus;
use stablepay_core::monitor::{start_monitoring, MonitorConfig, MonitorDeps, RetryPolicy};
use stablepay_core::notify::{EventKind, NotificationDispatcher};
use stablepay_core::ports::RecordStore;

const USDC: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";

fn fast_monitor_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(50),
        required_confirmations: 1,
        confirmation_timeout: Duration::from_millis(80),
        workers: 2,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        job_queue_depth: 16,
    }
}

fn rpc_result(result: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":1,"result":{}}}"#, result)
}

async fn mock_method(
    server: &mut mockito::ServerGuard,
    method: &str,
    result: &str,
) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "method": method
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(rpc_result(result))
        .expect_at_least(0)
        .create_async()
        .await
}

/// Waits until the record reaches a terminal status, or panics.
async fn await_terminal(store: &Arc<InMemoryStore>, id: Uuid) -> TxStatus {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = store.get(id).await.unwrap();
        if record.status.is_terminal() {
            return record.status;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("record never reached a terminal status");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn poller_recovers_missed_confirmation_exactly_once() {
    let mut server = mockito::Server::new_async().await;
    // Head sits at the receipt's block: depth 1 is immediately satisfied.
    let _m = mock_method(&mut server, "eth_blockNumber", "\"0x64\"").await;
    let _receipt_mock = mock_method(
        &mut server,
        "eth_getTransactionReceipt",
        r#"{"transactionHash":"0xabc","blockNumber":"0x64","gasUsed":"0x5208","effectiveGasPrice":"0x3b9aca00","status":"0x1"}"#,
    )
    .await;

    let chain = ChainClient::new("base", server.url(), USDC)
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10));

    let store = InMemoryStore::new();
    let sender = Uuid::new_v4();
    let record = pending_payment("0xabc", Some(sender), None, "base");
    let record_id = record.id;
    store.insert_row(record).await;

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let (_, mut sender_rx) = dispatcher.subscribe(sender).await;

    let monitor = start_monitoring(
        MonitorDeps {
            store: store.clone(),
            users: InMemoryDirectory::new().into_arc(),
            chains: HashMap::from([("base".to_string(), chain)]),
            dispatcher: dispatcher.clone(),
        },
        fast_monitor_config(),
    );

    let status = await_terminal(&store, record_id).await;
    assert_eq!(status, TxStatus::Confirmed);

    let settled = store.get(record_id).await.unwrap();
    assert_eq!(settled.block_number, Some(100));
    assert_eq!(settled.gas_used, Some(21000));
    assert_eq!(settled.gas_price, Some(1_000_000_000));

    // A few more poller ticks must not re-process the settled record.
    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop().await;

    let confirmations = drain(&mut sender_rx)
        .into_iter()
        .filter(|e| e.kind == EventKind::TransactionConfirmed)
        .count();
    assert_eq!(confirmations, 1, "record transitions exactly once");
}

#[tokio::test]
async fn unconfirmable_hash_fails_after_bounded_retries_with_one_notification() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", "\"0x64\"").await;
    // The hash never appears on-chain.
    let _m = mock_method(&mut server, "eth_getTransactionReceipt", "null").await;

    let chain = ChainClient::new("base", server.url(), USDC)
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10));

    let store = InMemoryStore::new();
    let sender = Uuid::new_v4();
    let record = pending_payment("0xdead", Some(sender), None, "base");
    let record_id = record.id;
    store.insert_row(record).await;

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let (_, mut sender_rx) = dispatcher.subscribe(sender).await;

    let monitor = start_monitoring(
        MonitorDeps {
            store: store.clone(),
            users: InMemoryDirectory::new().into_arc(),
            chains: HashMap::from([("base".to_string(), chain)]),
            dispatcher: dispatcher.clone(),
        },
        fast_monitor_config(),
    );

    let status = await_terminal(&store, record_id).await;
    assert_eq!(status, TxStatus::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    monitor.stop().await;

    let failures = drain(&mut sender_rx)
        .into_iter()
        .filter(|e| e.kind == EventKind::TransactionFailed)
        .count();
    assert_eq!(failures, 1, "exactly one transaction-failed notification");
}

#[tokio::test]
async fn reverted_transaction_is_marked_failed() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", "\"0x64\"").await;
    let _receipt_mock = mock_method(
        &mut server,
        "eth_getTransactionReceipt",
        r#"{"transactionHash":"0xbad","blockNumber":"0x64","gasUsed":"0x5208","effectiveGasPrice":"0x3b9aca00","status":"0x0"}"#,
    )
    .await;

    let chain = ChainClient::new("base", server.url(), USDC)
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10));

    let store = InMemoryStore::new();
    let sender = Uuid::new_v4();
    let record = pending_payment("0xbad", Some(sender), None, "base");
    let record_id = record.id;
    store.insert_row(record).await;

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let (_, mut sender_rx) = dispatcher.subscribe(sender).await;

    let monitor = start_monitoring(
        MonitorDeps {
            store: store.clone(),
            users: InMemoryDirectory::new().into_arc(),
            chains: HashMap::from([("base".to_string(), chain)]),
            dispatcher: dispatcher.clone(),
        },
        fast_monitor_config(),
    );

    let status = await_terminal(&store, record_id).await;
    assert_eq!(status, TxStatus::Failed);
    monitor.stop().await;

    let kinds: Vec<EventKind> = drain(&mut sender_rx).into_iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::TransactionFailed));
    assert!(!kinds.contains(&EventKind::TransactionConfirmed));
}

#[tokio::test]
async fn stop_shuts_the_subsystem_down_cleanly() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", "\"0x64\"").await;

    let chain = ChainClient::new("base", server.url(), USDC)
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10));

    let store = InMemoryStore::new();
    let dispatcher = Arc::new(NotificationDispatcher::new());

    let monitor = start_monitoring(
        MonitorDeps {
            store: store.clone(),
            users: InMemoryDirectory::new().into_arc(),
            chains: HashMap::from([("base".to_string(), chain)]),
            dispatcher,
        },
        fast_monitor_config(),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;

    // stop() must return even with listeners, pollers and idle workers up.
    tokio::time::timeout(Duration::from_secs(5), monitor.stop())
        .await
        .expect("shutdown timed out");
}
