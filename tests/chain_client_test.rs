use std::time::Duration;

use stablepay_core::chain::{ChainClient, ChainError};

const USDC: &str = "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913";
const HOLDER: &str = "0xaaaa00000000000000000000000000000000aaaa";

fn rpc_result(result: &str) -> String {
    format!(r#"{{"jsonrpc":"2.0","id":1,"result":{}}}"#, result)
}

async fn mock_method(
    server: &mut mockito::ServerGuard,
    method: &str,
    body: String,
) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "method": method
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect_at_least(0)
        .create_async()
        .await
}

fn fast_client(url: String) -> ChainClient {
    ChainClient::new("base", url, USDC)
        .with_poll_intervals(Duration::from_millis(10), Duration::from_millis(10))
}

#[tokio::test]
async fn balance_decodes_erc20_word() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(
        &mut server,
        "eth_call",
        rpc_result(r#""0x0000000000000000000000000000000000000000000000000000000000989680""#),
    )
    .await;

    let client = fast_client(server.url());
    let balance = client.get_balance(HOLDER).await.unwrap();
    assert_eq!(balance.to_string(), "10.000000");
}

#[tokio::test]
async fn gas_estimate_applies_twenty_percent_margin() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_estimateGas", rpc_result(r#""0xc350""#)).await;
    let _m = mock_method(&mut server, "eth_gasPrice", rpc_result(r#""0x3b9aca00""#)).await;

    let client = fast_client(server.url());
    let estimate = client
        .estimate_transfer_gas(HOLDER, USDC, &common_amount("5.000000"))
        .await
        .unwrap();

    assert_eq!(estimate.gas_limit, 60_000); // 50_000 + 20%
    assert_eq!(estimate.gas_price, 1_000_000_000);
}

#[tokio::test]
async fn reverting_estimation_surfaces_as_estimation_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "method": "eth_estimateGas"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":3,"message":"execution reverted: ERC20: transfer amount exceeds balance"}}"#,
        )
        .create_async()
        .await;

    let client = fast_client(server.url());
    let result = client
        .estimate_transfer_gas(HOLDER, USDC, &common_amount("5.000000"))
        .await;

    match result {
        Err(ChainError::Estimation(message)) => {
            assert!(message.contains("execution reverted"));
        }
        other => panic!("expected Estimation error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn unmined_receipt_is_none_not_an_error() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_getTransactionReceipt", rpc_result("null")).await;

    let client = fast_client(server.url());
    let receipt = client.get_receipt("0xabc").await.unwrap();
    assert!(receipt.is_none());
}

#[tokio::test]
async fn wait_reports_not_found_when_hash_never_appears() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", rpc_result(r#""0x64""#)).await;
    let _m = mock_method(&mut server, "eth_getTransactionReceipt", rpc_result("null")).await;

    let client = fast_client(server.url());
    let result = client
        .wait_for_confirmation("0xmissing", 1, Duration::from_millis(60))
        .await;

    assert!(matches!(result, Err(ChainError::TransactionNotFound(_))));
}

#[tokio::test]
async fn wait_reports_timeout_when_confirmations_stay_shallow() {
    let mut server = mockito::Server::new_async().await;
    // Receipt exists but the head never moves past its block.
    let _m = mock_method(&mut server, "eth_blockNumber", rpc_result(r#""0x64""#)).await;
    let _receipt_mock = mock_method(
        &mut server,
        "eth_getTransactionReceipt",
        rpc_result(
            r#"{"transactionHash":"0xabc","blockNumber":"0x64","gasUsed":"0x5208","effectiveGasPrice":"0x3b9aca00","status":"0x1"}"#,
        ),
    )
    .await;

    let client = fast_client(server.url());
    let result = client
        .wait_for_confirmation("0xabc", 3, Duration::from_millis(60))
        .await;

    assert!(matches!(result, Err(ChainError::Timeout(_))));
}

#[tokio::test]
async fn wait_succeeds_at_required_depth() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", rpc_result(r#""0x66""#)).await;
    let _receipt_mock = mock_method(
        &mut server,
        "eth_getTransactionReceipt",
        rpc_result(
            r#"{"transactionHash":"0xabc","blockNumber":"0x64","gasUsed":"0x5208","effectiveGasPrice":"0x3b9aca00","status":"0x1"}"#,
        ),
    )
    .await;

    let client = fast_client(server.url());
    let receipt = client
        .wait_for_confirmation("0xabc", 3, Duration::from_millis(500))
        .await
        .unwrap();

    assert_eq!(receipt.block_number, 100);
    assert!(receipt.succeeded);
}

#[tokio::test]
async fn circuit_breaker_opens_after_consecutive_failures() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("POST", "/")
        .with_status(500)
        .expect_at_least(3)
        .create_async()
        .await;

    let client = ChainClient::with_circuit_breaker("base", server.url(), USDC, 3, 60);

    for _ in 0..3 {
        let _ = client.block_number().await;
    }

    let result = client.block_number().await;
    assert!(matches!(result, Err(ChainError::CircuitOpen(_))));
    assert_eq!(client.circuit_state(), "open");
}

#[tokio::test]
async fn subscription_closes_on_shutdown() {
    let mut server = mockito::Server::new_async().await;
    let _m = mock_method(&mut server, "eth_blockNumber", rpc_result(r#""0x64""#)).await;

    let client = fast_client(server.url());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut events = client.subscribe_transfers(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("subscription did not close");
    assert!(next.is_none());
}

fn common_amount(s: &str) -> bigdecimal::BigDecimal {
    use std::str::FromStr;
    bigdecimal::BigDecimal::from_str(s).unwrap()
}
