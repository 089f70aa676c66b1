use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};

use bigdecimal::BigDecimal;

use super::abi;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("RPC endpoint error: {0}")]
    Network(String),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("gas estimation reverted: {0}")]
    Estimation(String),
    #[error("confirmation not observed within {0:?}")]
    Timeout(Duration),
    #[error("transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("invalid response from RPC endpoint: {0}")]
    InvalidResponse(String),
    #[error("RPC circuit breaker open: {0}")]
    CircuitOpen(String),
}

/// A mined transaction receipt. `succeeded` is false when the transaction
/// reverted on-chain.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub block_number: i64,
    pub gas_used: i64,
    pub effective_gas_price: Option<i64>,
    pub succeeded: bool,
}

/// Gas figures for a USDC transfer, limit already padded by the safety
/// margin.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GasEstimate {
    pub gas_limit: u64,
    pub gas_price: u64,
}

/// One ERC-20 Transfer log, decoded.
#[derive(Debug, Clone)]
pub struct TransferEvent {
    pub from: String,
    pub to: String,
    pub amount: BigDecimal,
    pub tx_hash: String,
    pub block_number: i64,
}

const GAS_LIMIT_MARGIN_PERCENT: u64 = 20;
const MAX_LOG_BLOCK_RANGE: i64 = 1000;

/// JSON-RPC client for one network's endpoint, watching a single USDC
/// contract. Transport failures feed a circuit breaker so a dead endpoint
/// fails fast instead of tying up every caller.
#[derive(Clone)]
pub struct ChainClient {
    client: Client,
    rpc_url: String,
    network: String,
    usdc_contract: String,
    log_poll_interval: Duration,
    receipt_poll_interval: Duration,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
    request_id: Arc<AtomicU64>,
}

impl ChainClient {
    pub fn new(network: impl Into<String>, rpc_url: impl Into<String>, usdc_contract: impl Into<String>) -> Self {
        Self::with_circuit_breaker(network, rpc_url, usdc_contract, 5, 60)
    }

    /// Creates a client with custom circuit breaker configuration.
    pub fn with_circuit_breaker(
        network: impl Into<String>,
        rpc_url: impl Into<String>,
        usdc_contract: impl Into<String>,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        ChainClient {
            client,
            rpc_url: rpc_url.into(),
            network: network.into(),
            usdc_contract: usdc_contract.into().to_lowercase(),
            log_poll_interval: Duration::from_secs(5),
            receipt_poll_interval: Duration::from_secs(2),
            circuit_breaker,
            request_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Shrinks the internal poll cadence; used by tests against mock
    /// endpoints.
    pub fn with_poll_intervals(mut self, log_poll: Duration, receipt_poll: Duration) -> Self {
        self.log_poll_interval = log_poll;
        self.receipt_poll_interval = receipt_poll;
        self
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Returns the current state of the circuit breaker.
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// One JSON-RPC round trip. Only transport-level failures count against
    /// the circuit breaker; RPC-level errors (e.g. a reverting eth_call) are
    /// classified afterwards.
    async fn rpc(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let client = self.client.clone();
        let url = self.rpc_url.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;
                let status = response.status();
                if status.is_server_error() {
                    return Err(ChainError::Network(format!(
                        "endpoint returned {}",
                        status
                    )));
                }
                let value = response.json::<Value>().await?;
                Ok(value)
            })
            .await;

        let value = match result {
            Ok(value) => value,
            Err(FailsafeError::Rejected) => {
                return Err(ChainError::CircuitOpen(format!(
                    "{} RPC circuit breaker is open",
                    self.network
                )))
            }
            Err(FailsafeError::Inner(e)) => return Err(e),
        };

        if let Some(err) = value.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            return Err(ChainError::Rpc { code, message });
        }

        value
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("missing result field".to_string()))
    }

    /// Current head block number.
    pub async fn block_number(&self) -> Result<i64, ChainError> {
        let result = self.rpc("eth_blockNumber", json!([])).await?;
        parse_hex_i64(&result, "eth_blockNumber")
    }

    /// USDC balance of an address, as a 6-decimal amount.
    pub async fn get_balance(&self, address: &str) -> Result<BigDecimal, ChainError> {
        let call = json!([
            {"to": self.usdc_contract, "data": abi::encode_balance_of(address)?},
            "latest",
        ]);
        let result = self.rpc("eth_call", call).await?;
        let word = result
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse("eth_call result is not a string".to_string()))?;
        Ok(abi::units_to_amount(&abi::decode_uint(word)?))
    }

    /// Gas figures for transferring `amount` USDC from `from` to `to`. The
    /// estimated limit gets a fixed safety margin on top. A reverting
    /// estimation (e.g. insufficient balance) surfaces as `Estimation`.
    pub async fn estimate_transfer_gas(
        &self,
        from: &str,
        to: &str,
        amount: &BigDecimal,
    ) -> Result<GasEstimate, ChainError> {
        let units = abi::amount_to_units(amount)?;
        let call = json!([{
            "from": from,
            "to": self.usdc_contract,
            "data": abi::encode_transfer(to, &units)?,
        }]);

        let limit = match self.rpc("eth_estimateGas", call).await {
            Ok(result) => parse_hex_u64(&result, "eth_estimateGas")?,
            Err(ChainError::Rpc { message, .. }) => return Err(ChainError::Estimation(message)),
            Err(e) => return Err(e),
        };

        let price_result = self.rpc("eth_gasPrice", json!([])).await?;
        let gas_price = parse_hex_u64(&price_result, "eth_gasPrice")?;

        Ok(GasEstimate {
            gas_limit: limit + limit * GAS_LIMIT_MARGIN_PERCENT / 100,
            gas_price,
        })
    }

    /// Receipt for a hash, or `None` while the transaction is unmined.
    pub async fn get_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>, ChainError> {
        let result = self
            .rpc("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    /// Blocks until `tx_hash` has `confirmations` blocks on top of it or the
    /// timeout elapses. Distinguishes a hash that was seen but not yet deep
    /// enough (`Timeout`) from one that never appeared
    /// (`TransactionNotFound`).
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        confirmations: u32,
        timeout: Duration,
    ) -> Result<TxReceipt, ChainError> {
        let deadline = Instant::now() + timeout;
        let mut seen = false;

        loop {
            if let Some(receipt) = self.get_receipt(tx_hash).await? {
                seen = true;
                let head = self.block_number().await?;
                if head - receipt.block_number + 1 >= i64::from(confirmations) {
                    return Ok(receipt);
                }
            }

            if Instant::now() + self.receipt_poll_interval > deadline {
                return if seen {
                    Err(ChainError::Timeout(timeout))
                } else {
                    Err(ChainError::TransactionNotFound(tx_hash.to_string()))
                };
            }
            sleep(self.receipt_poll_interval).await;
        }
    }

    /// Opens a Transfer-log subscription for the watched contract. Events
    /// arrive in block order on the returned channel. After an RPC outage
    /// the watcher resumes from the current head, so delivery across an
    /// outage is not gap-free; the pending-transaction poller covers the
    /// gap.
    pub fn subscribe_transfers(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> mpsc::Receiver<TransferEvent> {
        let (tx, rx) = mpsc::channel(256);
        let client = self.clone();

        tokio::spawn(async move {
            let mut last_block: Option<i64> = None;
            tracing::info!(network = %client.network, contract = %client.usdc_contract, "transfer subscription started");

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = sleep(client.log_poll_interval) => {
                        match client.poll_transfers(&mut last_block).await {
                            Ok(events) => {
                                for event in events {
                                    if tx.send(event).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!(network = %client.network, error = %e, "transfer log poll failed, resuming from head");
                                last_block = None;
                            }
                        }
                    }
                }
            }

            tracing::info!(network = %client.network, "transfer subscription stopped");
        });

        rx
    }

    async fn poll_transfers(
        &self,
        last_block: &mut Option<i64>,
    ) -> Result<Vec<TransferEvent>, ChainError> {
        let head = self.block_number().await?;
        let from = match *last_block {
            Some(last) if last < head => last + 1,
            Some(_) => return Ok(Vec::new()),
            None => {
                *last_block = Some(head);
                return Ok(Vec::new());
            }
        };
        let to = head.min(from + MAX_LOG_BLOCK_RANGE - 1);

        let filter = json!([{
            "fromBlock": format!("0x{:x}", from),
            "toBlock": format!("0x{:x}", to),
            "address": self.usdc_contract,
            "topics": [abi::TRANSFER_EVENT_TOPIC],
        }]);
        let result = self.rpc("eth_getLogs", filter).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| ChainError::InvalidResponse("eth_getLogs result is not an array".to_string()))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match parse_transfer_log(log) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(network = %self.network, error = %e, "skipping malformed transfer log");
                }
            }
        }

        *last_block = Some(to);
        Ok(events)
    }
}

fn parse_hex_i64(value: &Value, context: &str) -> Result<i64, ChainError> {
    let word = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("{} result is not a string", context)))?;
    i64::try_from(&abi::decode_uint(word)?)
        .map_err(|_| ChainError::InvalidResponse(format!("{} result out of range", context)))
}

fn parse_hex_u64(value: &Value, context: &str) -> Result<u64, ChainError> {
    let word = value
        .as_str()
        .ok_or_else(|| ChainError::InvalidResponse(format!("{} result is not a string", context)))?;
    u64::try_from(&abi::decode_uint(word)?)
        .map_err(|_| ChainError::InvalidResponse(format!("{} result out of range", context)))
}

fn parse_receipt(value: &Value) -> Result<TxReceipt, ChainError> {
    let field = |name: &str| -> Result<i64, ChainError> {
        let word = value
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| ChainError::InvalidResponse(format!("receipt missing {}", name)))?;
        i64::try_from(&abi::decode_uint(word)?)
            .map_err(|_| ChainError::InvalidResponse(format!("receipt {} out of range", name)))
    };

    let tx_hash = value
        .get("transactionHash")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("receipt missing transactionHash".to_string()))?
        .to_lowercase();

    let effective_gas_price = match value.get("effectiveGasPrice").and_then(Value::as_str) {
        Some(word) => Some(
            i64::try_from(&abi::decode_uint(word)?).map_err(|_| {
                ChainError::InvalidResponse("receipt effectiveGasPrice out of range".to_string())
            })?,
        ),
        None => None,
    };

    Ok(TxReceipt {
        tx_hash,
        block_number: field("blockNumber")?,
        gas_used: field("gasUsed")?,
        effective_gas_price,
        succeeded: field("status")? == 1,
    })
}

fn parse_transfer_log(log: &Value) -> Result<TransferEvent, ChainError> {
    let topics = log
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| ChainError::InvalidResponse("log missing topics".to_string()))?;
    if topics.len() < 3 {
        return Err(ChainError::InvalidResponse(format!(
            "transfer log has {} topics",
            topics.len()
        )));
    }

    let topic_str = |index: usize| -> Result<&str, ChainError> {
        topics[index]
            .as_str()
            .ok_or_else(|| ChainError::InvalidResponse(format!("topic {} is not a string", index)))
    };

    let data = log
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("log missing data".to_string()))?;
    let tx_hash = log
        .get("transactionHash")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("log missing transactionHash".to_string()))?
        .to_lowercase();
    let block_word = log
        .get("blockNumber")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::InvalidResponse("log missing blockNumber".to_string()))?;

    Ok(TransferEvent {
        from: abi::topic_to_address(topic_str(1)?)?,
        to: abi::topic_to_address(topic_str(2)?)?,
        amount: abi::units_to_amount(&abi::decode_uint(data)?),
        tx_hash,
        block_number: i64::try_from(&abi::decode_uint(block_word)?)
            .map_err(|_| ChainError::InvalidResponse("log blockNumber out of range".to_string()))?,
    })
}
