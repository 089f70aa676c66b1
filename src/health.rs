use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::chain::ChainClient;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: e.to_string(),
            },
        }
    }
}

/// Checks one network's RPC endpoint. An open circuit breaker reports as
/// unhealthy without issuing the call, which is the operator-facing
/// degraded signal for a persistent endpoint outage.
pub struct RpcChecker {
    client: ChainClient,
}

impl RpcChecker {
    pub fn new(client: ChainClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for RpcChecker {
    async fn check(&self) -> DependencyStatus {
        if self.client.circuit_state() == "open" {
            return DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "circuit breaker open".to_string(),
            };
        }

        let start = Instant::now();
        match self.client.block_number().await {
            Ok(_) => DependencyStatus::Healthy {
                status: "healthy".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: e.to_string(),
            },
        }
    }
}

pub async fn check_health(
    postgres: PostgresChecker,
    rpc: Vec<(String, RpcChecker)>,
    start_time: Instant,
) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);
    let mut dependencies = HashMap::new();

    dependencies.insert(
        "postgres".to_string(),
        timeout(timeout_duration, postgres.check())
            .await
            .unwrap_or_else(|_| DependencyStatus::Unhealthy {
                status: "unhealthy".to_string(),
                error: "timeout".to_string(),
            }),
    );

    for (network, checker) in rpc {
        dependencies.insert(
            format!("rpc-{}", network),
            timeout(timeout_duration, checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::Unhealthy {
                    status: "unhealthy".to_string(),
                    error: "timeout".to_string(),
                }),
        );
    }

    let overall_status = determine_overall_status(&dependencies);

    HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}

fn determine_overall_status(dependencies: &HashMap<String, DependencyStatus>) -> String {
    let critical_deps = ["postgres"];
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        // RPC trouble degrades monitoring latency but the poller keeps
        // retrying; transactions themselves are not failed by an outage.
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}
