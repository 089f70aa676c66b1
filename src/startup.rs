use anyhow::{Context, Result};
use serde_json::json;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::Config;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub rpc: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.rpc
    }

    /// Whether the service can start at all. A down RPC endpoint degrades
    /// monitoring but does not stop the server; missing environment or an
    /// unreachable database does.
    pub fn is_fatal(&self) -> bool {
        !self.environment || !self.database
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("RPC Connectivity:      {}", status(self.rpc));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "✅ PASS" } else { "❌ FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "✅ OK"
    } else {
        "❌ FAIL"
    }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        rpc: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    for network in &config.networks {
        if let Err(e) = validate_rpc(&network.rpc_url).await {
            report.rpc = false;
            report
                .errors
                .push(format!("RPC ({}): {}", network.name, e));
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.networks.is_empty() {
        anyhow::bail!("NETWORKS must name at least one network");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }

    for network in &config.networks {
        url::Url::parse(&network.rpc_url)
            .with_context(|| format!("{}_RPC_URL is not a valid URL", network.name.to_uppercase()))?;
        if !network.usdc_contract.starts_with("0x") {
            anyhow::bail!(
                "USDC_{} is not a 0x-prefixed contract address",
                network.name.to_uppercase()
            );
        }
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    // Check if migrations are up to date
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_rpc(rpc_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .post(rpc_url)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_blockNumber",
            "params": [],
        }))
        .send()
        .await
        .context("Failed to connect to RPC endpoint")?;

    if !response.status().is_success() {
        anyhow::bail!("RPC endpoint returned status: {}", response.status());
    }

    Ok(())
}
