use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::monitor::{MonitorConfig, RetryPolicy};

/// One watched network: an RPC endpoint plus the USDC contract deployed on
/// it. `BASE_RPC_URL` / `USDC_BASE` style variables, one pair per entry in
/// `NETWORKS`.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub name: String,
    pub rpc_url: String,
    pub usdc_contract: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub networks: Vec<NetworkConfig>,
    pub required_confirmations: u32,
    pub poll_interval_secs: u64,
    pub confirmation_timeout_secs: u64,
    pub monitor_workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        let network_names = env::var("NETWORKS").unwrap_or_else(|_| "base".to_string());
        let mut networks = Vec::new();
        for name in network_names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let upper = name.to_uppercase();
            let rpc_url = env::var(format!("{}_RPC_URL", upper))
                .with_context(|| format!("{}_RPC_URL must be set", upper))?;
            let usdc_contract = env::var(format!("USDC_{}", upper))
                .with_context(|| format!("USDC_{} must be set", upper))?;
            networks.push(NetworkConfig {
                name: name.to_lowercase(),
                rpc_url,
                usdc_contract,
            });
        }

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            networks,
            required_confirmations: env::var("REQUIRED_CONFIRMATIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            poll_interval_secs: env::var("MONITOR_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            confirmation_timeout_secs: env::var("CONFIRMATION_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()?,
            monitor_workers: env::var("MONITOR_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()?,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            required_confirmations: self.required_confirmations,
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
            workers: self.monitor_workers,
            retry: RetryPolicy::default(),
            job_queue_depth: 256,
        }
    }

    pub fn network_names(&self) -> Vec<&str> {
        self.networks.iter().map(|n| n.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/stablepay".to_string(),
            networks: vec![NetworkConfig {
                name: "base".to_string(),
                rpc_url: "https://mainnet.base.org".to_string(),
                usdc_contract: "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913".to_string(),
            }],
            required_confirmations: 1,
            poll_interval_secs: 30,
            confirmation_timeout_secs: 120,
            monitor_workers: 4,
        }
    }

    #[test]
    fn monitor_config_mirrors_env_settings() {
        let monitor = test_config().monitor_config();
        assert_eq!(monitor.poll_interval, Duration::from_secs(30));
        assert_eq!(monitor.required_confirmations, 1);
        assert_eq!(monitor.workers, 4);
    }

    #[test]
    fn network_names_are_lowercase() {
        let config = test_config();
        assert_eq!(config.network_names(), vec!["base"]);
    }
}
