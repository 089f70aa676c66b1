use clap::{Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "stablepay-core")]
#[command(about = "StablePay Core - USDC payment reconciliation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and blockchain monitoring (default)
    Serve,

    /// Transaction inspection commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Show one transaction record
    Show {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },

    /// List transactions still pending on a network
    Pending {
        /// Network name
        #[arg(value_name = "NETWORK")]
        network: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_show(pool: &PgPool, tx_id: Uuid) -> anyhow::Result<()> {
    use crate::adapters::PostgresRecordStore;
    use crate::ports::RecordStore;

    let store = PostgresRecordStore::new(pool.clone());
    let record = store.get(tx_id).await?;

    println!("Transaction {}", record.id);
    println!("  Hash:      {}", record.tx_hash.as_deref().unwrap_or("-"));
    println!("  Status:    {}", record.status);
    println!("  Network:   {}", record.network);
    println!("  From:      {}", record.from_address);
    println!("  To:        {}", record.to_address);
    println!("  Amount:    {}", record.amount);
    println!(
        "  Block:     {}",
        record
            .block_number
            .map_or_else(|| "-".to_string(), |b| b.to_string())
    );
    println!("  Created:   {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:   {}", record.updated_at.format("%Y-%m-%d %H:%M:%S"));

    Ok(())
}

pub async fn handle_tx_pending(pool: &PgPool, network: &str) -> anyhow::Result<()> {
    use crate::adapters::PostgresRecordStore;
    use crate::ports::RecordStore;

    let store = PostgresRecordStore::new(pool.clone());
    let pending = store.select_pending(network).await?;

    if pending.is_empty() {
        println!("No pending transactions on {}", network);
        return Ok(());
    }

    println!("{:<38} {:<68} {:<12} {:<20}", "ID", "Hash", "Amount", "Created");
    println!("{}", "-".repeat(140));
    for record in pending {
        println!(
            "{:<38} {:<68} {:<12} {:<20}",
            record.id,
            record.tx_hash.as_deref().unwrap_or("-"),
            record.amount.to_string(),
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    use sqlx::migrate::Migrator;
    use std::path::Path;

    let pool = crate::db::create_pool(config).await?;
    let migrator = Migrator::new(Path::new("./migrations")).await?;

    tracing::info!("Running database migrations...");
    migrator.run(&pool).await?;

    tracing::info!("Database migrations completed");
    println!("✓ Database migrations completed");

    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    for network in &config.networks {
        println!(
            "  Network {}: rpc={} usdc={}",
            network.name, network.rpc_url, network.usdc_contract
        );
    }
    println!("  Required Confirmations: {}", config.required_confirmations);
    println!("  Poll Interval: {}s", config.poll_interval_secs);
    println!("  Monitor Workers: {}", config.monitor_workers);

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
