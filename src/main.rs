use clap::Parser;
use sqlx::migrate::Migrator;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stablepay_core::adapters::{PostgresRecordStore, PostgresUserDirectory};
use stablepay_core::chain::ChainClient;
use stablepay_core::cli::{Cli, Commands, DbCommands, TxCommands};
use stablepay_core::config::Config;
use stablepay_core::monitor::{start_monitoring, MonitorDeps};
use stablepay_core::notify::NotificationDispatcher;
use stablepay_core::ports::{RecordStore, UserDirectory};
use stablepay_core::{cli, create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();
    let config = Config::from_env()?;

    match args.command {
        None | Some(Commands::Serve) => serve(config).await,
        Some(Commands::Db(DbCommands::Migrate)) => cli::handle_db_migrate(&config).await,
        Some(Commands::Tx(TxCommands::Show { tx_id })) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_show(&pool, tx_id).await
        }
        Some(Commands::Tx(TxCommands::Pending { network })) => {
            let pool = db::create_pool(&config).await?;
            cli::handle_tx_pending(&pool, &network).await
        }
        Some(Commands::Config) => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("Database migrations completed");

    let report = startup::validate_environment(&config, &pool).await?;
    if !report.is_valid() {
        report.print();
        if report.is_fatal() {
            anyhow::bail!("startup validation failed");
        }
        tracing::warn!("starting with degraded RPC connectivity; the poller will keep retrying");
    }

    let chains: HashMap<String, ChainClient> = config
        .networks
        .iter()
        .map(|n| {
            (
                n.name.clone(),
                ChainClient::new(n.name.clone(), n.rpc_url.clone(), n.usdc_contract.clone()),
            )
        })
        .collect();
    tracing::info!(networks = chains.len(), "chain clients initialized");

    let dispatcher = Arc::new(NotificationDispatcher::new());
    let store: Arc<dyn RecordStore> = Arc::new(PostgresRecordStore::new(pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PostgresUserDirectory::new(pool.clone()));

    let monitor = start_monitoring(
        MonitorDeps {
            store: store.clone(),
            users: users.clone(),
            chains: chains.clone(),
            dispatcher: dispatcher.clone(),
        },
        config.monitor_config(),
    );

    let state = AppState {
        db: pool,
        store,
        users,
        chains: Arc::new(chains),
        dispatcher,
        start_time: Instant::now(),
    };
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // In-flight confirmation waits finish before the process exits.
    monitor.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown signal handler: {}", e);
    }
    tracing::info!("shutdown signal received");
}
