//! `orchestrator` CLI entrypoint (§6): `run`, `once`, `backfill`, `init-db`.
//! Exit codes: 0 success, 1 transient failure, 2 configuration error,
//! 3 lock contention.

use anyhow::Result;
use clap::{Parser, Subcommand};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;
use utxoracle_core::config::load_config;
use utxoracle_core::error::OrchestratorError;
use utxoracle_core::fetch::indexer::IndexerSource;
use utxoracle_core::fetch::node_rpc::{Auth, NodeRpcSource};
use utxoracle_core::fetch::public_api::PublicApiSource;
use utxoracle_core::fetch::CascadingSource;
use utxoracle_core::orchestrator::Orchestrator;
use utxoracle_core::store::Store;
use utxoracle_core::whale::fanout::FanoutHub;
use utxoracle_core::whale::WhaleStream;

#[derive(Parser)]
#[command(name = "orchestrator", about = "UTXOracle periodic price discovery driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the long-lived daemon: orchestrator loop + whale stream + ReadAPI.
    Run,
    /// Execute one cycle and exit.
    Once,
    /// Fill an explicit date range.
    Backfill {
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
    },
    /// Create the sqlite schema and exit.
    InitDb,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "orchestrator exited with error");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "configuration error");
            return Ok(2);
        }
    };

    match cli.command {
        Command::InitDb => {
            let store = Store::open(&config.store_path, &config.store_backup_path)?;
            drop(store); // schema is created on open
            info!("schema initialized");
            Ok(0)
        }
        Command::Once => {
            let mut orchestrator = build_orchestrator(&config)?;
            match orchestrator.run_once().await {
                Ok(summary) => {
                    info!(?summary.tx_count, ?summary.confidence, "cycle finished");
                    Ok(0)
                }
                Err(OrchestratorError::LockContention) => Ok(3),
                Err(e) => {
                    error!(error = %e, "cycle failed");
                    Ok(1)
                }
            }
        }
        Command::Backfill { start, end } => {
            let mut orchestrator = build_orchestrator(&config)?;
            let mut date = start;
            while date <= end {
                if let Err(e) = orchestrator.backfill_one_date_public(date).await {
                    error!(%date, error = %e, "backfill failed for date");
                }
                date += chrono::Duration::days(1);
            }
            Ok(0)
        }
        Command::Run => run_daemon(config).await,
    }
}

async fn run_daemon(config: utxoracle_core::config::AppConfig) -> Result<i32> {
    let cycle_period = std::time::Duration::from_secs(config.cycle_period_seconds);
    let mut orchestrator = build_orchestrator(&config)?;
    let latest_price = orchestrator.latest_price_handle();

    let whale_fanout = FanoutHub::new();
    let whale_store = Arc::new(Store::open(&config.store_path, &config.store_backup_path)?);
    let whale_stream = Arc::new(WhaleStream::new(
        latest_price,
        whale_fanout.clone(),
        config.whale_btc_threshold,
    ));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let whale_ws_url = format!(
        "{}/ws/track-mempool",
        config.indexer_base_url.replacen("http", "ws", 1)
    );
    let whale_task = tokio::spawn({
        let whale_stream = whale_stream.clone();
        let store = whale_store.clone();
        let rx = shutdown_rx.clone();
        async move { whale_stream.run(whale_ws_url, Some(store), rx).await }
    });

    let api_state = utxoracle_core::api::AppState::new(
        Arc::new(Mutex::new(Store::open(&config.store_path, &config.store_backup_path)?)),
        whale_fanout,
        config.jwt_signing_secret.clone(),
        config.dev_bypass,
    );
    let router = utxoracle_core::api::router(api_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.read_api_port)).await?;
    let api_task = tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .await;
    });

    let mut interval = tokio::time::interval(cycle_period);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match orchestrator.run_once().await {
                    Ok(summary) => info!(?summary.tx_count, "daemon cycle complete"),
                    Err(e) => error!(error = %e, "daemon cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }

    whale_task.abort();
    api_task.abort();
    Ok(0)
}

fn build_orchestrator(config: &utxoracle_core::config::AppConfig) -> Result<Orchestrator> {
    let store = Store::open(&config.store_path, &config.store_backup_path)?;

    let mut tiers: Vec<Box<dyn utxoracle_core::fetch::TransactionSource>> =
        vec![Box::new(IndexerSource::with_workers(
            config.indexer_base_url.clone(),
            config.indexer_workers,
        ))];
    if config.public_api_enabled {
        if let Some(url) = &config.public_indexer_base_url {
            tiers.push(Box::new(PublicApiSource::new(url.clone())));
        }
    }
    let auth = match &config.node_cookie_path {
        Some(path) => Auth::CookieFile(path.clone()),
        None => Auth::UserPass(
            config.node_rpc_user.clone().unwrap_or_default(),
            config.node_rpc_pass.clone().unwrap_or_default(),
        ),
    };
    tiers.push(Box::new(NodeRpcSource::new(config.node_rpc_url.clone(), auth)));

    let source = CascadingSource::new(tiers);
    Ok(Orchestrator::new(config.clone(), store, source, None))
}
