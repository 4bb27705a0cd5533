//! The Aegen node binary.
//!
//! Boots storage, recovers or builds genesis state, starts the RPC
//! server and runs the production loop until interrupted.

use aegen_production::rpc::{ChainView, PendingRequests, RpcServer, RpcServerConfig, RpcState};
use aegen_production::{
    init_telemetry, LogFormat, NodeOptions, ProductionRunner, RocksDbStorage, SharedViews,
    TelemetryConfig,
};
use aegen_settlement::HttpPactClient;
use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "aegen-node", about = "Aegen L2 ledger node", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the RPC listen address.
    #[arg(long)]
    rpc_listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => NodeOptions::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeOptions::default(),
    };
    if let Some(data_dir) = args.data_dir {
        options.node.data_dir = data_dir;
    }
    if let Some(rpc_listen) = args.rpc_listen {
        options.node.rpc_listen = rpc_listen;
    }

    let format: LogFormat = options
        .node
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    init_telemetry(&TelemetryConfig {
        format,
        ..Default::default()
    })?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting aegen node");

    let storage = Arc::new(
        RocksDbStorage::open(&options.node.data_dir).context("opening rocksdb storage")?,
    );
    let signing_key = options.signing_key()?;
    let pact_client = Arc::new(HttpPactClient::new(options.chainweb.clone()));
    if !options.chainweb.has_credentials() {
        info!("no chainweb credentials configured; settling in simulation mode");
    }

    let views = SharedViews::new();
    {
        let mut chain = views.chain.write().await;
        *chain = ChainView {
            network: options.chainweb.network_id.clone(),
            chain_id: options.chainweb.chain_id.clone(),
            ..Default::default()
        };
    }

    let (event_tx, event_rx) = mpsc::channel(1024);
    let rpc_state = RpcState {
        ready: Arc::new(AtomicBool::new(false)),
        start_time: Instant::now(),
        chain: Arc::clone(&views.chain),
        ledger: Arc::clone(&views.ledger),
        tx_status: Arc::clone(&views.tx_status),
        storage: Arc::clone(&storage),
        event_tx,
        pending: Arc::clone(&views.pending),
    };

    let mut builder = ProductionRunner::builder()
        .node_config(options.node_config())
        .storage(storage)
        .pact_client(pact_client)
        .client_events(event_rx)
        .shared_views(views);
    if let Some(key) = signing_key {
        builder = builder.signing_key(key);
    }
    let (runner, shutdown) = builder.build().context("assembling the runner")?;

    let rpc_handle = RpcServer::start(
        RpcServerConfig {
            listen_addr: options.node.rpc_listen,
        },
        rpc_state,
    )
    .await
    .context("starting the rpc server")?;

    let runner_task = tokio::spawn(runner.run());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("interrupt received; shutting down");

    shutdown.shutdown();
    let _ = runner_task.await;
    rpc_handle.shutdown();
    Ok(())
}
