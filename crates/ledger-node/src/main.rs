//! ledger-node — the node binary.
//!
//! Startup sequence:
//!   1. Validate `--data-dir` (fail loudly; no tilde expansion or
//!      relative fallback) and open `Storage`.
//!   2. Apply genesis if the directory is fresh, else recover the tip.
//!   3. Spawn the P2P ingress loop (`ledger_p2p::ChannelNetwork` — no
//!      peers dialed yet; a real transport plugs in here).
//!   4. Start the JSON-RPC server, sharing the node's own tip handle.

use std::sync::Arc;

use clap::Parser;
use ledger_node::config::{generate_ephemeral_genesis, load_genesis_params, validate_data_dir, Args};
use ledger_node::node::bootstrap;
use ledger_p2p::ChannelNetwork;
use ledger_rpc::{RpcServer, RpcServerState};
use ledger_storage::Storage;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ledger=debug")),
        )
        .init();

    validate_data_dir(&args.data_dir)?;
    let storage = Arc::new(Storage::open(&args.data_dir)?);

    let genesis_params = match &args.genesis_params {
        Some(path) => Some(load_genesis_params(path)?),
        None if storage.units_in_mci_range(0, 0)?.is_empty() => {
            let (params, keys) = generate_ephemeral_genesis(args.alt.clone());
            tracing::warn!(
                witnesses = keys.len(),
                "no --genesis-params given; generated an ephemeral devnet genesis \
                 whose witness keys exist only in this process's memory"
            );
            Some(params)
        }
        None => None,
    };

    let node = Arc::new(bootstrap(Arc::clone(&storage), args.alt.clone(), genesis_params)?);

    let (network, mut inbound_rx) = ChannelNetwork::new("local".to_string(), 256);
    let _network = Arc::new(network);
    let p2p_node = Arc::clone(&node);
    tokio::spawn(async move {
        while let Some(msg) = inbound_rx.recv().await {
            if let Err(e) = p2p_node.handle_p2p_message(msg).await {
                tracing::warn!(error = %e, "error handling inbound P2P message");
            }
        }
    });

    let rpc_state = Arc::new(RpcServerState {
        storage: Arc::clone(&storage),
        witnesses: node.witnesses.clone(),
        tip: node.tip_handle(),
    });
    let rpc_handle = RpcServer::new(rpc_state).start(args.rpc_addr).await?;

    tracing::info!(addr = %args.rpc_addr, "ledger-node running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    rpc_handle.stop()?;
    storage.flush()?;
    Ok(())
}
