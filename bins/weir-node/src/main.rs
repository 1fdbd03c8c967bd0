//! Weir full node binary.
//!
//! Starts a full node with RocksDB storage and the JSON-RPC server,
//! including the synchronized-checkpoint operator surface.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, info};

use weir_core::constants::{NetworkType, DEFAULT_CHECKPOINT_DEPTH};
use weir_node_lib::{start_rpc_server, Node, NodeConfig};

/// Weir full node — "A weir holds the river to its course."
#[derive(Parser, Debug)]
#[command(
    name = "weir-node",
    version,
    about = "Weir full node with RocksDB storage and JSON-RPC server"
)]
struct Args {
    /// Data directory for blockchain storage and config
    #[arg(long, default_value = None)]
    data_dir: Option<PathBuf>,

    /// Use the test network
    #[arg(long)]
    testnet: bool,

    /// RPC server bind address
    #[arg(long, default_value = "127.0.0.1")]
    rpc_bind: String,

    /// RPC server port (defaults to the network's standard port)
    #[arg(long)]
    rpc_port: Option<u16>,

    /// Checkpoint master private key (hex-encoded 32-byte scalar).
    /// Turns this node into the checkpoint master.
    #[arg(long)]
    checkpoint_key: Option<String>,

    /// Override the compiled-in checkpoint master public key
    /// (hex-encoded SEC1 point; private networks only)
    #[arg(long)]
    checkpoint_pubkey: Option<String>,

    /// Blocks the automatic checkpoint lags behind the tip;
    /// negative disables automatic checkpoints
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_DEPTH)]
    checkpoint_depth: i64,

    /// Enforce broadcast checkpoints (reorganize onto the checkpointed
    /// chain); false runs in advisory mode
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    checkpoint_enforce: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Convert CLI args into a NodeConfig.
    fn into_config(self) -> NodeConfig {
        let network = if self.testnet {
            NetworkType::Testnet
        } else {
            NetworkType::Mainnet
        };
        let mut config = NodeConfig {
            network,
            rpc_port: self.rpc_port.unwrap_or_else(|| network.default_rpc_port()),
            ..NodeConfig::default()
        };

        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        config.rpc_bind = self.rpc_bind;
        config.log_level = self.log_level;
        config.checkpoint_key = self.checkpoint_key;
        config.checkpoint_pubkey = self.checkpoint_pubkey;
        config.checkpoint_depth = self.checkpoint_depth;
        config.checkpoint_enforce = self.checkpoint_enforce;
        config
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = args.into_config();

    init_logging(&config.log_level);

    info!("Weir Full Node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {:?}", config.network);
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!(
        "checkpoint: enforce={} depth={} master={}",
        config.checkpoint_enforce,
        config.checkpoint_depth,
        config.checkpoint_key.is_some()
    );

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let node = match Node::open(config.clone()) {
        Ok(n) => n,
        Err(e) => {
            error!("failed to start node: {}", e);
            process::exit(1);
        }
    };

    let (height, hash) = node.chain_tip();
    info!("chain_tip: height={} hash={}", height, hash);
    let status = node.checkpoints().status();
    info!(
        "sync-checkpoint: {} ({})",
        status.accepted,
        if status.enforced { "enforce" } else { "advisory" }
    );

    let rpc_handle = match start_rpc_server(&config.rpc_addr(), node.clone()).await {
        Ok(handle) => {
            info!("RPC server listening on {}", config.rpc_addr());
            handle
        }
        Err(e) => {
            error!("failed to start RPC server: {}", e);
            process::exit(1);
        }
    };

    info!("Weir node running (Ctrl+C to stop)");

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    info!("received Ctrl+C, shutting down...");

    rpc_handle.stop().ok();
    info!("Weir node shutdown complete");
}

/// Initialize tracing subscriber with the given log level.
fn init_logging(level_str: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}
