//! Node configuration for the Weir full node.
//!
//! Provides [`NodeConfig`] with defaults for data directory, RPC binding,
//! network selection, and the checkpoint operator keys. The configuration
//! is built programmatically; the binary maps CLI flags onto it.

use std::path::PathBuf;

use weir_core::constants::{NetworkType, DEFAULT_CHECKPOINT_DEPTH};
use weir_core::error::CheckpointError;
use weir_checkpoint::MasterPubkey;

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Which network this node participates in.
    pub network: NetworkType,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// Log level filter string (e.g. "info", "debug", "weir_node=trace").
    pub log_level: String,
    /// Checkpoint master private key (hex-encoded 32-byte scalar). Setting
    /// this turns the node into the checkpoint master.
    pub checkpoint_key: Option<String>,
    /// Override for the compiled-in checkpoint master public key
    /// (hex-encoded SEC1 point). Intended for private networks.
    pub checkpoint_pubkey: Option<String>,
    /// Blocks the automatic checkpoint lags behind the tip. Negative means
    /// checkpoints are issued manually via `sendcheckpoint`.
    pub checkpoint_depth: i64,
    /// Whether accepted checkpoints force a reorganization.
    pub checkpoint_enforce: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("weir");
        let network = NetworkType::default();

        Self {
            data_dir,
            network,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: network.default_rpc_port(),
            log_level: "info".to_string(),
            checkpoint_key: None,
            checkpoint_pubkey: None,
            checkpoint_depth: DEFAULT_CHECKPOINT_DEPTH,
            checkpoint_enforce: true,
        }
    }
}

impl NodeConfig {
    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir
            .join(self.network.data_dir_suffix())
            .join("chaindata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }

    /// The master public key this node verifies checkpoints against: the
    /// configured override, or the compiled-in key for the network.
    pub fn master_pubkey(&self) -> Result<MasterPubkey, CheckpointError> {
        match &self.checkpoint_pubkey {
            Some(hex) => MasterPubkey::from_hex(hex),
            None => Ok(MasterPubkey::for_network(self.network)),
        }
    }
}
