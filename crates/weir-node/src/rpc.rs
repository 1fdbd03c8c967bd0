//! JSON-RPC server for the Weir full node.
//!
//! Uses jsonrpsee 0.24 to expose the checkpoint operator surface
//! (`getcheckpoint`, `sendcheckpoint`, `enforcecheckpoint`) together with
//! basic chain queries.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use weir_core::error::WeirError;
use weir_core::types::Hash256;

use crate::node::Node;

/// JSON representation of the synchronized checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointJson {
    /// Accepted sync-checkpoint hash as hex.
    pub synccheckpoint: String,
    /// Height of the checkpointed block, when it is indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u64>,
    /// Timestamp of the checkpointed block, when it is indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// "enforce" when accepted checkpoints reorganize the chain,
    /// "advisory" when they only warn.
    pub subscribemode: String,
    /// Present (true) only on the checkpoint master node.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpointmaster: Option<bool>,
}

/// Parse a 64-character hex string into a Hash256.
pub fn parse_hash(hex_str: &str) -> Result<Hash256, ErrorObjectOwned> {
    if hex_str.len() != 64 {
        return Err(rpc_error(-1, "hash must be 64 hex characters"));
    }
    Hash256::from_hex(hex_str).map_err(|_| rpc_error(-1, "invalid hex in hash"))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

/// The Weir JSON-RPC interface.
#[rpc(server)]
pub trait WeirRpc {
    /// Returns the current block count (chain tip height).
    #[method(name = "getblockcount")]
    async fn get_block_count(&self) -> Result<u64, ErrorObjectOwned>;

    /// Returns the hash of the best-chain tip.
    #[method(name = "getbestblockhash")]
    async fn get_best_block_hash(&self) -> Result<String, ErrorObjectOwned>;

    /// Shows info about the synchronized checkpoint.
    #[method(name = "getcheckpoint")]
    async fn get_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned>;

    /// Signs and broadcasts a synchronized checkpoint. Master only.
    #[method(name = "sendcheckpoint")]
    async fn send_checkpoint(
        &self,
        blockhash: String,
    ) -> Result<CheckpointJson, ErrorObjectOwned>;

    /// Enables or disables enforcement of broadcast checkpoints.
    #[method(name = "enforcecheckpoint")]
    async fn enforce_checkpoint(&self, enforce: bool) -> Result<(), ErrorObjectOwned>;
}

/// Implementation of the Weir JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    /// Create a new RPC server implementation wrapping the given node.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    /// Build the `getcheckpoint` response from the current engine state.
    fn checkpoint_json(&self) -> CheckpointJson {
        let status = self.node.checkpoints().status();
        let entry = self.node.lookup_entry(&status.accepted);
        CheckpointJson {
            synccheckpoint: status.accepted.to_string(),
            height: entry.as_ref().map(|e| e.height),
            timestamp: entry.as_ref().map(|e| e.timestamp),
            subscribemode: if status.enforced { "enforce" } else { "advisory" }.to_string(),
            checkpointmaster: status.is_master.then_some(true),
        }
    }
}

#[async_trait]
impl WeirRpcServer for RpcServerImpl {
    async fn get_block_count(&self) -> Result<u64, ErrorObjectOwned> {
        let (height, _) = self.node.chain_tip();
        Ok(height)
    }

    async fn get_best_block_hash(&self) -> Result<String, ErrorObjectOwned> {
        let (_, hash) = self.node.chain_tip();
        Ok(hash.to_string())
    }

    async fn get_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned> {
        Ok(self.checkpoint_json())
    }

    async fn send_checkpoint(
        &self,
        blockhash: String,
    ) -> Result<CheckpointJson, ErrorObjectOwned> {
        if !self.node.checkpoints().is_master() {
            return Err(rpc_error(
                -1,
                "Not a checkpointmaster node, first set checkpointkey in configuration and restart client",
            ));
        }
        let hash = parse_hash(&blockhash)?;
        self.node
            .checkpoints()
            .broadcast(hash)
            .map_err(|e| rpc_error(-1, &format!("Failed to send checkpoint: {e}")))?;
        Ok(self.checkpoint_json())
    }

    async fn enforce_checkpoint(&self, enforce: bool) -> Result<(), ErrorObjectOwned> {
        if self.node.checkpoints().is_master() && !enforce {
            return Err(rpc_error(
                -1,
                "checkpoint master node must enforce synchronized checkpoints",
            ));
        }
        self.node.checkpoints().set_enforce(enforce);
        Ok(())
    }
}

/// Start the JSON-RPC server on the given address.
///
/// Returns a [`ServerHandle`] that can be used to stop the server.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, WeirError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| weir_core::error::StoreError::Backend(format!("RPC server error: {e}")))?;

    let rpc_impl = RpcServerImpl::new(node);
    Ok(server.start(rpc_impl.into_rpc()))
}
