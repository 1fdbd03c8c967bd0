//! # weir-node-lib — Full node: RocksDB, RPC, orchestration.
//!
//! Composes the Weir subsystems into a running full node:
//! - [`storage::RocksStore`] — persistent block index and checkpoint
//!   metadata backed by RocksDB
//! - [`node::Node`] — header acceptance wired to the checkpoint engine
//! - [`rpc`] — JSON-RPC server for external access
//! - [`config::NodeConfig`] — node configuration

pub mod config;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use node::{HeaderStatus, Node};
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
