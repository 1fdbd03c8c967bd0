//! Full node composition.
//!
//! [`Node`] wires the in-memory block tree, RocksDB persistence, and the
//! checkpoint engine together. The header acceptance path runs the
//! checkpoint gates (hardened table, sync-checkpoint ancestry), connects
//! the header, drains any orphans it unblocks, and gives the checkpoint
//! engine a chance to promote its pending slot.
//!
//! Lock discipline: tree write locks are scoped and released before any
//! checkpoint engine call, because the engine takes its own mutex and then
//! reads (or reorganizes) the tree.

use std::sync::Arc;

use tracing::{debug, info, warn};

use weir_core::chain::{BlockIndexEntry, BlockTree, SharedBlockTree};
use weir_core::db::CheckpointDb;
use weir_core::error::{ChainError, StoreError, WeirError};
use weir_core::genesis;
use weir_core::hardened;
use weir_core::traits::{ChainView, CheckpointRelay, PeerLink};
use weir_core::types::{BlockHeader, Hash256, SignedCheckpoint};
use weir_checkpoint::{CheckpointEngine, ProcessOutcome};

use crate::config::NodeConfig;
use crate::storage::RocksStore;

/// Result of offering a header to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// Connected to the block index.
    Connected,
    /// Parent unknown; buffered in the orphan pool.
    Orphaned,
    /// Already indexed.
    Duplicate,
}

/// Adapter bridging the in-memory tree and RocksDB persistence to the
/// [`ChainView`] the checkpoint engine consumes.
///
/// Reorganizations flip main-chain flags in memory and persist the new
/// tip, so a restart reconstructs the same main chain.
struct NodeChainView {
    tree: SharedBlockTree,
    storage: Arc<RocksStore>,
}

impl ChainView for NodeChainView {
    fn lookup(&self, hash: &Hash256) -> Option<BlockIndexEntry> {
        self.tree.read().lookup(hash).cloned()
    }

    fn best(&self) -> BlockIndexEntry {
        self.tree.read().best_entry().clone()
    }

    fn set_best_chain(&self, hash: &Hash256) -> Result<(), ChainError> {
        self.tree.write().set_best_chain(hash)?;
        self.storage
            .write_best(hash)
            .map_err(|e| ChainError::ReorganizeFailed(e.to_string()))
    }

    fn contains_orphan(&self, hash: &Hash256) -> bool {
        self.tree.read().contains_orphan(hash)
    }

    fn orphan_prev(&self, hash: &Hash256) -> Option<Hash256> {
        self.tree.read().orphan_prev(hash)
    }
}

/// Relay placeholder used when no transport is wired in; the host embeds
/// the node and supplies a real fan-out.
struct LogRelay;

impl CheckpointRelay for LogRelay {
    fn relay_checkpoint(&self, msg: &SignedCheckpoint) {
        debug!(bytes = msg.msg.len(), "checkpoint message ready for relay");
    }
}

/// The full node: block tree, storage, and checkpoint engine.
pub struct Node {
    tree: SharedBlockTree,
    storage: Arc<RocksStore>,
    checkpoints: Arc<CheckpointEngine>,
    config: NodeConfig,
}

impl Node {
    /// Open a node with the default (log-only) relay.
    pub fn open(config: NodeConfig) -> Result<Arc<Self>, WeirError> {
        Self::open_with_relay(config, Arc::new(LogRelay))
    }

    /// Open storage, restore the block tree, and start the checkpoint
    /// engine. A fresh data directory starts from genesis.
    pub fn open_with_relay(
        config: NodeConfig,
        relay: Arc<dyn CheckpointRelay>,
    ) -> Result<Arc<Self>, WeirError> {
        let db_path = config.db_path();
        std::fs::create_dir_all(&db_path)
            .map_err(|e| StoreError::Backend(format!("create {}: {e}", db_path.display())))?;
        let storage = Arc::new(RocksStore::open(&db_path)?);

        let entries = storage.load_index()?;
        let tree = if entries.is_empty() {
            let tree = BlockTree::new();
            storage.put_index_entry(tree.best_entry())?;
            storage.write_best(&genesis::genesis_hash())?;
            tree
        } else {
            let best = storage.read_best()?.unwrap_or_else(genesis::genesis_hash);
            BlockTree::restore(entries, best)?
        };
        info!(
            blocks = tree.len(),
            tip = %tree.best_entry().hash,
            "block index loaded"
        );
        let tree = SharedBlockTree::new(tree);

        let chain: Arc<dyn ChainView> = Arc::new(NodeChainView {
            tree: tree.clone(),
            storage: Arc::clone(&storage),
        });
        let master_pubkey = config.master_pubkey().map_err(WeirError::Checkpoint)?;
        let checkpoints = Arc::new(CheckpointEngine::new(
            config.network,
            chain,
            Arc::clone(&storage) as Arc<dyn CheckpointDb>,
            relay,
            master_pubkey,
            config.checkpoint_enforce,
        )?);

        if let Some(key) = &config.checkpoint_key {
            checkpoints.set_master_key(key)?;
            info!("checkpoint master key installed; enforcement is on");
        }

        Ok(Arc::new(Self {
            tree,
            storage,
            checkpoints,
            config,
        }))
    }

    /// Offer a block header to the node.
    ///
    /// Runs the hardened and synchronized checkpoint gates, connects the
    /// header, then drains any orphans the new block unblocks.
    pub fn accept_header(&self, header: &BlockHeader) -> Result<HeaderStatus, WeirError> {
        let hash = header.hash();
        let parent = {
            let tree = self.tree.read();
            if tree.contains(&hash) {
                return Ok(HeaderStatus::Duplicate);
            }
            tree.lookup(&header.prev_hash).cloned()
        };

        let Some(parent) = parent else {
            let wanted = self.checkpoints.want_block(&hash);
            self.tree.write().add_orphan(header.clone());
            debug!(%hash, wanted_by_checkpoint = wanted, "orphan header buffered");
            return Ok(HeaderStatus::Orphaned);
        };

        self.connect_header(header, &hash, &parent)?;
        self.connect_unblocked_orphans(hash);
        Ok(HeaderStatus::Connected)
    }

    /// Connect a header whose parent is indexed.
    fn connect_header(
        &self,
        header: &BlockHeader,
        hash: &Hash256,
        parent: &BlockIndexEntry,
    ) -> Result<(), WeirError> {
        hardened::check(self.config.network, parent.height + 1, hash)?;
        if !self.checkpoints.check_block(hash, parent)? {
            warn!(%hash, "rejecting block that forks around the synchronized checkpoint");
            return Err(ChainError::CheckpointConflict(*hash).into());
        }

        let entry = self.tree.write().insert(header)?;
        self.storage.put_index_entry(&entry)?;
        self.storage
            .write_best(&self.tree.read().best_entry().hash)?;
        info!(height = entry.height, hash = %entry.hash, "connected header");

        if self.checkpoints.accept_pending()? {
            info!("pending sync-checkpoint accepted");
        }
        self.maybe_auto_checkpoint();
        Ok(())
    }

    /// Drain orphans whose missing ancestor chain just got connected.
    fn connect_unblocked_orphans(&self, connected: Hash256) {
        let mut parents = vec![connected];
        while let Some(parent_hash) = parents.pop() {
            let children = self.tree.write().take_orphan_children(&parent_hash);
            for child in children {
                let child_hash = child.hash();
                let Some(parent) = self.tree.read().lookup(&parent_hash).cloned() else {
                    continue;
                };
                match self.connect_header(&child, &child_hash, &parent) {
                    Ok(()) => parents.push(child_hash),
                    Err(e) => debug!(hash = %child_hash, %e, "dropping unconnectable orphan"),
                }
            }
        }
    }

    /// With a master key and a non-negative depth, follow the tip with
    /// automatically issued checkpoints.
    fn maybe_auto_checkpoint(&self) {
        if !self.checkpoints.is_master() || self.config.checkpoint_depth < 0 {
            return;
        }
        let target = self.checkpoints.auto_select(self.config.checkpoint_depth);
        if target == self.checkpoints.accepted() {
            return;
        }
        if let Err(e) = self.checkpoints.broadcast(target) {
            warn!(checkpoint = %target, %e, "automatic checkpoint broadcast failed");
        }
    }

    /// Hand an inbound checkpoint message to the engine.
    pub fn process_checkpoint(
        &self,
        msg: &SignedCheckpoint,
        from: Option<&dyn PeerLink>,
    ) -> Result<ProcessOutcome, WeirError> {
        Ok(self.checkpoints.process(msg, from)?)
    }

    // --- Query methods for RPC ---

    /// Current chain tip as `(height, block_hash)`.
    pub fn chain_tip(&self) -> (u64, Hash256) {
        let tree = self.tree.read();
        let tip = tree.best_entry();
        (tip.height, tip.hash)
    }

    /// Look up a block index entry by hash.
    pub fn lookup_entry(&self, hash: &Hash256) -> Option<BlockIndexEntry> {
        self.tree.read().lookup(hash).cloned()
    }

    /// The checkpoint engine.
    pub fn checkpoints(&self) -> &CheckpointEngine {
        &self.checkpoints
    }

    /// Node configuration reference.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weir_checkpoint::{MasterKey, RejectReason};

    /// Deterministic master key for tests.
    fn test_key() -> MasterKey {
        let mut hex_scalar = "00".repeat(31);
        hex_scalar.push_str("01");
        MasterKey::from_hex(&hex_scalar).unwrap()
    }

    /// Config whose checkpoint pubkey matches [`test_key`].
    fn test_config(dir: &tempfile::TempDir) -> NodeConfig {
        NodeConfig {
            data_dir: dir.path().to_path_buf(),
            checkpoint_pubkey: Some(hex::encode(test_key().pubkey().as_bytes())),
            ..NodeConfig::default()
        }
    }

    fn test_node() -> (Arc<Node>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::open(test_config(&dir)).unwrap();
        (node, dir)
    }

    fn header(prev: Hash256, nonce: u64) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: genesis::GENESIS_TIMESTAMP + 60 * (nonce + 1),
            bits: u64::MAX,
            nonce,
        }
    }

    // ------------------------------------------------------------------
    // Startup
    // ------------------------------------------------------------------

    #[test]
    fn node_starts_at_genesis() {
        let (node, _dir) = test_node();
        let (height, hash) = node.chain_tip();
        assert_eq!(height, 0);
        assert_eq!(hash, genesis::genesis_hash());
        assert_eq!(node.checkpoints().accepted(), genesis::genesis_hash());
    }

    #[test]
    fn master_key_in_config_makes_master() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        let mut hex_scalar = "00".repeat(31);
        hex_scalar.push_str("01");
        config.checkpoint_key = Some(hex_scalar);
        config.checkpoint_enforce = false;

        let node = Node::open(config).unwrap();
        assert!(node.checkpoints().is_master());
        // The master always enforces.
        assert!(node.checkpoints().is_enforced());
    }

    // ------------------------------------------------------------------
    // Header acceptance
    // ------------------------------------------------------------------

    #[test]
    fn accept_header_extends_chain() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        assert_eq!(node.accept_header(&b1).unwrap(), HeaderStatus::Connected);
        assert_eq!(node.chain_tip(), (1, b1.hash()));
    }

    #[test]
    fn accept_header_detects_duplicate() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        node.accept_header(&b1).unwrap();
        assert_eq!(node.accept_header(&b1).unwrap(), HeaderStatus::Duplicate);
    }

    #[test]
    fn orphan_buffered_then_connected() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);
        let b3 = header(b2.hash(), 3);

        assert_eq!(node.accept_header(&b3).unwrap(), HeaderStatus::Orphaned);
        assert_eq!(node.accept_header(&b2).unwrap(), HeaderStatus::Orphaned);
        // Connecting b1 pulls b2 and b3 out of the orphan pool.
        assert_eq!(node.accept_header(&b1).unwrap(), HeaderStatus::Connected);
        assert_eq!(node.chain_tip(), (3, b3.hash()));
    }

    // ------------------------------------------------------------------
    // Checkpoint wiring
    // ------------------------------------------------------------------

    #[test]
    fn inbound_checkpoint_advances_engine() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        node.accept_header(&b1).unwrap();

        let msg = test_key().sign(&b1.hash()).unwrap();
        let outcome = node.process_checkpoint(&msg, None).unwrap();
        assert_eq!(outcome, ProcessOutcome::Accepted);
        assert_eq!(node.checkpoints().accepted(), b1.hash());
    }

    #[test]
    fn pending_checkpoint_promoted_by_block_arrival() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);

        let msg = test_key().sign(&b2.hash()).unwrap();
        assert_eq!(
            node.process_checkpoint(&msg, None).unwrap(),
            ProcessOutcome::Pending
        );

        node.accept_header(&b1).unwrap();
        node.accept_header(&b2).unwrap();
        assert_eq!(node.checkpoints().accepted(), b2.hash());
        assert!(node.checkpoints().pending().is_zero());
    }

    #[test]
    fn checkpointed_line_blocks_deep_forks() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);
        node.accept_header(&b1).unwrap();
        node.accept_header(&b2).unwrap();

        let msg = test_key().sign(&b2.hash()).unwrap();
        node.process_checkpoint(&msg, None).unwrap();

        // A fork from genesis would unwind the checkpointed chain.
        let fork = header(genesis::genesis_hash(), 9);
        let err = node.accept_header(&fork).unwrap_err();
        assert!(matches!(
            err,
            WeirError::Chain(ChainError::CheckpointConflict(_))
        ));
        assert_eq!(node.chain_tip(), (2, b2.hash()));
    }

    #[test]
    fn conflicting_checkpoint_raises_warning() {
        let (node, _dir) = test_node();
        let b1 = header(genesis::genesis_hash(), 1);
        let fork = header(genesis::genesis_hash(), 9);
        node.accept_header(&b1).unwrap();
        node.accept_header(&fork).unwrap();

        node.process_checkpoint(&test_key().sign(&b1.hash()).unwrap(), None)
            .unwrap();
        let outcome = node
            .process_checkpoint(&test_key().sign(&fork.hash()).unwrap(), None)
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::Rejected(RejectReason::Conflict));
        assert!(!node.checkpoints().warning().is_empty());
        assert_eq!(node.checkpoints().last_invalid(), fork.hash());
    }

    #[test]
    fn auto_checkpoint_follows_tip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        let mut hex_scalar = "00".repeat(31);
        hex_scalar.push_str("01");
        config.checkpoint_key = Some(hex_scalar);
        config.checkpoint_depth = 0;
        let node = Node::open(config).unwrap();

        let b1 = header(genesis::genesis_hash(), 1);
        node.accept_header(&b1).unwrap();
        // Depth 0: the freshly connected tip gets checkpointed.
        assert_eq!(node.checkpoints().accepted(), b1.hash());
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    #[test]
    fn chain_and_checkpoint_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(&dir);
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);

        {
            let node = Node::open(config.clone()).unwrap();
            node.accept_header(&b1).unwrap();
            node.accept_header(&b2).unwrap();
            node.process_checkpoint(&test_key().sign(&b1.hash()).unwrap(), None)
                .unwrap();
        }

        let node = Node::open(config).unwrap();
        assert_eq!(node.chain_tip(), (2, b2.hash()));
        assert_eq!(node.checkpoints().accepted(), b1.hash());
        let entry = node.lookup_entry(&b1.hash()).unwrap();
        assert!(entry.in_main_chain);
    }
}
