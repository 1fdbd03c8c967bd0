//! Policy probes against the synchronized checkpoint.
//!
//! These hooks are called from the host node's block acceptance and
//! staking paths: gating new chain work against the checkpointed line,
//! automatic checkpoint selection by depth, and maturity/age probes used
//! to decide whether the checkpoint is still protecting recent history.

use tracing::error;

use weir_core::chain::BlockIndexEntry;
use weir_core::constants::{COINBASE_MATURITY, STAKE_MIN_AGE};
use weir_core::error::CheckpointError;
use weir_core::traits::PeerLink;
use weir_core::types::Hash256;

use crate::engine::CheckpointEngine;

impl CheckpointEngine {
    /// Gate for block acceptance: new chain work must either extend the
    /// checkpointed line or predate the checkpoint.
    ///
    /// `parent` is the index entry the new block builds on; the block
    /// itself is not indexed yet.
    pub fn check_block(
        &self,
        block_hash: &Hash256,
        parent: &BlockIndexEntry,
    ) -> Result<bool, CheckpointError> {
        let height = parent.height + 1;
        let st = self.state.lock();
        let sync = self.sync_entry(&st)?;

        if height > sync.height {
            // Trace the parent back to the checkpoint height; only a
            // descendant of the checkpoint may pass.
            let at = self.ancestor_at(parent.clone(), sync.height)?;
            if at.hash != st.accepted {
                return Ok(false);
            }
        }
        if height == sync.height && *block_hash != st.accepted {
            return Ok(false);
        }
        if height < sync.height && !self.chain.contains(block_hash) {
            return Ok(false);
        }
        Ok(true)
    }

    /// Select a checkpoint `depth` blocks behind the current tip.
    ///
    /// A depth of 0 picks the tip itself. Negative depths mean automatic
    /// selection is disabled; callers do not invoke this hook then.
    pub fn auto_select(&self, depth: i64) -> Hash256 {
        let best = self.chain.best();
        let mut entry = best.clone();
        while entry.height as i64 + depth > best.height as i64 {
            match self.chain.lookup(&entry.parent) {
                Some(parent) => entry = parent,
                None => break,
            }
        }
        entry.hash
    }

    /// Whether the checkpoint has aged past the maturity window: the chain
    /// has grown `COINBASE_MATURITY` blocks beyond it, or its block is
    /// older than the minimum stake age.
    pub fn is_mature(&self, now: u64) -> Result<bool, CheckpointError> {
        let st = self.state.lock();
        let sync = self.sync_entry(&st)?;
        Ok(self.chain.best().height >= sync.height + COINBASE_MATURITY
            || sync.timestamp + STAKE_MIN_AGE < now)
    }

    /// Whether the checkpointed block is older than `seconds`.
    pub fn is_too_old(&self, seconds: u64, now: u64) -> Result<bool, CheckpointError> {
        let st = self.state.lock();
        let sync = self.sync_entry(&st)?;
        Ok(sync.timestamp + seconds < now)
    }

    /// Resolve the deepest missing ancestor of an orphan chain: walk the
    /// orphan pool upward from `orphan_hash` and return the first parent
    /// hash that is not itself orphaned.
    pub fn wanted_by_orphan(&self, orphan_hash: &Hash256) -> Option<Hash256> {
        let mut prev = self.chain.orphan_prev(orphan_hash)?;
        while let Some(earlier) = self.chain.orphan_prev(&prev) {
            prev = earlier;
        }
        Some(prev)
    }

    /// Re-request the pending checkpoint block from a peer when it is
    /// neither indexed nor in the orphan pool. Called on peer connect.
    pub fn ask_for_pending(&self, peer: &dyn PeerLink) {
        let st = self.state.lock();
        if st.pending.is_zero() {
            return;
        }
        if self.chain.contains(&st.pending) || self.chain.contains_orphan(&st.pending) {
            return;
        }
        peer.ask_for_block(&st.pending);
    }

    /// Resolve the index entry of the accepted checkpoint; its absence is
    /// index corruption.
    fn sync_entry(
        &self,
        st: &crate::store::CheckpointState,
    ) -> Result<BlockIndexEntry, CheckpointError> {
        self.chain.lookup(&st.accepted).ok_or_else(|| {
            error!(
                checkpoint = %st.accepted,
                "block index missing entry for current sync-checkpoint"
            );
            CheckpointError::Structural(format!(
                "block index missing current sync-checkpoint {}",
                st.accepted
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MasterKey;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;
    use weir_core::chain::{BlockTree, SharedBlockTree};
    use weir_core::constants::NetworkType;
    use weir_core::db::MemoryCheckpointDb;
    use weir_core::genesis;
    use weir_core::traits::{ChainView, CheckpointRelay};
    use weir_core::types::{BlockHeader, SignedCheckpoint};

    struct NullRelay;

    impl CheckpointRelay for NullRelay {
        fn relay_checkpoint(&self, _msg: &SignedCheckpoint) {}
    }

    fn test_master_key() -> MasterKey {
        let mut hex_scalar = "00".repeat(31);
        hex_scalar.push_str("01");
        MasterKey::from_hex(&hex_scalar).unwrap()
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

    fn engine_over(tree: &SharedBlockTree) -> CheckpointEngine {
        CheckpointEngine::new(
            NetworkType::Mainnet,
            Arc::new(tree.clone()),
            Arc::new(MemoryCheckpointDb::new()),
            Arc::new(NullRelay),
            test_master_key().pubkey(),
            true,
        )
        .unwrap()
    }

    /// Build a main chain of `n` blocks over genesis, returning the headers.
    fn extend_chain(tree: &SharedBlockTree, n: u64) -> Vec<BlockHeader> {
        let mut headers = Vec::new();
        let mut prev = genesis::genesis_hash();
        for i in 0..n {
            let h = header(prev, i + 1);
            prev = h.hash();
            tree.write().insert(&h).unwrap();
            headers.push(h);
        }
        headers
    }

    // ------------------------------------------------------------------
    // check_block
    // ------------------------------------------------------------------

    #[test]
    fn check_block_accepts_descendant_of_checkpoint() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 2);
        let key = test_master_key();
        engine
            .process(&key.sign(&chain[0].hash()).unwrap(), None)
            .unwrap();

        // A block extending the tip descends from the checkpoint at height 1.
        let parent = tree.lookup(&chain[1].hash()).unwrap();
        let new_block = header(chain[1].hash(), 99);
        assert!(engine.check_block(&new_block.hash(), &parent).unwrap());
    }

    #[test]
    fn check_block_rejects_fork_below_checkpoint() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 2);
        let key = test_master_key();
        engine
            .process(&key.sign(&chain[1].hash()).unwrap(), None)
            .unwrap();

        // A block building on genesis would fork around the checkpoint at
        // height 2.
        let parent = tree.lookup(&genesis::genesis_hash()).unwrap();
        let fork = header(genesis::genesis_hash(), 99);
        assert!(!engine.check_block(&fork.hash(), &parent).unwrap());
    }

    #[test]
    fn check_block_same_height_must_be_the_checkpoint() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 1);
        let key = test_master_key();
        engine
            .process(&key.sign(&chain[0].hash()).unwrap(), None)
            .unwrap();

        let parent = tree.lookup(&genesis::genesis_hash()).unwrap();
        // Re-announcing the checkpoint block itself is fine.
        assert!(engine.check_block(&chain[0].hash(), &parent).unwrap());
        // A sibling at the checkpoint height is not.
        let sibling = header(genesis::genesis_hash(), 99);
        assert!(!engine.check_block(&sibling.hash(), &parent).unwrap());
    }

    #[test]
    fn check_block_below_checkpoint_requires_known_block() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 3);
        let key = test_master_key();
        engine
            .process(&key.sign(&chain[2].hash()).unwrap(), None)
            .unwrap();

        let parent = tree.lookup(&chain[0].hash()).unwrap();
        // chain[1] is already indexed: passes.
        assert!(engine.check_block(&chain[1].hash(), &parent).unwrap());
        // An unknown sibling below the checkpoint: rejected.
        let unknown = header(chain[0].hash(), 99);
        assert!(!engine.check_block(&unknown.hash(), &parent).unwrap());
    }

    // ------------------------------------------------------------------
    // auto_select
    // ------------------------------------------------------------------

    #[test]
    fn auto_select_zero_depth_picks_tip() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 5);
        assert_eq!(engine.auto_select(0), chain[4].hash());
    }

    #[test]
    fn auto_select_walks_back_by_depth() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let chain = extend_chain(&tree, 5);
        assert_eq!(engine.auto_select(2), chain[2].hash());
        assert_eq!(engine.auto_select(4), chain[0].hash());
    }

    #[test]
    fn auto_select_deep_depth_stops_at_genesis() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        extend_chain(&tree, 3);
        assert_eq!(engine.auto_select(100), genesis::genesis_hash());
    }

    #[test]
    fn auto_select_on_empty_chain_picks_genesis() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        assert_eq!(engine.auto_select(0), genesis::genesis_hash());
        assert_eq!(engine.auto_select(10), genesis::genesis_hash());
    }

    // ------------------------------------------------------------------
    // Maturity and age
    // ------------------------------------------------------------------

    #[test]
    fn is_mature_by_block_depth() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        // Checkpoint is genesis; the chain must outgrow it by
        // COINBASE_MATURITY blocks.
        extend_chain(&tree, COINBASE_MATURITY);
        let now = genesis::GENESIS_TIMESTAMP;
        assert!(engine.is_mature(now).unwrap());
    }

    #[test]
    fn is_mature_by_age() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let now = genesis::GENESIS_TIMESTAMP + STAKE_MIN_AGE + 1;
        assert!(engine.is_mature(now).unwrap());
    }

    #[test]
    fn is_not_mature_when_young_and_shallow() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        extend_chain(&tree, 2);
        let now = genesis::GENESIS_TIMESTAMP + 60;
        assert!(!engine.is_mature(now).unwrap());
    }

    #[test]
    fn is_too_old_boundaries() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let ts = genesis::GENESIS_TIMESTAMP;
        assert!(!engine.is_too_old(3600, ts + 3600).unwrap());
        assert!(engine.is_too_old(3600, ts + 3601).unwrap());
    }

    // ------------------------------------------------------------------
    // wanted_by_orphan / ask_for_pending
    // ------------------------------------------------------------------

    #[test]
    fn wanted_by_orphan_finds_missing_root() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);
        let b3 = header(b2.hash(), 3);
        tree.write().add_orphan(b2.clone());
        tree.write().add_orphan(b3.clone());

        // The chain of orphans b3 -> b2 resolves to the unreceived b1.
        assert_eq!(engine.wanted_by_orphan(&b3.hash()), Some(b1.hash()));
        assert_eq!(engine.wanted_by_orphan(&b2.hash()), Some(b1.hash()));
        // Not an orphan at all.
        assert_eq!(engine.wanted_by_orphan(&b1.hash()), None);
    }

    #[test]
    fn wanted_by_orphan_result_is_not_orphaned() {
        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let b1 = header(genesis::genesis_hash(), 1);
        let b2 = header(b1.hash(), 2);
        tree.write().add_orphan(b2.clone());

        let root = engine.wanted_by_orphan(&b2.hash()).unwrap();
        assert!(!tree.contains_orphan(&root));
    }

    #[test]
    fn ask_for_pending_requests_missing_block() {
        #[derive(Default)]
        struct RecordingPeer {
            asked: PlMutex<Vec<Hash256>>,
        }
        impl PeerLink for RecordingPeer {
            fn ask_for_block(&self, hash: &Hash256) {
                self.asked.lock().push(*hash);
            }
            fn push_get_blocks(&self, _from: &Hash256, _to: &Hash256) {}
        }

        let tree = SharedBlockTree::new(BlockTree::new());
        let engine = engine_over(&tree);
        let key = test_master_key();
        let b1 = header(genesis::genesis_hash(), 1);

        // Nothing pending: no request.
        let peer = RecordingPeer::default();
        engine.ask_for_pending(&peer);
        assert!(peer.asked.lock().is_empty());

        // Pending and missing: requested.
        engine
            .process(&key.sign(&b1.hash()).unwrap(), None)
            .unwrap();
        engine.ask_for_pending(&peer);
        assert_eq!(peer.asked.lock().as_slice(), &[b1.hash()]);

        // Once the block shows up in the orphan pool the request stops.
        peer.asked.lock().clear();
        tree.write().add_orphan(b1);
        engine.ask_for_pending(&peer);
        assert!(peer.asked.lock().is_empty());
    }
}
