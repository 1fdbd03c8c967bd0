//! Trait interfaces between the checkpoint subsystem and its host node.
//!
//! - [`ChainView`] — the live block index and best-chain setter (the chain
//!   layer implements; [`SharedBlockTree`](crate::chain::SharedBlockTree)
//!   is the in-process implementation)
//! - [`CheckpointRelay`] — fan-out of checkpoint messages to all peers
//! - [`PeerLink`] — requests addressed to a single peer, used to pull in
//!   the block a pending checkpoint is waiting for

use crate::chain::BlockIndexEntry;
use crate::error::ChainError;
use crate::types::{Hash256, SignedCheckpoint};

/// Read access to the block index, plus the reorganization entry point.
///
/// Implementations must be cheap to query: the checkpoint validator walks
/// parent pointers one `lookup` at a time and never caches entries.
pub trait ChainView: Send + Sync {
    /// Resolve an index entry by block hash.
    fn lookup(&self, hash: &Hash256) -> Option<BlockIndexEntry>;

    /// The current best-chain tip.
    fn best(&self) -> BlockIndexEntry;

    /// Reorganize so that `hash` becomes the best-chain tip.
    ///
    /// May perform disk I/O; the checkpoint engine calls this while holding
    /// its own mutex, so implementations must not call back into checkpoint
    /// operations.
    fn set_best_chain(&self, hash: &Hash256) -> Result<(), ChainError>;

    /// Whether the index contains `hash`.
    fn contains(&self, hash: &Hash256) -> bool {
        self.lookup(hash).is_some()
    }

    /// Whether the orphan pool holds `hash`.
    fn contains_orphan(&self, hash: &Hash256) -> bool;

    /// Parent hash of an orphaned header, if `hash` is orphaned.
    fn orphan_prev(&self, hash: &Hash256) -> Option<Hash256>;
}

/// Fan-out of a checkpoint message to every connected peer.
pub trait CheckpointRelay: Send + Sync {
    fn relay_checkpoint(&self, msg: &SignedCheckpoint);
}

/// Requests addressed to a single peer.
///
/// Used when a checkpoint names a block we have not received: the sender is
/// asked for the span from our tip to the checkpointed block, and for the
/// block itself.
pub trait PeerLink {
    /// Ask the peer for a specific block by hash.
    fn ask_for_block(&self, hash: &Hash256);

    /// Ask the peer for the blocks between `from` (our tip) and `to`.
    fn push_get_blocks(&self, from: &Hash256, to: &Hash256);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{BlockTree, SharedBlockTree};
    use parking_lot::Mutex;

    // ------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------

    struct NullRelay;

    impl CheckpointRelay for NullRelay {
        fn relay_checkpoint(&self, _msg: &SignedCheckpoint) {}
    }

    #[derive(Default)]
    struct RecordingPeer {
        asked: Mutex<Vec<Hash256>>,
        spans: Mutex<Vec<(Hash256, Hash256)>>,
    }

    impl PeerLink for RecordingPeer {
        fn ask_for_block(&self, hash: &Hash256) {
            self.asked.lock().push(*hash);
        }

        fn push_get_blocks(&self, from: &Hash256, to: &Hash256) {
            self.spans.lock().push((*from, *to));
        }
    }

    // ------------------------------------------------------------------
    // Object safety: verify each trait is dyn-compatible
    // ------------------------------------------------------------------

    fn _assert_chain_view_object_safe(cv: &dyn ChainView) {
        let _ = cv.best();
    }

    fn _assert_relay_object_safe(r: &dyn CheckpointRelay) {
        let _ = r;
    }

    fn _assert_peer_link_object_safe(p: &dyn PeerLink) {
        let _ = p;
    }

    #[test]
    fn chain_view_contains_default_impl() {
        let shared = SharedBlockTree::new(BlockTree::new());
        let view: &dyn ChainView = &shared;
        assert!(view.contains(&crate::genesis::genesis_hash()));
        assert!(!view.contains(&Hash256([0xAB; 32])));
    }

    #[test]
    fn recording_peer_captures_requests() {
        let peer = RecordingPeer::default();
        let link: &dyn PeerLink = &peer;
        link.ask_for_block(&Hash256([1; 32]));
        link.push_get_blocks(&Hash256([2; 32]), &Hash256([3; 32]));

        assert_eq!(peer.asked.lock().as_slice(), &[Hash256([1; 32])]);
        assert_eq!(
            peer.spans.lock().as_slice(),
            &[(Hash256([2; 32]), Hash256([3; 32]))]
        );
    }

    #[test]
    fn null_relay_is_a_relay() {
        let relay: &dyn CheckpointRelay = &NullRelay;
        relay.relay_checkpoint(&SignedCheckpoint {
            msg: vec![],
            sig: vec![],
        });
    }
}
