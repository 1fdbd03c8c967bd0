//! Checkpoint store state.
//!
//! Process-wide checkpoint facts: the accepted hash, the pending slot, the
//! last conflicting hash, the operator warning, and the enforcement flag.
//! The whole struct lives behind the engine's single mutex — every
//! read-modify-write in the subsystem is serialized through it.

use weir_core::types::{Hash256, SignedCheckpoint};

use crate::crypto::MasterKey;

/// Mutable checkpoint state, guarded by [`CheckpointEngine`](crate::engine::CheckpointEngine)'s mutex.
///
/// The checkpoint slot is always in one of three states:
/// empty (`pending == 0`), pending (`pending != 0`), or accepted (the
/// pending slot drained into `accepted`). A pending slot with no message is
/// legitimate: it marks a reset target awaiting its block.
pub(crate) struct CheckpointState {
    /// The accepted sync-checkpoint hash. Zero means none yet.
    pub accepted: Hash256,
    /// A validly signed checkpoint whose block has not arrived. Zero when
    /// the slot is empty.
    pub pending: Hash256,
    /// The signed message behind `pending`. `None` for a reset target.
    pub pending_msg: Option<SignedCheckpoint>,
    /// The message behind `accepted`, re-relayed to late peers.
    pub current_msg: Option<SignedCheckpoint>,
    /// The most recent conflicting checkpoint hash, for diagnostics.
    pub last_invalid: Hash256,
    /// Operator-facing warning, published through node status.
    pub warning: String,
    /// Whether accepted checkpoints force a reorganization.
    enforce: bool,
    /// The master private key, present only on the checkpoint master.
    pub master_key: Option<MasterKey>,
}

impl CheckpointState {
    pub fn new(enforce: bool) -> Self {
        Self {
            accepted: Hash256::ZERO,
            pending: Hash256::ZERO,
            pending_msg: None,
            current_msg: None,
            last_invalid: Hash256::ZERO,
            warning: String::new(),
            enforce,
            master_key: None,
        }
    }

    /// Effective enforcement: the operator flag, or unconditionally true on
    /// the master node.
    pub fn is_enforced(&self) -> bool {
        self.enforce || self.master_key.is_some()
    }

    /// Flip the operator enforcement flag. Turning enforcement on clears
    /// the fork warning.
    pub fn set_enforce(&mut self, on: bool) {
        if on {
            self.warning.clear();
        }
        self.enforce = on;
    }

    /// Stage a pending checkpoint, replacing any previous one.
    pub fn stage_pending(&mut self, hash: Hash256, msg: Option<SignedCheckpoint>) {
        self.pending = hash;
        self.pending_msg = msg;
    }

    /// Empty the pending slot.
    pub fn clear_pending(&mut self) {
        self.pending = Hash256::ZERO;
        self.pending_msg = None;
    }

    /// Record a conflicting checkpoint and raise the operator warning.
    pub fn record_conflict(&mut self, candidate: Hash256) {
        self.last_invalid = candidate;
        self.warning = format!(
            "WARNING: checkpoint {candidate} conflicts with the current sync-checkpoint {}; \
             the checkpoint master key may be compromised or misused",
            self.accepted
        );
    }

    /// Read-only snapshot for status surfaces.
    pub fn status(&self) -> CheckpointStatus {
        CheckpointStatus {
            accepted: self.accepted,
            pending: self.pending,
            last_invalid: self.last_invalid,
            warning: self.warning.clone(),
            enforced: self.is_enforced(),
            is_master: self.master_key.is_some(),
        }
    }
}

/// A consistent snapshot of the checkpoint store, taken under its mutex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointStatus {
    pub accepted: Hash256,
    pub pending: Hash256,
    pub last_invalid: Hash256,
    pub warning: String,
    pub enforced: bool,
    pub is_master: bool,
}
