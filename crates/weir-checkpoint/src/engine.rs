//! The synchronized checkpoint engine.
//!
//! Owns the checkpoint store behind a single mutex and drives every state
//! transition: signature verification, ancestry validation against the
//! live block index, pending-checkpoint buffering, the enforced
//! reorganization, persistence, and relay. The mutex is held for the whole
//! of each operation — including `set_best_chain` and the database sync —
//! so a second inbound message can never observe a half-finished
//! transition.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use weir_core::chain::BlockIndexEntry;
use weir_core::constants::NetworkType;
use weir_core::db::CheckpointDb;
use weir_core::error::CheckpointError;
use weir_core::genesis;
use weir_core::hardened;
use weir_core::traits::{ChainView, CheckpointRelay, PeerLink};
use weir_core::types::{Hash256, SignedCheckpoint};

use crate::crypto::{MasterKey, MasterPubkey};
use crate::store::{CheckpointState, CheckpointStatus};

/// Validator decision for a candidate checkpoint hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// The candidate descends from the accepted checkpoint: adopt it.
    Advance,
    /// The candidate is an ancestor of the accepted checkpoint: old news.
    IgnoreStale,
    /// The candidate is on a different ancestry line entirely.
    Conflict,
    /// The candidate's block is not in the index yet.
    Unknown,
}

/// Why an inbound checkpoint message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    BadSignature,
    BadPayload,
    Stale,
    Conflict,
}

/// Outcome of processing an inbound signed checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Adopted as the new accepted checkpoint.
    Accepted,
    /// Buffered: the named block has not been received yet.
    Pending,
    /// Discarded.
    Rejected(RejectReason),
}

/// The checkpoint subsystem.
///
/// One per process. Collaborators — the block index, the checkpoint
/// database, and the peer surface — are supplied as trait objects and
/// re-queried on every operation; the engine itself owns nothing but the
/// checkpoint store.
pub struct CheckpointEngine {
    network: NetworkType,
    pub(crate) chain: Arc<dyn ChainView>,
    db: Arc<dyn CheckpointDb>,
    relay: Arc<dyn CheckpointRelay>,
    master_pubkey: MasterPubkey,
    pub(crate) state: Mutex<CheckpointState>,
}

impl CheckpointEngine {
    /// Build the engine and run its startup lifecycle: restore the
    /// persisted accepted checkpoint (defaulting to genesis) and detect a
    /// master public key rotation, which resets the checkpoint to the
    /// latest hardened block.
    pub fn new(
        network: NetworkType,
        chain: Arc<dyn ChainView>,
        db: Arc<dyn CheckpointDb>,
        relay: Arc<dyn CheckpointRelay>,
        master_pubkey: MasterPubkey,
        enforce: bool,
    ) -> Result<Self, CheckpointError> {
        let engine = Self {
            network,
            chain,
            db,
            relay,
            master_pubkey,
            state: Mutex::new(CheckpointState::new(enforce)),
        };
        engine.restore()?;
        engine.check_pubkey()?;
        Ok(engine)
    }

    /// Restore the accepted checkpoint recorded by a previous run.
    fn restore(&self) -> Result<(), CheckpointError> {
        let stored = self.db.read_sync_checkpoint()?;
        let mut st = self.state.lock();
        match stored {
            Some(hash) => {
                debug!(checkpoint = %hash, "restored sync-checkpoint");
                st.accepted = hash;
            }
            None => self.persist_accepted(&mut st, genesis::genesis_hash())?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Snapshot of the checkpoint store.
    pub fn status(&self) -> CheckpointStatus {
        self.state.lock().status()
    }

    /// The accepted sync-checkpoint hash.
    pub fn accepted(&self) -> Hash256 {
        self.state.lock().accepted
    }

    /// The pending checkpoint hash, zero when the slot is empty.
    pub fn pending(&self) -> Hash256 {
        self.state.lock().pending
    }

    /// The current operator warning, empty when none.
    pub fn warning(&self) -> String {
        self.state.lock().warning.clone()
    }

    /// The most recent conflicting checkpoint hash.
    pub fn last_invalid(&self) -> Hash256 {
        self.state.lock().last_invalid
    }

    /// Whether accepted checkpoints force a reorganization.
    pub fn is_enforced(&self) -> bool {
        self.state.lock().is_enforced()
    }

    /// Whether this node holds the master private key.
    pub fn is_master(&self) -> bool {
        self.state.lock().master_key.is_some()
    }

    /// Flip the operator enforcement flag.
    pub fn set_enforce(&self, on: bool) {
        self.state.lock().set_enforce(on);
    }

    /// The master public key this engine verifies against.
    pub fn master_pubkey(&self) -> &MasterPubkey {
        &self.master_pubkey
    }

    // ------------------------------------------------------------------
    // Validator
    // ------------------------------------------------------------------

    /// Walk parent pointers until `entry` is at `height`.
    ///
    /// A missing parent below a non-zero height means the index is
    /// corrupt; that is reported, never papered over.
    pub(crate) fn ancestor_at(
        &self,
        mut entry: BlockIndexEntry,
        height: u64,
    ) -> Result<BlockIndexEntry, CheckpointError> {
        while entry.height > height {
            entry = self.chain.lookup(&entry.parent).ok_or_else(|| {
                error!(
                    block = %entry.hash,
                    parent = %entry.parent,
                    "null parent during ancestor walk"
                );
                CheckpointError::Structural(format!(
                    "missing parent {} below block {}",
                    entry.parent, entry.hash
                ))
            })?;
        }
        Ok(entry)
    }

    /// Decide what a candidate checkpoint means relative to the accepted
    /// one. Only forward movement along the accepted ancestry line is
    /// allowed; anything off that line is a conflict.
    fn validate(
        &self,
        st: &CheckpointState,
        candidate: &Hash256,
    ) -> Result<Validation, CheckpointError> {
        let accepted = self.chain.lookup(&st.accepted).ok_or_else(|| {
            error!(
                checkpoint = %st.accepted,
                "block index missing entry for current sync-checkpoint"
            );
            CheckpointError::Structural(format!(
                "block index missing current sync-checkpoint {}",
                st.accepted
            ))
        })?;
        let recv = match self.chain.lookup(candidate) {
            Some(entry) => entry,
            None => return Ok(Validation::Unknown),
        };

        if recv.height <= accepted.height {
            // Trace the current checkpoint back to the candidate's height;
            // the candidate is merely stale only if it lies on our line.
            let at = self.ancestor_at(accepted, recv.height)?;
            if at.hash != *candidate {
                return Ok(Validation::Conflict);
            }
            return Ok(Validation::IgnoreStale);
        }

        // The candidate is higher: it must descend from the accepted
        // checkpoint.
        let at = self.ancestor_at(recv, accepted.height)?;
        if at.hash != st.accepted {
            return Ok(Validation::Conflict);
        }
        Ok(Validation::Advance)
    }

    // ------------------------------------------------------------------
    // Acceptance
    // ------------------------------------------------------------------

    /// Process an inbound signed checkpoint message.
    ///
    /// `from` is the peer that delivered the message, asked to supply the
    /// named block when we do not have it yet. Pass `None` for
    /// locally-originated messages.
    pub fn process(
        &self,
        signed: &SignedCheckpoint,
        from: Option<&dyn PeerLink>,
    ) -> Result<ProcessOutcome, CheckpointError> {
        let unsigned = match self.master_pubkey.verify(signed) {
            Ok(unsigned) => unsigned,
            Err(CheckpointError::BadSignature) => {
                warn!("discarding checkpoint message with bad signature");
                return Ok(ProcessOutcome::Rejected(RejectReason::BadSignature));
            }
            Err(CheckpointError::BadPayload(e)) => {
                warn!(%e, "discarding undecodable checkpoint message");
                return Ok(ProcessOutcome::Rejected(RejectReason::BadPayload));
            }
            Err(e) => return Err(e),
        };
        let candidate = unsigned.checkpoint_hash;

        let mut st = self.state.lock();
        match self.validate(&st, &candidate)? {
            Validation::Unknown => {
                // We have not received the checkpointed block; keep the
                // message as pending and ask the sender to fill the gap.
                st.stage_pending(candidate, Some(signed.clone()));
                info!(checkpoint = %candidate, "sync-checkpoint pending, block not yet received");
                if let Some(peer) = from {
                    peer.push_get_blocks(&self.chain.best().hash, &candidate);
                    // Ask for the block directly as well; the locator
                    // request may miss it if it was rejected earlier as a
                    // duplicate stake.
                    let ask = if self.chain.contains_orphan(&candidate) {
                        self.wanted_by_orphan(&candidate).unwrap_or(candidate)
                    } else {
                        candidate
                    };
                    peer.ask_for_block(&ask);
                }
                Ok(ProcessOutcome::Pending)
            }
            Validation::IgnoreStale => {
                debug!(checkpoint = %candidate, "ignoring stale sync-checkpoint");
                Ok(ProcessOutcome::Rejected(RejectReason::Stale))
            }
            Validation::Conflict => {
                st.record_conflict(candidate);
                error!(
                    checkpoint = %candidate,
                    current = %st.accepted,
                    "conflicting sync-checkpoint received"
                );
                Ok(ProcessOutcome::Rejected(RejectReason::Conflict))
            }
            Validation::Advance => {
                self.adopt(&mut st, candidate, Some(signed.clone()))?;
                Ok(ProcessOutcome::Accepted)
            }
        }
    }

    /// Try to promote the pending checkpoint after a block arrival.
    ///
    /// Returns true when the pending checkpoint became the accepted one.
    pub fn accept_pending(&self) -> Result<bool, CheckpointError> {
        let mut st = self.state.lock();
        if st.pending.is_zero() || !self.chain.contains(&st.pending) {
            return Ok(false);
        }
        let pending = st.pending;

        match self.validate(&st, &pending)? {
            Validation::Advance => {}
            Validation::Conflict => {
                st.record_conflict(pending);
                error!(checkpoint = %pending, "pending sync-checkpoint conflicts, dropping");
                st.clear_pending();
                return Ok(false);
            }
            _ => {
                st.clear_pending();
                return Ok(false);
            }
        }

        let msg = st.pending_msg.clone();
        self.adopt(&mut st, pending, msg)?;
        Ok(true)
    }

    /// Advance the accepted checkpoint to `candidate`: reorganize if
    /// enforcing and the block is off the main chain, persist, promote the
    /// message, then relay. The pending slot drains on success.
    fn adopt(
        &self,
        st: &mut CheckpointState,
        candidate: Hash256,
        msg: Option<SignedCheckpoint>,
    ) -> Result<(), CheckpointError> {
        let entry = self.chain.lookup(&candidate).ok_or_else(|| {
            CheckpointError::Structural(format!("candidate {candidate} vanished from block index"))
        })?;

        if st.is_enforced() && !entry.in_main_chain {
            if let Err(e) = self.chain.set_best_chain(&candidate) {
                st.last_invalid = candidate;
                error!(checkpoint = %candidate, %e, "reorganize to sync-checkpoint failed");
                return Err(CheckpointError::ReorgFailed(candidate));
            }
        }

        self.persist_accepted(st, candidate)?;
        st.current_msg = msg;
        st.clear_pending();
        info!(checkpoint = %candidate, "sync-checkpoint accepted");

        if let Some(message) = &st.current_msg {
            self.relay.relay_checkpoint(message);
        }
        Ok(())
    }

    /// Write-through: the database write and sync come first; the
    /// in-memory accepted hash only changes once the write is durable.
    fn persist_accepted(
        &self,
        st: &mut CheckpointState,
        hash: Hash256,
    ) -> Result<(), CheckpointError> {
        self.db.write_sync_checkpoint(&hash)?;
        self.db.sync()?;
        st.accepted = hash;
        Ok(())
    }

    /// Whether the block-reception path should prioritize `hash` because
    /// the pending checkpoint needs it.
    pub fn want_block(&self, hash: &Hash256) -> bool {
        let st = self.state.lock();
        if st.pending.is_zero() {
            return false;
        }
        if *hash == st.pending {
            return true;
        }
        self.chain.contains_orphan(&st.pending)
            && self.wanted_by_orphan(&st.pending) == Some(*hash)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Detect a master public key rotation.
    ///
    /// When the key recorded in the database differs from the active one
    /// (or is absent), record the new key and reset the sync-checkpoint to
    /// the latest hardened block.
    pub fn check_pubkey(&self) -> Result<(), CheckpointError> {
        let stored = self.db.read_checkpoint_pubkey()?;
        if stored.as_deref() == Some(self.master_pubkey.as_bytes()) {
            return Ok(());
        }
        info!("checkpoint master public key changed, resetting sync-checkpoint");
        self.db.write_checkpoint_pubkey(self.master_pubkey.as_bytes())?;
        self.db.sync()?;
        self.reset()
    }

    /// Reset the sync-checkpoint to the latest hardened checkpoint.
    ///
    /// If the hardened block is known but off the main chain, reorganize
    /// onto it. If it has not been received, stage it as pending with no
    /// message; a later [`accept_pending`](Self::accept_pending) adopts it
    /// when the block arrives. The persisted checkpoint becomes the
    /// hardened hash when usable, genesis otherwise.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        let mut st = self.state.lock();
        let hard = hardened::latest(self.network);

        match self.chain.lookup(&hard) {
            Some(entry) if !entry.in_main_chain => {
                info!(checkpoint = %hard, "reorganizing to hardened checkpoint");
                self.chain.set_best_chain(&hard).map_err(|e| {
                    error!(checkpoint = %hard, %e, "reorganize to hardened checkpoint failed");
                    CheckpointError::ReorgFailed(hard)
                })?;
            }
            None => {
                st.stage_pending(hard, None);
                info!(checkpoint = %hard, "hardened checkpoint not yet received, staged as pending");
            }
            Some(_) => {}
        }

        let target = match self.chain.lookup(&hard) {
            Some(entry) if entry.in_main_chain => hard,
            _ => genesis::genesis_hash(),
        };
        self.persist_accepted(&mut st, target)?;
        info!(checkpoint = %st.accepted, "sync-checkpoint reset");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Master side
    // ------------------------------------------------------------------

    /// Install the master private key, turning this node into the
    /// checkpoint master. The key is proven by signing a throwaway
    /// checkpoint over genesis before it is kept.
    pub fn set_master_key(&self, hex_key: &str) -> Result<(), CheckpointError> {
        let key = MasterKey::from_hex(hex_key)?;
        key.sign(&genesis::genesis_hash())?;
        self.state.lock().master_key = Some(key);
        Ok(())
    }

    /// Sign and adopt a checkpoint naming `hash`, then relay it.
    ///
    /// The master runs the exact same `process` pipeline as every other
    /// node, so an operator mistake is caught locally before it spreads.
    pub fn broadcast(&self, hash: Hash256) -> Result<(), CheckpointError> {
        let key = self
            .state
            .lock()
            .master_key
            .clone()
            .ok_or(CheckpointError::NoMasterKey)?;
        let signed = key.sign(&hash)?;
        match self.process(&signed, None)? {
            ProcessOutcome::Accepted => Ok(()),
            outcome => {
                warn!(checkpoint = %hash, ?outcome, "failed to process outbound checkpoint");
                Err(CheckpointError::NotAccepted(hash))
            }
        }
    }
}
