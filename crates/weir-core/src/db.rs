//! Checkpoint persistence interface and in-memory implementation.
//!
//! The block database owns two pieces of checkpoint state that must
//! survive restarts: the accepted sync-checkpoint hash and the master
//! public key last seen by this node (so a key rotation can be detected at
//! startup). [`MemoryCheckpointDb`] is suitable for testing; the
//! production node uses RocksDB (weir-node).

use parking_lot::Mutex;

use crate::error::StoreError;
use crate::types::Hash256;

/// Durable checkpoint state, write-through semantics.
///
/// `write_*` stages a value; [`sync`](CheckpointDb::sync) commits staged
/// writes to disk. Callers treat a failure in either as a persistence
/// failure and leave their in-memory state untouched.
pub trait CheckpointDb: Send + Sync {
    /// The master public key recorded by a previous run, if any.
    fn read_checkpoint_pubkey(&self) -> Result<Option<Vec<u8>>, StoreError>;

    /// Record the active master public key.
    fn write_checkpoint_pubkey(&self, key: &[u8]) -> Result<(), StoreError>;

    /// The accepted sync-checkpoint hash recorded by a previous run, if any.
    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StoreError>;

    /// Record the accepted sync-checkpoint hash.
    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StoreError>;

    /// Commit staged writes to disk.
    fn sync(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
struct MemoryDbState {
    pubkey: Option<Vec<u8>>,
    checkpoint: Option<Hash256>,
    syncs: u64,
}

/// In-memory checkpoint database for testing. No durability.
#[derive(Default)]
pub struct MemoryCheckpointDb {
    state: Mutex<MemoryDbState>,
}

impl MemoryCheckpointDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `sync` has been called.
    pub fn sync_count(&self) -> u64 {
        self.state.lock().syncs
    }
}

impl CheckpointDb for MemoryCheckpointDb {
    fn read_checkpoint_pubkey(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.state.lock().pubkey.clone())
    }

    fn write_checkpoint_pubkey(&self, key: &[u8]) -> Result<(), StoreError> {
        self.state.lock().pubkey = Some(key.to_vec());
        Ok(())
    }

    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StoreError> {
        Ok(self.state.lock().checkpoint)
    }

    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StoreError> {
        self.state.lock().checkpoint = Some(*hash);
        Ok(())
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.state.lock().syncs += 1;
        Ok(())
    }
}
