//! Live block index and orphan pool.
//!
//! [`BlockTree`] is the in-memory block index: every accepted header keyed
//! by hash with parent linkage, height, timestamp, and a main-chain flag.
//! The checkpoint subsystem never holds references into the tree — all
//! traversals re-resolve entries by hash — so entry lifetimes stay the
//! chain layer's concern.
//!
//! Best-chain *selection* (stake weight comparison) lives outside this
//! crate; the tree only provides the mechanics: extending the tip on
//! insert and [`BlockTree::set_best_chain`] for an explicit switch, which
//! is what an enforced checkpoint uses to drag the node onto the
//! checkpointed branch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::error::ChainError;
use crate::genesis;
use crate::traits::ChainView;
use crate::types::{BlockHeader, Hash256};

/// A node in the block index tree.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockIndexEntry {
    /// This block's header hash.
    pub hash: Hash256,
    /// Hash of the parent block. Zero for genesis.
    pub parent: Hash256,
    /// Distance from genesis.
    pub height: u64,
    /// Block timestamp (Unix seconds).
    pub timestamp: u64,
    /// Whether this block currently lies on the best chain.
    pub in_main_chain: bool,
}

/// In-memory block index plus orphan pool.
///
/// A freshly created tree contains the genesis entry as its tip. Orphans
/// are headers whose parent has not been received; they sit in a side pool
/// until the parent arrives and are never part of the index proper.
#[derive(Debug)]
pub struct BlockTree {
    entries: HashMap<Hash256, BlockIndexEntry>,
    orphans: HashMap<Hash256, BlockHeader>,
    best: Hash256,
}

impl BlockTree {
    /// Create a tree containing only the genesis entry.
    pub fn new() -> Self {
        let header = genesis::genesis_header();
        let hash = genesis::genesis_hash();
        let mut entries = HashMap::new();
        entries.insert(
            hash,
            BlockIndexEntry {
                hash,
                parent: Hash256::ZERO,
                height: 0,
                timestamp: header.timestamp,
                in_main_chain: true,
            },
        );
        Self {
            entries,
            orphans: HashMap::new(),
            best: hash,
        }
    }

    /// Rebuild a tree from persisted entries.
    ///
    /// Main-chain flags are not trusted from storage; they are recomputed
    /// by marking the path from `best` back to genesis.
    pub fn restore(entries: Vec<BlockIndexEntry>, best: Hash256) -> Result<Self, ChainError> {
        let mut tree = Self::new();
        for entry in entries {
            tree.entries.insert(entry.hash, entry);
        }
        if !tree.entries.contains_key(&best) {
            return Err(ChainError::UnknownBlock(best));
        }
        tree.best = best;
        tree.remark_main_chain()?;
        Ok(tree)
    }

    /// Connect a header whose parent is already in the index.
    ///
    /// Extends the main chain when the parent is the current tip; otherwise
    /// the new entry starts life on a side chain and stays there until an
    /// explicit [`set_best_chain`](Self::set_best_chain).
    pub fn insert(&mut self, header: &BlockHeader) -> Result<BlockIndexEntry, ChainError> {
        let hash = header.hash();
        if self.entries.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash));
        }
        let parent = self
            .entries
            .get(&header.prev_hash)
            .ok_or(ChainError::UnknownParent(header.prev_hash))?
            .clone();

        let extends_tip = parent.hash == self.best;
        let entry = BlockIndexEntry {
            hash,
            parent: parent.hash,
            height: parent.height + 1,
            timestamp: header.timestamp,
            in_main_chain: extends_tip,
        };
        self.entries.insert(hash, entry.clone());
        if extends_tip {
            self.best = hash;
        }
        Ok(entry)
    }

    /// Look up an index entry by hash.
    pub fn lookup(&self, hash: &Hash256) -> Option<&BlockIndexEntry> {
        self.entries.get(hash)
    }

    /// Whether the index contains `hash`.
    pub fn contains(&self, hash: &Hash256) -> bool {
        self.entries.contains_key(hash)
    }

    /// The current best-chain tip.
    pub fn best_entry(&self) -> &BlockIndexEntry {
        self.entries
            .get(&self.best)
            .expect("tip entry is always indexed")
    }

    /// Number of indexed entries (including genesis).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether only genesis is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Make `hash` the best-chain tip, reflagging main-chain membership
    /// along the path back to genesis.
    pub fn set_best_chain(&mut self, hash: &Hash256) -> Result<(), ChainError> {
        if !self.entries.contains_key(hash) {
            return Err(ChainError::UnknownBlock(*hash));
        }
        self.best = *hash;
        self.remark_main_chain()
    }

    /// Recompute `in_main_chain` flags: exactly the path from the current
    /// tip down to genesis is main chain.
    fn remark_main_chain(&mut self) -> Result<(), ChainError> {
        let mut path = HashSet::new();
        let mut cursor = self
            .entries
            .get(&self.best)
            .ok_or(ChainError::UnknownBlock(self.best))?
            .clone();
        loop {
            path.insert(cursor.hash);
            if cursor.height == 0 {
                break;
            }
            cursor = self
                .entries
                .get(&cursor.parent)
                .ok_or(ChainError::BrokenIndex {
                    hash: cursor.parent,
                    height: cursor.height - 1,
                })?
                .clone();
        }
        for entry in self.entries.values_mut() {
            entry.in_main_chain = path.contains(&entry.hash);
        }
        Ok(())
    }

    // --- orphan pool ---

    /// Buffer a header whose parent is unknown.
    pub fn add_orphan(&mut self, header: BlockHeader) {
        self.orphans.insert(header.hash(), header);
    }

    /// Whether the orphan pool holds `hash`.
    pub fn contains_orphan(&self, hash: &Hash256) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Parent hash of an orphaned header, if `hash` is orphaned.
    pub fn orphan_prev(&self, hash: &Hash256) -> Option<Hash256> {
        self.orphans.get(hash).map(|h| h.prev_hash)
    }

    /// Remove and return all orphans whose parent is `parent_hash`.
    pub fn take_orphan_children(&mut self, parent_hash: &Hash256) -> Vec<BlockHeader> {
        let hashes: Vec<Hash256> = self
            .orphans
            .iter()
            .filter(|(_, h)| h.prev_hash == *parent_hash)
            .map(|(hash, _)| *hash)
            .collect();
        hashes
            .into_iter()
            .filter_map(|hash| self.orphans.remove(&hash))
            .collect()
    }

    /// Number of buffered orphans.
    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }
}

impl Default for BlockTree {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`BlockTree`] behind a read-write lock, shared across threads.
///
/// Implements [`ChainView`] by taking the lock per call, so readers (the
/// checkpoint validator's ancestor walks) interleave with the block
/// connection path.
#[derive(Clone)]
pub struct SharedBlockTree(Arc<RwLock<BlockTree>>);

impl SharedBlockTree {
    pub fn new(tree: BlockTree) -> Self {
        Self(Arc::new(RwLock::new(tree)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, BlockTree> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, BlockTree> {
        self.0.write()
    }
}

impl ChainView for SharedBlockTree {
    fn lookup(&self, hash: &Hash256) -> Option<BlockIndexEntry> {
        self.read().lookup(hash).cloned()
    }

    fn best(&self) -> BlockIndexEntry {
        self.read().best_entry().clone()
    }

    fn set_best_chain(&self, hash: &Hash256) -> Result<(), ChainError> {
        self.write().set_best_chain(hash)
    }

    fn contains_orphan(&self, hash: &Hash256) -> bool {
        self.read().contains_orphan(hash)
    }

    fn orphan_prev(&self, hash: &Hash256) -> Option<Hash256> {
        self.read().orphan_prev(hash)
    }
}
