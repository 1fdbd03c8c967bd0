//! RocksDB-backed persistence for the block index and checkpoint state.
//!
//! Two column families: `index` holds block index entries keyed by hash,
//! `meta` holds the best-chain tip, the accepted sync-checkpoint, and the
//! checkpoint master public key last seen by this node. The store
//! implements [`CheckpointDb`], with `sync` mapped to a RocksDB flush.
//!
//! Main-chain flags are not authoritative on disk; the in-memory
//! [`BlockTree`](weir_core::chain::BlockTree) recomputes them from the
//! stored best hash at load.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, Options, DB};

use weir_core::chain::BlockIndexEntry;
use weir_core::db::CheckpointDb;
use weir_core::error::StoreError;
use weir_core::types::Hash256;

// --- Column family names ---

const CF_INDEX: &str = "index";
const CF_META: &str = "meta";

const ALL_CFS: &[&str] = &[CF_INDEX, CF_META];

// --- Metadata keys ---

const META_BEST_HASH: &[u8] = b"best_hash";
const META_SYNC_CHECKPOINT: &[u8] = b"sync_checkpoint";
const META_CHECKPOINT_PUBKEY: &[u8] = b"checkpoint_pubkey";

/// RocksDB-backed block index and checkpoint metadata store.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a RocksDB database at the given path, creating the
    /// column families if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { db })
    }

    /// Persist a block index entry.
    pub fn put_index_entry(&self, entry: &BlockIndexEntry) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_INDEX)?;
        let value = bincode::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.db
            .put_cf(&cf, entry.hash.as_bytes(), &value)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// Load every persisted index entry.
    pub fn load_index(&self) -> Result<Vec<BlockIndexEntry>, StoreError> {
        let cf = self.cf_handle(CF_INDEX)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            let (entry, _): (BlockIndexEntry, usize) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Record the best-chain tip hash.
    pub fn write_best(&self, hash: &Hash256) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .put_cf(&cf, META_BEST_HASH, hash.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    /// The recorded best-chain tip hash, if any.
    pub fn read_best(&self) -> Result<Option<Hash256>, StoreError> {
        self.read_meta_hash(META_BEST_HASH)
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db
            .flush()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    // --- Internal helpers ---

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family: {name}")))
    }

    fn read_meta_hash(&self, key: &[u8]) -> Result<Option<Hash256>, StoreError> {
        let cf = self.cf_handle(CF_META)?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(bytes) if bytes.len() == 32 => {
                let arr: [u8; 32] = bytes.try_into().expect("checked length");
                Ok(Some(Hash256(arr)))
            }
            Some(_) => Err(StoreError::Backend("invalid metadata hash length".into())),
            None => Ok(None),
        }
    }
}

impl CheckpointDb for RocksStore {
    fn read_checkpoint_pubkey(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .get_cf(&cf, META_CHECKPOINT_PUBKEY)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn write_checkpoint_pubkey(&self, key: &[u8]) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .put_cf(&cf, META_CHECKPOINT_PUBKEY, key)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StoreError> {
        self.read_meta_hash(META_SYNC_CHECKPOINT)
    }

    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StoreError> {
        let cf = self.cf_handle(CF_META)?;
        self.db
            .put_cf(&cf, META_SYNC_CHECKPOINT, hash.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn sync(&self) -> Result<(), StoreError> {
        self.flush()
    }
}
