//! Genesis block header for the Weir network.
//!
//! The genesis header is hardcoded and deterministic — every node computes
//! the identical hash. It is the fallback target whenever the synchronized
//! checkpoint has to be reset and no hardened checkpoint block is usable.

use std::sync::LazyLock;

use crate::types::{sha256d, BlockHeader, Hash256};

/// Genesis timestamp: August 1, 2025 00:00:00 UTC.
pub const GENESIS_TIMESTAMP: u64 = 1_754_006_400;

/// Message committed into the genesis merkle root.
pub const GENESIS_MESSAGE: &[u8] = b"A weir holds the river to its course. Genesis 2025.";

/// Cached genesis data, computed once on first access.
struct GenesisData {
    header: BlockHeader,
    hash: Hash256,
}

static GENESIS: LazyLock<GenesisData> = LazyLock::new(build_genesis);

fn build_genesis() -> GenesisData {
    let header = BlockHeader {
        version: 1,
        prev_hash: Hash256::ZERO,
        merkle_root: sha256d(GENESIS_MESSAGE),
        timestamp: GENESIS_TIMESTAMP,
        bits: u64::MAX,
        nonce: 0,
    };
    let hash = header.hash();
    GenesisData { header, hash }
}

/// The genesis block header (height 0).
pub fn genesis_header() -> &'static BlockHeader {
    &GENESIS.header
}

/// The genesis block header hash.
pub fn genesis_hash() -> Hash256 {
    GENESIS.hash
}
