//! Hardened checkpoints compiled into the binary.
//!
//! Hardened checkpoints pin known-good blocks per network: a header at a
//! hardened height must match the table exactly, and the latest hardened
//! hash is the reset target when the synchronized checkpoint has to be
//! rebuilt (for example after a master key rotation).
//!
//! The synchronized checkpoint (weir-checkpoint) supplements this list
//! between releases; the table here only grows at release time.

use crate::constants::NetworkType;
use crate::error::ChainError;
use crate::genesis;
use crate::types::Hash256;

/// Hardened checkpoints for mainnet: (height, block_hash) pairs, ascending.
///
/// Currently empty — populated as the network produces known-good blocks.
pub const MAINNET_HARDENED: &[(u64, [u8; 32])] = &[];

/// Hardened checkpoints for testnet.
pub const TESTNET_HARDENED: &[(u64, [u8; 32])] = &[];

/// The hardened table for a network.
pub fn table(network: NetworkType) -> &'static [(u64, [u8; 32])] {
    match network {
        NetworkType::Mainnet => MAINNET_HARDENED,
        NetworkType::Testnet => TESTNET_HARDENED,
    }
}

/// Verify that a block at `height` matches the hardened table.
///
/// Succeeds unconditionally when no hardened checkpoint exists at `height`.
pub fn check(network: NetworkType, height: u64, hash: &Hash256) -> Result<(), ChainError> {
    check_with(table(network), height, hash)
}

/// Like [`check`] but with an explicit table.
///
/// This is the testable core: production code passes the compiled table,
/// while tests supply their own.
pub fn check_with(
    table: &[(u64, [u8; 32])],
    height: u64,
    hash: &Hash256,
) -> Result<(), ChainError> {
    for &(cp_height, cp_hash) in table {
        if cp_height == height {
            if hash.0 != cp_hash {
                return Err(ChainError::HardenedMismatch { height });
            }
            return Ok(());
        }
    }
    Ok(())
}

/// The most recent hardened checkpoint hash, or genesis when the table is
/// empty. This is the reset target for the synchronized checkpoint.
pub fn latest(network: NetworkType) -> Hash256 {
    latest_with(table(network)).unwrap_or_else(genesis::genesis_hash)
}

/// Like [`latest`] but with an explicit table; `None` when empty.
pub fn latest_with(table: &[(u64, [u8; 32])]) -> Option<Hash256> {
    table
        .iter()
        .max_by_key(|(height, _)| *height)
        .map(|(_, hash)| Hash256(*hash))
}
