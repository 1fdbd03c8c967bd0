//! Core protocol types: hashes, block headers, checkpoint messages.
//!
//! Block header hashes and checkpoint message digests both use double
//! SHA-256 over an explicit little-endian byte layout, so every node
//! computes identical digests regardless of in-memory representation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CodecError;

/// A 32-byte hash value.
///
/// Used for block header hashes and checkpoint references.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Means "no checkpoint" in the store.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create a Hash256 from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(s).map_err(|_| CodecError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| CodecError::BadLength { got: v.len(), want: 32 })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Double SHA-256 of arbitrary bytes.
pub fn sha256d(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    Hash256(Sha256::digest(first).into())
}

/// Block header for the proof-of-stake chain.
///
/// The checkpoint subsystem only ever reads the parent linkage and
/// timestamp; validity of the header beyond that is the consensus layer's
/// business.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    /// Protocol version.
    pub version: u64,
    /// Hash of the previous block header.
    pub prev_hash: Hash256,
    /// Merkle root of the block's transactions.
    pub merkle_root: Hash256,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Compact difficulty target.
    pub bits: u64,
    /// Header nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// Header size in bytes when serialized for hashing (4 u64 fields + 2 * 32-byte hashes).
    const HASH_SIZE: usize = 4 * 8 + 2 * 32;

    /// Compute the block header hash (double SHA-256).
    ///
    /// Uses an explicit fixed byte layout: version || prev_hash || merkle_root ||
    /// timestamp || bits || nonce, all little-endian.
    pub fn hash(&self) -> Hash256 {
        let mut data = Vec::with_capacity(Self::HASH_SIZE);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.prev_hash.as_bytes());
        data.extend_from_slice(self.merkle_root.as_bytes());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.extend_from_slice(&self.bits.to_le_bytes());
        data.extend_from_slice(&self.nonce.to_le_bytes());
        sha256d(&data)
    }
}

/// Current checkpoint message payload version.
pub const CHECKPOINT_MSG_VERSION: u32 = 1;

/// Unsigned payload of a synchronized checkpoint message.
///
/// At this revision the payload names a single block hash; the leading
/// version field leaves room for future message variants without changing
/// the outer envelope.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UnsignedCheckpoint {
    /// Payload format version.
    pub version: u32,
    /// The block hash the network should reach consensus on.
    pub checkpoint_hash: Hash256,
}

impl UnsignedCheckpoint {
    /// Canonical encoded length: 4-byte version + 32-byte hash.
    pub const ENCODED_LEN: usize = 4 + 32;

    /// Payload naming `hash` at the current message version.
    pub fn new(hash: Hash256) -> Self {
        Self {
            version: CHECKPOINT_MSG_VERSION,
            checkpoint_hash: hash,
        }
    }

    /// Canonical encoding: version (LE) followed by the raw hash bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::ENCODED_LEN);
        data.extend_from_slice(&self.version.to_le_bytes());
        data.extend_from_slice(self.checkpoint_hash.as_bytes());
        data
    }

    /// Decode a canonical payload. The version must be one we understand.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CodecError::BadLength { got: bytes.len(), want: Self::ENCODED_LEN });
        }
        let version = u32::from_le_bytes(bytes[0..4].try_into().expect("sliced to 4 bytes"));
        if version == 0 || version > CHECKPOINT_MSG_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let hash: [u8; 32] = bytes[4..].try_into().expect("sliced to 32 bytes");
        Ok(Self {
            version,
            checkpoint_hash: Hash256(hash),
        })
    }
}

/// A checkpoint message as relayed on the wire.
///
/// `msg` holds the canonical encoding of an [`UnsignedCheckpoint`]; `sig` is
/// a DER-encoded secp256k1 ECDSA signature over `SHA256d(msg)`. Verifiers
/// check the signature against the raw bytes before parsing any field.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SignedCheckpoint {
    /// Canonical serialization of the unsigned payload.
    pub msg: Vec<u8>,
    /// DER ECDSA signature over `SHA256d(msg)`.
    pub sig: Vec<u8>,
}

impl SignedCheckpoint {
    /// Parse the unsigned payload. Only meaningful after signature
    /// verification.
    pub fn payload(&self) -> Result<UnsignedCheckpoint, CodecError> {
        UnsignedCheckpoint::decode(&self.msg)
    }
}
