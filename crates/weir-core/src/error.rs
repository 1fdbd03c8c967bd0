//! Error types for the Weir protocol.
use thiserror::Error;

use crate::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid hex")] InvalidHex,
    #[error("bad length: got {got}, want {want}")] BadLength { got: usize, want: usize },
    #[error("unsupported message version: {0}")] UnsupportedVersion(u32),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown block: {0}")] UnknownBlock(Hash256),
    #[error("unknown parent: {0}")] UnknownParent(Hash256),
    #[error("duplicate block: {0}")] DuplicateBlock(Hash256),
    #[error("broken index: missing entry for {hash} at height {height}")] BrokenIndex { hash: Hash256, height: u64 },
    #[error("block at height {height} does not match the hardened checkpoint")] HardenedMismatch { height: u64 },
    #[error("block {0} conflicts with the synchronized checkpoint")] CheckpointConflict(Hash256),
    #[error("reorganize failed: {0}")] ReorganizeFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage: {0}")] Backend(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error("bad signature on checkpoint message")] BadSignature,
    #[error("bad checkpoint payload: {0}")] BadPayload(CodecError),
    #[error("checkpoint master key unavailable")] NoMasterKey,
    #[error("invalid checkpoint master key")] InvalidMasterKey,
    #[error("checkpoint signing failed")] SigningFailed,
    #[error("block index structure failure: {0}")] Structural(String),
    #[error("reorganize to checkpoint {0} failed")] ReorgFailed(Hash256),
    #[error("checkpoint {0} not accepted")] NotAccepted(Hash256),
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum WeirError {
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Checkpoint(#[from] CheckpointError),
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] Store(#[from] StoreError),
}
