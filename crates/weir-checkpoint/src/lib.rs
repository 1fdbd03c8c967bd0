//! # weir-checkpoint — Synchronized checkpoints, centrally broadcast.
//!
//! A privileged node, the checkpoint master, periodically signs a message
//! naming a block hash. Every node carries the master's public key and, on
//! receiving such a message, verifies the signature, checks that the named
//! block descends from its currently accepted checkpoint, and adopts it.
//! In enforce mode the node also reorganizes so that the checkpointed
//! block lies on its best chain. This supplements proof-of-stake consensus
//! against long-range and majority-stake rewrites.
//!
//! Besides verifying signatures, every node checks checkpoint consistency:
//! a validly signed checkpoint that is neither ancestor nor descendant of
//! the current one means the master key is compromised or the operator
//! made a mistake. The message is discarded and a warning is published,
//! which bounds the damage either can cause.

pub mod crypto;
pub mod engine;
pub mod policy;
pub mod store;

pub use crypto::{MasterKey, MasterPubkey};
pub use engine::{CheckpointEngine, ProcessOutcome, RejectReason, Validation};
pub use store::CheckpointStatus;
