//! Master-key cryptography for checkpoint messages.
//!
//! Checkpoint messages are signed with secp256k1 ECDSA over the double
//! SHA-256 of the raw payload bytes; signatures travel DER-encoded. The
//! verifier hashes and checks the raw bytes first and only parses the
//! payload after the signature holds, so no field is ever trusted
//! unauthenticated.

use std::fmt;

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use weir_core::constants::NetworkType;
use weir_core::error::CheckpointError;
use weir_core::types::{sha256d, Hash256, SignedCheckpoint, UnsignedCheckpoint};

/// The checkpoint master's public key.
///
/// Every node carries one per network, compiled in; private deployments may
/// substitute their own at configuration time.
#[derive(Clone)]
pub struct MasterPubkey {
    key: VerifyingKey,
    raw: Vec<u8>,
}

impl MasterPubkey {
    /// Parse a hex-encoded SEC1 point (compressed or uncompressed).
    pub fn from_hex(s: &str) -> Result<Self, CheckpointError> {
        let raw = hex::decode(s).map_err(|_| CheckpointError::InvalidMasterKey)?;
        let key = VerifyingKey::from_sec1_bytes(&raw)
            .map_err(|_| CheckpointError::InvalidMasterKey)?;
        Ok(Self { key, raw })
    }

    /// The compiled-in master key for a network.
    pub fn for_network(network: NetworkType) -> Self {
        Self::from_hex(network.checkpoint_pubkey_hex())
            .expect("compiled-in checkpoint master key is valid")
    }

    /// Raw SEC1 bytes, as persisted in the block database.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Verify a signed checkpoint message and parse its payload.
    ///
    /// The signature is checked over `SHA256d` of the raw message bytes
    /// before any deserialization happens.
    pub fn verify(&self, signed: &SignedCheckpoint) -> Result<UnsignedCheckpoint, CheckpointError> {
        let sig = Signature::from_der(&signed.sig).map_err(|_| CheckpointError::BadSignature)?;
        let digest = sha256d(&signed.msg);
        self.key
            .verify_prehash(digest.as_bytes(), &sig)
            .map_err(|_| CheckpointError::BadSignature)?;
        signed.payload().map_err(CheckpointError::BadPayload)
    }
}

impl fmt::Debug for MasterPubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterPubkey({})", hex::encode(&self.raw[..self.raw.len().min(8)]))
    }
}

impl PartialEq for MasterPubkey {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MasterPubkey {}

/// The checkpoint master's private key.
///
/// Present only on the single node operating as checkpoint master.
#[derive(Clone)]
pub struct MasterKey {
    key: SigningKey,
}

impl MasterKey {
    /// Parse a hex-encoded 32-byte secp256k1 scalar.
    pub fn from_hex(s: &str) -> Result<Self, CheckpointError> {
        let raw = hex::decode(s).map_err(|_| CheckpointError::InvalidMasterKey)?;
        let key =
            SigningKey::from_slice(&raw).map_err(|_| CheckpointError::InvalidMasterKey)?;
        Ok(Self { key })
    }

    /// The public counterpart of this key.
    pub fn pubkey(&self) -> MasterPubkey {
        let key = *self.key.verifying_key();
        let raw = key.to_encoded_point(false).as_bytes().to_vec();
        MasterPubkey { key, raw }
    }

    /// Sign a checkpoint naming `hash`.
    pub fn sign(&self, hash: &Hash256) -> Result<SignedCheckpoint, CheckpointError> {
        let msg = UnsignedCheckpoint::new(*hash).encode();
        let digest = sha256d(&msg);
        let sig: Signature = self
            .key
            .sign_prehash(digest.as_bytes())
            .map_err(|_| CheckpointError::SigningFailed)?;
        Ok(SignedCheckpoint {
            msg,
            sig: sig.to_der().as_bytes().to_vec(),
        })
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("scalar", &"[REDACTED]")
            .finish()
    }
}
