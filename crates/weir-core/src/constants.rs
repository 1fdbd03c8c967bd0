//! Protocol constants and network parameters.

/// Confirmations before a coinbase/coinstake output may be spent.
pub const COINBASE_MATURITY: u64 = 500;

/// Minimum age before a coin may take part in staking, in seconds.
pub const STAKE_MIN_AGE: u64 = 60 * 60 * 24 * 30;

/// Default depth for automatic checkpoint selection. Negative means the
/// master operator issues checkpoints manually.
pub const DEFAULT_CHECKPOINT_DEPTH: i64 = -1;

pub const BLOCK_TIME_SECS: u64 = 60;
pub const DEFAULT_P2P_PORT: u16 = 19777;
pub const DEFAULT_RPC_PORT: u16 = 19776;
pub const MAX_MESSAGE_SIZE: usize = 2_097_152; // 2 MiB

/// Checkpoint master public key for mainnet (uncompressed SEC1 point).
pub const MAIN_CHECKPOINT_PUBKEY: &str = "04c0c707c28533fd5c9f79d2d3a2d80dff259ad8f915241cd14608fb9bc07c74830efe8438f2b272a866b4af5e0c2cc2a9909972aefbd976937e39f46bb38c277c";

/// Checkpoint master public key for testnet (uncompressed SEC1 point).
pub const TEST_CHECKPOINT_PUBKEY: &str = "0400c195be8d5194007b3f02249f785a51505776bd8f43cc6d49206163e08a63ad9009c814966921c361b14949c51e281edc9347e7ce0e8c57019df1313a6cac7b";

/// Network type: Mainnet or Testnet.
///
/// Controls magic bytes, default ports, data directory suffix, the
/// compiled-in checkpoint master public key, and the hardened checkpoint
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkType {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
}

impl NetworkType {
    /// Four-byte network identifier prepended to all P2P messages.
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0x57, 0x45, 0x49, 0x52], // "WEIR"
            Self::Testnet => [0x57, 0x54, 0x53, 0x54], // "WTST"
        }
    }

    /// Default TCP port for P2P connections.
    pub fn default_p2p_port(&self) -> u16 {
        match self {
            Self::Mainnet => DEFAULT_P2P_PORT,
            Self::Testnet => 29777,
        }
    }

    /// Default TCP port for the JSON-RPC server.
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Self::Mainnet => DEFAULT_RPC_PORT,
            Self::Testnet => 29776,
        }
    }

    /// Subdirectory name appended to the base data directory path.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    /// Hex encoding of the compiled-in checkpoint master public key.
    pub fn checkpoint_pubkey_hex(&self) -> &'static str {
        match self {
            Self::Mainnet => MAIN_CHECKPOINT_PUBKEY,
            Self::Testnet => TEST_CHECKPOINT_PUBKEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_spell_weir() {
        assert_eq!(&NetworkType::Mainnet.magic_bytes(), b"WEIR");
    }

    #[test]
    fn network_magic_bytes_distinct() {
        assert_ne!(
            NetworkType::Mainnet.magic_bytes(),
            NetworkType::Testnet.magic_bytes()
        );
    }

    #[test]
    fn network_ports_distinct() {
        assert_ne!(
            NetworkType::Mainnet.default_p2p_port(),
            NetworkType::Testnet.default_p2p_port()
        );
        assert_ne!(
            NetworkType::Mainnet.default_rpc_port(),
            NetworkType::Testnet.default_rpc_port()
        );
        assert_ne!(
            NetworkType::Mainnet.default_p2p_port(),
            NetworkType::Mainnet.default_rpc_port()
        );
    }

    #[test]
    fn network_default_is_mainnet() {
        assert_eq!(NetworkType::default(), NetworkType::Mainnet);
    }

    #[test]
    fn checkpoint_pubkeys_are_uncompressed_points() {
        for net in [NetworkType::Mainnet, NetworkType::Testnet] {
            let bytes = hex::decode(net.checkpoint_pubkey_hex()).unwrap();
            assert_eq!(bytes.len(), 65, "{net:?} key must be a 65-byte SEC1 point");
            assert_eq!(bytes[0], 0x04, "{net:?} key must be uncompressed");
        }
    }

    #[test]
    fn checkpoint_pubkeys_differ_per_network() {
        assert_ne!(MAIN_CHECKPOINT_PUBKEY, TEST_CHECKPOINT_PUBKEY);
    }
}
