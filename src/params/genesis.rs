//! Genesis block construction
//!
//! Every network shares the Bitcoin genesis coinbase: the Times headline in the
//! scriptSig and a fifty-coin pay-to-pubkey output. Only the header fields
//! differ between networks.

use crate::core::{Block, Transaction, BLOCK_VERSION_GENESIS, FIFTY_COINS};
use crate::crypto::Sha256Hash;
use crate::params::{Network, ParamsError};

/// `0x1d00ffff`, a push of the number 4, then the headline
const GENESIS_SCRIPT_SIG: &str = "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73";

/// Uncompressed public key paid by the genesis coinbase
const GENESIS_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

/// Fixed header fields of a network's genesis block
#[derive(Debug, Clone, Copy)]
pub struct GenesisSeed {
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
    /// Published hash, `None` for networks that solve their own genesis
    pub hash: Option<&'static str>,
}

impl GenesisSeed {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                time: 1_231_006_505,
                bits: 0x1d00_ffff,
                nonce: 2_083_236_893,
                hash: Some("000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"),
            },
            Network::Testnet3 => Self {
                time: 1_296_688_602,
                bits: 0x1d00_ffff,
                nonce: 414_098_458,
                hash: Some("000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943"),
            },
            Network::Testnet2 => Self {
                time: 1_296_688_602,
                bits: 0x1d07_fff8,
                nonce: 384_568_319,
                hash: Some("00000007199508e34a9ff81e6ec0c477a4cccff2a4767a8eee39c11db367b008"),
            },
            Network::Regtest => Self {
                time: 1_296_688_602,
                bits: 0x207f_ffff,
                nonce: 2,
                hash: Some("0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"),
            },
            Network::UnitTest => Self {
                time: 1_296_688_602,
                bits: 0x207f_ffff,
                nonce: 0,
                hash: None,
            },
        }
    }
}

/// The genesis coinbase transaction shared by all networks
pub fn genesis_coinbase() -> Result<Transaction, ParamsError> {
    let script_sig = hex::decode(GENESIS_SCRIPT_SIG)
        .map_err(|e| ParamsError::InvalidConstant(e.to_string()))?;
    let pubkey =
        hex::decode(GENESIS_PUBKEY).map_err(|e| ParamsError::InvalidConstant(e.to_string()))?;
    Ok(Transaction::coinbase(
        script_sig,
        FIFTY_COINS,
        crate::core::transaction::pay_to_pubkey_script(&pubkey),
    ))
}

/// Build the genesis block for `network`.
///
/// Networks with a published hash must reproduce it exactly; the unit-test
/// network searches for its own proof of work instead.
pub fn build_genesis(network: Network) -> Result<Block, ParamsError> {
    build_genesis_from(network, GenesisSeed::for_network(network))
}

/// Build a genesis block for `network` from explicit header fields
pub fn build_genesis_from(network: Network, seed: GenesisSeed) -> Result<Block, ParamsError> {
    let mut block = Block::build(
        Sha256Hash::ZERO,
        BLOCK_VERSION_GENESIS,
        vec![genesis_coinbase()?],
        seed.time,
        seed.bits,
    );
    block.header.nonce = seed.nonce;

    match seed.hash {
        Some(published) => {
            let expected = published
                .parse::<Sha256Hash>()
                .map_err(|e| ParamsError::InvalidConstant(e.to_string()))?;
            let computed = block.hash();
            if computed != expected {
                return Err(ParamsError::GenesisMismatch {
                    network,
                    expected,
                    computed,
                });
            }
            log::info!("Verified {} genesis block {}", network, computed);
        }
        None => {
            let attempts = block.solve();
            log::info!(
                "Solved {} genesis block {} after {} attempts",
                network,
                block.hash(),
                attempts
            );
        }
    }

    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_merkle_root() {
        let coinbase = genesis_coinbase().unwrap();
        assert_eq!(crate::core::Encodable::to_bytes(&coinbase).len(), 204);
        assert_eq!(
            coinbase.txid().to_string(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
    }

    #[test]
    fn test_published_genesis_hashes_verify() {
        for network in [
            Network::Mainnet,
            Network::Testnet3,
            Network::Testnet2,
            Network::Regtest,
        ] {
            let block = build_genesis(network).unwrap();
            assert!(block.header.meets_target(), "{}", network);
            assert!(block.verify_merkle_root());
        }
    }

    #[test]
    fn test_unit_test_genesis_is_solved() {
        let block = build_genesis(Network::UnitTest).unwrap();
        assert!(block.header.meets_target());
        assert_eq!(block.header.time, 1_296_688_602);
        assert_eq!(build_genesis(Network::UnitTest).unwrap(), block);
    }

    #[test]
    fn test_mainnet_genesis_hash() {
        let block = build_genesis(Network::Mainnet).unwrap();
        assert_eq!(
            block.hash().to_string(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        assert_eq!(block.header.nonce, 2_083_236_893);
    }

    #[test]
    fn test_wrong_nonce_is_genesis_mismatch() {
        let seed = GenesisSeed {
            nonce: 2_083_236_894,
            ..GenesisSeed::for_network(Network::Mainnet)
        };
        match build_genesis_from(Network::Mainnet, seed) {
            Err(ParamsError::GenesisMismatch {
                network,
                expected,
                computed,
            }) => {
                assert_eq!(network, Network::Mainnet);
                assert_eq!(
                    expected.to_string(),
                    "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
                );
                assert_ne!(computed, expected);
            }
            other => panic!("expected genesis mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_published_hash_is_genesis_mismatch() {
        let seed = GenesisSeed {
            hash: Some("0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206"),
            ..GenesisSeed::for_network(Network::Testnet3)
        };
        let err = build_genesis_from(Network::Testnet3, seed).unwrap_err();
        assert!(matches!(err, ParamsError::GenesisMismatch { network: Network::Testnet3, .. }));
    }
}
