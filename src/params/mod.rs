//! Network parameters
//!
//! Each supported network is a plain `NetworkParameters` value: its genesis
//! block, difficulty ceiling and retarget schedule, soft-fork majority
//! window, coinbase maturity and checkpoints. Values are resolved through
//! an explicit `ParamsRegistry` rather than global state.

pub mod genesis;
pub mod registry;

use crate::consensus::difficulty::DifficultyRules;
use crate::consensus::target::decode_compact;
use crate::core::{Block, Header};
use crate::crypto::Sha256Hash;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use genesis::{build_genesis, build_genesis_from, genesis_coinbase, GenesisSeed};
pub use registry::ParamsRegistry;

/// Parameter construction errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("Genesis block mismatch on {network}: expected {expected}, computed {computed}")]
    GenesisMismatch {
        network: Network,
        expected: Sha256Hash,
        computed: Sha256Hash,
    },
    #[error("Invalid built-in constant: {0}")]
    InvalidConstant(String),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

// =============================================================================
// Networks
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet3,
    Testnet2,
    Regtest,
    /// Throwaway network with the easiest difficulty and a short retarget
    /// interval, for exercising chain logic quickly
    UnitTest,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Testnet3,
        Network::Testnet2,
        Network::Regtest,
        Network::UnitTest,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet3 => "testnet3",
            Network::Testnet2 => "testnet2",
            Network::Regtest => "regtest",
            Network::UnitTest => "unittest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Network {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Network::ALL
            .iter()
            .copied()
            .find(|n| n.name() == lower)
            .ok_or_else(|| ParamsError::UnknownNetwork(s.to_string()))
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Blocks per retarget period on the production networks
pub const INTERVAL: u64 = 2016;

/// Two weeks, the expected duration of one retarget period
pub const TARGET_TIMESPAN: u64 = 14 * 24 * 60 * 60;

/// Ten minutes between blocks
pub const TARGET_SPACING: u64 = 10 * 60;

/// Blocks a coinbase must be buried under before it can be spent
pub const SPENDABLE_COINBASE_DEPTH: u64 = 100;

/// Testnet3 allows minimum-difficulty blocks only after this time
const TESTNET_MIN_DIFFICULTY_ACTIVATION: u32 = 1_329_264_000;

#[derive(Debug, Clone)]
pub struct NetworkParameters {
    pub network: Network,
    pub genesis: Block,
    pub genesis_hash: Sha256Hash,
    /// Easiest target any header may claim
    pub max_target: BigUint,
    pub interval: u64,
    pub target_timespan: u64,
    pub target_spacing: u64,
    pub difficulty_rules: DifficultyRules,
    /// Number of trailing headers examined for soft-fork activation
    pub majority_window: usize,
    /// Upgraded headers in the window needed before outdated versions are rejected
    pub majority_reject_block_outdated: usize,
    pub spendable_coinbase_depth: u64,
    pub checkpoints: BTreeMap<u64, Sha256Hash>,
}

impl NetworkParameters {
    /// Build the parameters for `network`, verifying or solving its genesis block
    pub fn for_network(network: Network) -> Result<Self, ParamsError> {
        let genesis = build_genesis(network)?;
        let genesis_hash = genesis.hash();

        let (max_bits, interval, target_timespan, rules) = match network {
            Network::Mainnet => (0x1d00_ffff, INTERVAL, TARGET_TIMESPAN, DifficultyRules::Standard),
            Network::Testnet3 => (
                0x1d00_ffff,
                INTERVAL,
                TARGET_TIMESPAN,
                DifficultyRules::MinDifficultyBlocks {
                    activation_time: TESTNET_MIN_DIFFICULTY_ACTIVATION,
                },
            ),
            Network::Testnet2 => (0x1d0f_ffff, INTERVAL, TARGET_TIMESPAN, DifficultyRules::Standard),
            Network::Regtest => (0x207f_ffff, 10_000, TARGET_TIMESPAN, DifficultyRules::NoRetargeting),
            Network::UnitTest => (0x207f_ffff, 10, 200_000_000, DifficultyRules::Standard),
        };
        let max_target = decode_compact(max_bits)
            .ok_or_else(|| ParamsError::InvalidConstant(format!("max target {:08x}", max_bits)))?;

        let (majority_window, reject, coinbase_depth) = match network {
            Network::Mainnet | Network::Regtest => (1000, 950, SPENDABLE_COINBASE_DEPTH),
            Network::Testnet3 | Network::Testnet2 => (100, 75, SPENDABLE_COINBASE_DEPTH),
            Network::UnitTest => (7, 4, 5),
        };

        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(0, genesis_hash);
        for (height, hash) in checkpoint_table(network) {
            let hash = hash
                .parse::<Sha256Hash>()
                .map_err(|e| ParamsError::InvalidConstant(e.to_string()))?;
            checkpoints.insert(*height, hash);
        }

        Ok(Self {
            network,
            genesis,
            genesis_hash,
            max_target,
            interval,
            target_timespan,
            target_spacing: TARGET_SPACING,
            difficulty_rules: rules,
            majority_window,
            majority_reject_block_outdated: reject,
            spendable_coinbase_depth: coinbase_depth,
            checkpoints,
        })
    }

    pub fn genesis_header(&self) -> &Header {
        &self.genesis.header
    }

    /// Whether the header at `height` must carry a recalculated target
    pub fn is_difficulty_transition(&self, height: u64) -> bool {
        height > 0 && height % self.interval == 0
    }
}

fn checkpoint_table(network: Network) -> &'static [(u64, &'static str)] {
    match network {
        Network::Mainnet => &[
            (11111, "0000000069e244f73d78e8fd29ba2fd2ed618bd6fa2ee92559f542fdb26e7c1d"),
            (33333, "000000002dd5588a74784eaa7ab0507a18ad16a236e7b1ce69f00d7ddfb5d0a6"),
            (74000, "0000000000573993a3c9e41ce34471c079dcf5f52a0e824a81e7f953b8661a20"),
            (105000, "00000000000291ce28027faea320c8d2b054b2e0fe44a773f3eefb151d6bdc97"),
            (134444, "00000000000005b12ffd4cd315cd34ffd4a594f430ac814c91184a0d42d2b0fe"),
        ],
        Network::Testnet3 => &[(
            546,
            "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
        )],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_names_parse() {
        for network in Network::ALL {
            assert_eq!(network.name().parse::<Network>().unwrap(), network);
        }
        assert_eq!("MainNet".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("litecoin".parse::<Network>().is_err());
    }

    #[test]
    fn test_unit_test_parameters() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        assert_eq!(params.interval, 10);
        assert_eq!(params.majority_window, 7);
        assert_eq!(params.majority_reject_block_outdated, 4);
        assert_eq!(params.spendable_coinbase_depth, 5);
        assert!(params.is_difficulty_transition(10));
        assert!(!params.is_difficulty_transition(0));
        assert!(!params.is_difficulty_transition(9));
    }

    #[test]
    fn test_checkpoints_include_genesis() {
        let params = NetworkParameters::for_network(Network::Mainnet).unwrap();
        assert_eq!(params.checkpoints.get(&0), Some(&params.genesis_hash));
        assert!(params.checkpoints.contains_key(&11111));
        assert!(!params.checkpoints.contains_key(&11112));
    }
}
