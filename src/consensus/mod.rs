//! Consensus rules applied to headers
//!
//! - Compact target encoding and chain work
//! - Proof of work, timestamp, body and checkpoint checks
//! - Difficulty retargeting
//! - Version-majority soft-fork deprecation

pub mod checks;
pub mod difficulty;
pub mod target;
pub mod version;

use crate::crypto::Sha256Hash;
use thiserror::Error;

pub use checks::{check_body, check_checkpoint, check_proof_of_work, check_timestamp};
pub use difficulty::{calculate_next_target, check_difficulty, required_bits, DifficultyRules};
pub use target::{decode_compact, encode_compact, work_for_target, EASIEST_DIFFICULTY_TARGET};
pub use version::{check_block_version, count_upgraded};

/// Reasons a header or block is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Hash {hash} is higher than target {bits:08x}")]
    BadProofOfWork { hash: Sha256Hash, bits: u32 },
    #[error("Difficulty target {bits:08x} is invalid or easier than the network limit {max_bits:08x}")]
    BadDifficultyTarget { bits: u32, max_bits: u32 },
    #[error("Unexpected change in difficulty at height {height}: expected {expected:08x}, got {actual:08x}")]
    UnexpectedDifficultyChange {
        height: u64,
        expected: u32,
        actual: u32,
    },
    #[error("Block version {version} is out of date, version {required} or later required")]
    BlockVersionOutOfDate { version: u32, required: u32 },
    #[error("Block time {time} is too far in the future (limit {limit})")]
    TimeTooFarInFuture { time: u32, limit: u64 },
    #[error("Merkle root mismatch: header commits to {expected}, transactions hash to {computed}")]
    MerkleRootMismatch {
        expected: Sha256Hash,
        computed: Sha256Hash,
    },
    #[error("Block has no transactions")]
    EmptyBlock,
    #[error("First transaction is not a coinbase")]
    FirstTransactionNotCoinbase,
    #[error("Checkpoint mismatch at height {height}: expected {expected}, got {actual}")]
    CheckpointMismatch {
        height: u64,
        expected: Sha256Hash,
        actual: Sha256Hash,
    },
}
