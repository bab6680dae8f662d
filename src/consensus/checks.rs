//! Context-free header and body checks

use crate::consensus::target::{encode_compact, hash_to_number};
use crate::consensus::VerificationError;
use crate::core::{Block, Header, Transaction};
use crate::params::NetworkParameters;
use num_traits::Zero;

/// The claimed target must be a valid positive number no easier than the
/// network ceiling, and the header hash must not exceed it.
///
/// A bad target is reported before a bad hash, so a header claiming an
/// impossibly easy target is never mistaken for a merely unlucky one.
pub fn check_proof_of_work(params: &NetworkParameters, header: &Header) -> Result<(), VerificationError> {
    let bad_target = || VerificationError::BadDifficultyTarget {
        bits: header.bits,
        max_bits: encode_compact(&params.max_target),
    };

    let target = header.target().ok_or_else(bad_target)?;
    if target.is_zero() || target > params.max_target {
        return Err(bad_target());
    }

    if hash_to_number(&header.hash()) > target {
        return Err(VerificationError::BadProofOfWork {
            hash: header.hash(),
            bits: header.bits,
        });
    }
    Ok(())
}

/// Reject headers timestamped more than `max_future` seconds past `now`
pub fn check_timestamp(header: &Header, now: i64, max_future: u64) -> Result<(), VerificationError> {
    let limit = now.max(0) as u64 + max_future;
    if header.time as u64 > limit {
        return Err(VerificationError::TimeTooFarInFuture {
            time: header.time,
            limit,
        });
    }
    Ok(())
}

/// Transactions must hash to the header's merkle root and start with a coinbase
pub fn check_body(header: &Header, transactions: &[Transaction]) -> Result<(), VerificationError> {
    let first = transactions.first().ok_or(VerificationError::EmptyBlock)?;
    if !first.is_coinbase() {
        return Err(VerificationError::FirstTransactionNotCoinbase);
    }

    let computed = Block::calculate_merkle_root(transactions);
    if computed != header.merkle_root {
        return Err(VerificationError::MerkleRootMismatch {
            expected: header.merkle_root,
            computed,
        });
    }
    Ok(())
}

pub fn check_checkpoint(
    params: &NetworkParameters,
    height: u64,
    header: &Header,
) -> Result<(), VerificationError> {
    let actual = header.hash();
    match params.checkpoints.get(&height) {
        Some(expected) if *expected != actual => Err(VerificationError::CheckpointMismatch {
            height,
            expected: *expected,
            actual,
        }),
        _ => Ok(()),
    }
}
