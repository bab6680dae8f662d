//! Difficulty retargeting
//!
//! Every `interval` blocks the target is scaled by how long the previous
//! period actually took, bounded to a factor of four either way and never
//! easier than the network ceiling. Between transitions a header must
//! repeat its predecessor's target, except where a network's rules say
//! otherwise.

use crate::consensus::target::encode_compact;
use crate::consensus::VerificationError;
use crate::core::Header;
use crate::params::NetworkParameters;
use crate::storage::{BlockStore, StoreError, StoredHeader};
use num_bigint::BigUint;

/// Per-network variations on the retarget schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyRules {
    /// Retarget at every interval boundary, carry the target otherwise
    Standard,
    /// Standard, but once `activation_time` has passed a block arriving more
    /// than twice the target spacing after its predecessor may use the
    /// network ceiling. Other blocks repeat the last non-minimum target.
    MinDifficultyBlocks { activation_time: u32 },
    /// Every header repeats its predecessor's target
    NoRetargeting,
}

// =============================================================================
// Target Calculation
// =============================================================================

/// Scale `prev_target` by `actual_timespan` over the expected timespan
pub fn calculate_next_target(
    params: &NetworkParameters,
    prev_target: &BigUint,
    actual_timespan: i64,
) -> BigUint {
    let expected = params.target_timespan;
    let clamped = actual_timespan.max(0) as u64;
    let clamped = clamped.clamp(expected / 4, expected * 4);

    let next = prev_target * BigUint::from(clamped) / BigUint::from(expected);
    if next > params.max_target {
        params.max_target.clone()
    } else {
        next
    }
}

/// Compact target the successor of `prev`, timestamped `next_time`, must carry
pub fn required_bits<S: BlockStore + ?Sized>(
    params: &NetworkParameters,
    store: &S,
    prev: &StoredHeader,
    next_time: u32,
) -> Result<u32, StoreError> {
    let height = prev.height() + 1;

    match params.difficulty_rules {
        DifficultyRules::NoRetargeting => Ok(prev.header().bits),
        _ if params.is_difficulty_transition(height) => retarget_bits(params, store, prev),
        DifficultyRules::MinDifficultyBlocks { activation_time } if next_time >= activation_time => {
            min_difficulty_bits(params, store, prev, next_time)
        }
        _ => Ok(prev.header().bits),
    }
}

fn retarget_bits<S: BlockStore + ?Sized>(
    params: &NetworkParameters,
    store: &S,
    prev: &StoredHeader,
) -> Result<u32, StoreError> {
    // The period's first block is interval - 1 blocks behind its last
    let mut first = prev.clone();
    for _ in 1..params.interval {
        first = first.expect_prev(store)?;
    }

    let prev_target = prev.header().target().ok_or_else(|| {
        StoreError::Corrupt(format!("stored header {} has a negative target", prev.hash()))
    })?;
    let actual_timespan = prev.header().time as i64 - first.header().time as i64;
    let next = calculate_next_target(params, &prev_target, actual_timespan);
    let bits = encode_compact(&next);

    log::info!(
        "Difficulty transition at height {}: {:08x} -> {:08x} over {}s",
        prev.height() + 1,
        prev.header().bits,
        bits,
        actual_timespan
    );
    Ok(bits)
}

fn min_difficulty_bits<S: BlockStore + ?Sized>(
    params: &NetworkParameters,
    store: &S,
    prev: &StoredHeader,
    next_time: u32,
) -> Result<u32, StoreError> {
    let max_bits = encode_compact(&params.max_target);
    if next_time as u64 > prev.header().time as u64 + 2 * params.target_spacing {
        return Ok(max_bits);
    }

    let mut cursor = prev.clone();
    while cursor.height() % params.interval != 0 && cursor.header().bits == max_bits {
        cursor = cursor.expect_prev(store)?;
    }
    Ok(cursor.header().bits)
}

/// Reject `header` if its claimed target is not the one its ancestry requires
pub fn check_difficulty<S, E>(
    params: &NetworkParameters,
    store: &S,
    prev: &StoredHeader,
    header: &Header,
) -> Result<(), E>
where
    S: BlockStore + ?Sized,
    E: From<StoreError> + From<VerificationError>,
{
    let expected = required_bits(params, store, prev, header.time)?;
    if header.bits != expected {
        return Err(VerificationError::UnexpectedDifficultyChange {
            height: prev.height() + 1,
            expected,
            actual: header.bits,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::target::{decode_compact, EASIEST_DIFFICULTY_TARGET};
    use crate::core::{Block, BLOCK_VERSION_GENESIS};
    use crate::params::Network;
    use crate::storage::MemoryBlockStore;

    #[derive(Debug)]
    enum TestError {
        Store,
        Verification(VerificationError),
    }

    impl From<StoreError> for TestError {
        fn from(_: StoreError) -> Self {
            TestError::Store
        }
    }

    impl From<VerificationError> for TestError {
        fn from(e: VerificationError) -> Self {
            TestError::Verification(e)
        }
    }

    /// Extend the store's head by `count` blocks spaced `spacing` seconds apart
    fn extend(store: &mut MemoryBlockStore, count: u64, spacing: u32) -> StoredHeader {
        let mut head = store.get_chain_head().unwrap();
        for _ in 0..count {
            let block = Block::create_next(
                head.header(),
                BLOCK_VERSION_GENESIS,
                &[0x02; 33],
                head.header().time + spacing,
                head.height() + 1,
            );
            head = head.build_next(block.header);
            store.put(head.clone()).unwrap();
            store.set_chain_head(head.clone()).unwrap();
        }
        head
    }

    #[test]
    fn test_next_target_is_clamped() {
        let params = NetworkParameters::for_network(Network::Mainnet).unwrap();
        let target = decode_compact(0x1b0404cb).unwrap();
        let span = params.target_timespan as i64;

        assert_eq!(calculate_next_target(&params, &target, span), target);
        assert_eq!(
            calculate_next_target(&params, &target, 0),
            &target / BigUint::from(4u32)
        );
        assert_eq!(
            calculate_next_target(&params, &target, span * 100),
            &target * BigUint::from(4u32)
        );
        assert_eq!(
            calculate_next_target(&params, &params.max_target, span * 2),
            params.max_target
        );
    }

    #[test]
    fn test_transition_recomputes_target() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());
        let prev = extend(&mut store, 9, 1);
        assert_eq!(prev.height(), 9);

        // Nine one-second blocks are far below a quarter of the timespan
        let bits = required_bits(&params, &store, &prev, prev.header().time + 1).unwrap();
        assert_eq!(bits, 0x201fffff);

        let mut header = Block::create_next(prev.header(), BLOCK_VERSION_GENESIS, &[0x02; 33], prev.header().time + 1, 10)
            .header;
        let held = check_difficulty::<_, TestError>(&params, &store, &prev, &header);
        assert!(matches!(
            held,
            Err(TestError::Verification(VerificationError::UnexpectedDifficultyChange {
                height: 10,
                expected: 0x201fffff,
                actual: EASIEST_DIFFICULTY_TARGET,
            }))
        ));

        header.bits = 0x201fffff;
        assert!(check_difficulty::<_, TestError>(&params, &store, &prev, &header).is_ok());
    }

    #[test]
    fn test_off_transition_carries_target() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());
        let prev = extend(&mut store, 3, 600);

        let mut header = prev.header().clone();
        header.bits = 0x201fffff;
        assert!(check_difficulty::<_, TestError>(&params, &store, &prev, &header).is_err());
        header.bits = prev.header().bits;
        assert!(check_difficulty::<_, TestError>(&params, &store, &prev, &header).is_ok());
    }

    #[test]
    fn test_missing_ancestor_is_store_error() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut full = MemoryBlockStore::new(params.genesis_header());
        let prev = extend(&mut full, 9, 1);

        let mut pruned = MemoryBlockStore::new(params.genesis_header());
        pruned.put(prev.clone()).unwrap();
        assert!(matches!(
            required_bits(&params, &pruned, &prev, prev.header().time + 1),
            Err(StoreError::MissingAncestor(_))
        ));
    }

    #[test]
    fn test_no_retargeting() {
        let mut params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        params.difficulty_rules = DifficultyRules::NoRetargeting;
        let mut store = MemoryBlockStore::new(params.genesis_header());
        let prev = extend(&mut store, 9, 1);

        let bits = required_bits(&params, &store, &prev, prev.header().time + 1).unwrap();
        assert_eq!(bits, EASIEST_DIFFICULTY_TARGET);
    }

    #[test]
    fn test_min_difficulty_blocks() {
        let mut params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        params.difficulty_rules = DifficultyRules::MinDifficultyBlocks { activation_time: 0 };
        params.max_target = decode_compact(EASIEST_DIFFICULTY_TARGET).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());

        let mut head = extend(&mut store, 9, 1);
        let hard = Block::create_next(head.header(), BLOCK_VERSION_GENESIS, &[0x02; 33], head.header().time + 1, 10)
            .with_bits(0x201fffff);
        head = head.build_next(hard.header);
        store.put(head.clone()).unwrap();

        // Late block may drop to the ceiling
        let late = head.header().time + 1201;
        assert_eq!(
            required_bits(&params, &store, &head, late).unwrap(),
            EASIEST_DIFFICULTY_TARGET
        );

        // A minimum-difficulty block followed by a prompt one
        let easy = Block::create_next(head.header(), BLOCK_VERSION_GENESIS, &[0x02; 33], late, 11)
            .with_bits(EASIEST_DIFFICULTY_TARGET);
        let easy = head.build_next(easy.header);
        store.put(easy.clone()).unwrap();

        let prompt = easy.header().time + 60;
        assert_eq!(required_bits(&params, &store, &easy, prompt).unwrap(), 0x201fffff);
    }
}
