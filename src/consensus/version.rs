//! Version-majority soft-fork deprecation
//!
//! Once a supermajority of the trailing window of headers signals version
//! `v + 1`, new headers still carrying version `v` are rejected.

use crate::consensus::VerificationError;
use crate::core::{Header, BLOCK_VERSION_BIP65, BLOCK_VERSION_GENESIS};
use crate::params::NetworkParameters;
use crate::storage::{BlockStore, StoreError, StoredHeader};

/// Count headers with version at least `min_version` among the `window`
/// headers ending at `tip`.
///
/// Returns `None` when the chain is shorter than the window.
pub fn count_upgraded<S: BlockStore + ?Sized>(
    store: &S,
    tip: &StoredHeader,
    window: usize,
    min_version: u32,
) -> Result<Option<usize>, StoreError> {
    if tip.height() + 1 < window as u64 {
        return Ok(None);
    }

    let mut count = 0;
    let mut cursor = Some(tip.clone());
    for _ in 0..window {
        let current = match cursor {
            Some(current) => current,
            None => return Ok(None),
        };
        if current.header().version >= min_version {
            count += 1;
        }
        cursor = current.prev(store)?;
    }
    Ok(Some(count))
}

/// Reject a deprecated `header.version` once its successor version holds
/// the network's reject threshold in the window ending at `prev`
pub fn check_block_version<S, E>(
    params: &NetworkParameters,
    store: &S,
    prev: &StoredHeader,
    header: &Header,
) -> Result<(), E>
where
    S: BlockStore + ?Sized,
    E: From<StoreError> + From<VerificationError>,
{
    let version = header.version;
    if !(BLOCK_VERSION_GENESIS..BLOCK_VERSION_BIP65).contains(&version) {
        return Ok(());
    }

    let required = version + 1;
    let upgraded = count_upgraded(store, prev, params.majority_window, required)?;
    match upgraded {
        Some(count) if count >= params.majority_reject_block_outdated => {
            log::debug!(
                "Rejecting version {} header: {} of last {} headers are version {} or later",
                version,
                count,
                params.majority_window,
                required
            );
            Err(VerificationError::BlockVersionOutOfDate { version, required }.into())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Block, BLOCK_VERSION_BIP34, BLOCK_VERSION_BIP66};
    use crate::params::Network;
    use crate::storage::MemoryBlockStore;

    fn extend(store: &mut MemoryBlockStore, versions: &[u32]) -> StoredHeader {
        let mut head = store.get_chain_head().unwrap();
        for &version in versions {
            let block = Block::create_next(
                head.header(),
                version,
                &[0x02; 33],
                head.header().time + 600,
                head.height() + 1,
            );
            head = head.build_next(block.header);
            store.put(head.clone()).unwrap();
            store.set_chain_head(head.clone()).unwrap();
        }
        head
    }

    fn check(params: &NetworkParameters, store: &MemoryBlockStore, prev: &StoredHeader, version: u32) -> Result<(), VerificationError> {
        let mut header = prev.header().clone();
        header.version = version;
        check_block_version::<_, crate::chain::ChainError>(params, store, prev, &header).map_err(|e| match e {
            crate::chain::ChainError::Verification(v) => v,
            other => panic!("unexpected error {:?}", other),
        })
    }

    #[test]
    fn test_short_chain_has_no_window() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());
        let tip = extend(&mut store, &[2, 2, 2, 2, 2]);

        assert_eq!(count_upgraded(&store, &tip, 7, 2).unwrap(), None);
        assert!(check(&params, &store, &tip, BLOCK_VERSION_GENESIS).is_ok());
    }

    #[test]
    fn test_version_rejected_after_supermajority() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());

        // Genesis plus six headers fill the window, three of them upgraded
        let tip = extend(&mut store, &[1, 1, 1, 2, 2, 2]);
        assert_eq!(count_upgraded(&store, &tip, 7, 2).unwrap(), Some(3));
        assert!(check(&params, &store, &tip, BLOCK_VERSION_GENESIS).is_ok());

        let tip = extend(&mut store, &[2]);
        assert_eq!(count_upgraded(&store, &tip, 7, 2).unwrap(), Some(4));
        assert_eq!(
            check(&params, &store, &tip, BLOCK_VERSION_GENESIS),
            Err(VerificationError::BlockVersionOutOfDate {
                version: 1,
                required: 2
            })
        );
        assert!(check(&params, &store, &tip, BLOCK_VERSION_BIP34).is_ok());
    }

    #[test]
    fn test_bip66_deprecated_by_bip65() {
        let params = NetworkParameters::for_network(Network::UnitTest).unwrap();
        let mut store = MemoryBlockStore::new(params.genesis_header());
        let tip = extend(&mut store, &[3, 3, 4, 4, 4, 4, 4]);

        assert_eq!(
            check(&params, &store, &tip, BLOCK_VERSION_BIP66),
            Err(VerificationError::BlockVersionOutOfDate {
                version: 3,
                required: 4
            })
        );
        assert!(check(&params, &store, &tip, BLOCK_VERSION_BIP65).is_ok());
    }
}
