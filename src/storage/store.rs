//! Block store contract and the in-memory reference store
//!
//! A block store maps header hashes to `StoredHeader`s and remembers a
//! single chain head. It does no validation of its own.

use crate::core::Header;
use crate::crypto::Sha256Hash;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store is corrupt: {0}")]
    Corrupt(String),
    #[error("Ancestor {0} is missing from the store")]
    MissingAncestor(Sha256Hash),
    #[error("No chain head recorded")]
    MissingHead,
}

// =============================================================================
// Stored Header
// =============================================================================

/// A header placed in the chain: its height and the total work from
/// genesis up to and including it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHeader {
    header: Header,
    height: u64,
    chain_work: BigUint,
}

impl StoredHeader {
    /// The root of every chain: height zero, work of the genesis target alone
    pub fn genesis(header: Header) -> Self {
        let chain_work = header.work();
        Self {
            header,
            height: 0,
            chain_work,
        }
    }

    /// Place `header` directly on top of `self`
    pub(crate) fn build_next(&self, header: Header) -> Self {
        let chain_work = &self.chain_work + header.work();
        Self {
            header,
            height: self.height + 1,
            chain_work,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn chain_work(&self) -> &BigUint {
        &self.chain_work
    }

    pub fn more_work_than(&self, other: &StoredHeader) -> bool {
        self.chain_work > other.chain_work
    }

    /// Fetch the predecessor from `store`, `None` for genesis or a pruned ancestor
    pub fn prev<S: BlockStore + ?Sized>(&self, store: &S) -> Result<Option<StoredHeader>, StoreError> {
        if self.height == 0 {
            return Ok(None);
        }
        store.get(&self.header.prev_block_hash)
    }

    /// Like `prev`, but a missing predecessor is an error
    pub fn expect_prev<S: BlockStore + ?Sized>(&self, store: &S) -> Result<StoredHeader, StoreError> {
        self.prev(store)?
            .ok_or(StoreError::MissingAncestor(self.header.prev_block_hash))
    }
}

// =============================================================================
// Block Store Contract
// =============================================================================

/// Keyed persistence for stored headers plus the chain-head pointer.
///
/// Durable implementations must make a `put` durable before a later
/// `set_chain_head` can be observed as durable, so a crash between the two
/// leaves a head whose successors are already present.
pub trait BlockStore: Send + Sync {
    fn get(&self, hash: &Sha256Hash) -> Result<Option<StoredHeader>, StoreError>;

    fn put(&mut self, block: StoredHeader) -> Result<(), StoreError>;

    fn get_chain_head(&self) -> Result<StoredHeader, StoreError>;

    fn set_chain_head(&mut self, head: StoredHeader) -> Result<(), StoreError>;

    fn contains(&self, hash: &Sha256Hash) -> Result<bool, StoreError> {
        Ok(self.get(hash)?.is_some())
    }
}

impl<S: BlockStore + ?Sized> BlockStore for Box<S> {
    fn get(&self, hash: &Sha256Hash) -> Result<Option<StoredHeader>, StoreError> {
        (**self).get(hash)
    }

    fn put(&mut self, block: StoredHeader) -> Result<(), StoreError> {
        (**self).put(block)
    }

    fn get_chain_head(&self) -> Result<StoredHeader, StoreError> {
        (**self).get_chain_head()
    }

    fn set_chain_head(&mut self, head: StoredHeader) -> Result<(), StoreError> {
        (**self).set_chain_head(head)
    }
}

// =============================================================================
// Memory Block Store
// =============================================================================

/// Hash-keyed map plus head pointer, seeded with the genesis header
#[derive(Debug, Clone)]
pub struct MemoryBlockStore {
    blocks: HashMap<Sha256Hash, StoredHeader>,
    chain_head: Sha256Hash,
}

impl MemoryBlockStore {
    pub fn new(genesis: &Header) -> Self {
        let stored = StoredHeader::genesis(genesis.clone());
        let hash = stored.hash();
        let mut blocks = HashMap::new();
        blocks.insert(hash, stored);
        Self {
            blocks,
            chain_head: hash,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, hash: &Sha256Hash) -> Result<Option<StoredHeader>, StoreError> {
        Ok(self.blocks.get(hash).cloned())
    }

    fn put(&mut self, block: StoredHeader) -> Result<(), StoreError> {
        self.blocks.insert(block.hash(), block);
        Ok(())
    }

    fn get_chain_head(&self) -> Result<StoredHeader, StoreError> {
        self.blocks
            .get(&self.chain_head)
            .cloned()
            .ok_or(StoreError::MissingHead)
    }

    fn set_chain_head(&mut self, head: StoredHeader) -> Result<(), StoreError> {
        let hash = head.hash();
        self.blocks.entry(hash).or_insert(head);
        self.chain_head = hash;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::target::EASIEST_DIFFICULTY_TARGET;
    use crate::core::{Block, Transaction, BLOCK_VERSION_GENESIS, FIFTY_COINS};

    fn genesis() -> Block {
        let coinbase = Transaction::coinbase_for_height(0, &[0x02; 33], FIFTY_COINS);
        let mut block = Block::build(
            Sha256Hash::ZERO,
            BLOCK_VERSION_GENESIS,
            vec![coinbase],
            1_296_688_602,
            EASIEST_DIFFICULTY_TARGET,
        );
        block.solve();
        block
    }

    #[test]
    fn test_memory_store_is_seeded_with_genesis() {
        let genesis = genesis();
        let store = MemoryBlockStore::new(&genesis.header);

        let head = store.get_chain_head().unwrap();
        assert_eq!(head.header(), &genesis.header);
        assert_eq!(head.height(), 0);
        assert_eq!(head.chain_work(), &genesis.header.work());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_put_and_set_head() {
        let genesis = genesis();
        let mut store = MemoryBlockStore::new(&genesis.header);
        let head = store.get_chain_head().unwrap();

        let next = Block::create_next(&genesis.header, BLOCK_VERSION_GENESIS, &[0x02; 33], 1_296_688_700, 1);
        let stored = head.build_next(next.header.clone());
        store.put(stored.clone()).unwrap();

        assert!(store.contains(&next.hash()).unwrap());
        assert_eq!(store.get_chain_head().unwrap(), head);

        store.set_chain_head(stored.clone()).unwrap();
        assert_eq!(store.get_chain_head().unwrap(), stored);
        assert_eq!(stored.height(), 1);
        assert_eq!(stored.expect_prev(&store).unwrap(), head);
        assert!(stored.more_work_than(&head));
    }

    #[test]
    fn test_genesis_has_no_prev() {
        let genesis = genesis();
        let store = MemoryBlockStore::new(&genesis.header);
        let head = store.get_chain_head().unwrap();
        assert!(head.prev(&store).unwrap().is_none());
    }
}
