//! Chain state bookkeeping
//!
//! Orphan headers (whose predecessor has not arrived yet), the outcome of
//! adding a header, and the engine's tunables.

use crate::core::{Header, Transaction};
use crate::crypto::Sha256Hash;
use std::collections::HashMap;

/// Maximum number of orphan headers to keep in memory
pub const MAX_ORPHAN_BLOCKS: usize = 100;

/// Maximum time (in seconds) an orphan can stay in the pool
pub const ORPHAN_BLOCK_EXPIRE_TIME: u64 = 3600; // 1 hour

/// Maximum allowed time drift into the future (2 hours in seconds)
pub const MAX_FUTURE_BLOCK_TIME: u64 = 7200;

/// Chain engine configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub max_orphans: usize,
    pub orphan_expiry_secs: u64,
    pub max_future_block_time: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            max_orphans: MAX_ORPHAN_BLOCKS,
            orphan_expiry_secs: ORPHAN_BLOCK_EXPIRE_TIME,
            max_future_block_time: MAX_FUTURE_BLOCK_TIME,
        }
    }
}

/// What accompanied a header when it was added
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    HeaderOnly,
    /// Every transaction of the block
    Full(Vec<Transaction>),
    /// Transactions a bloom filter matched, out of `total` in the block
    Filtered { matched: Vec<Transaction>, total: u32 },
}

impl Payload {
    pub fn transactions(&self) -> Option<&[Transaction]> {
        match self {
            Payload::HeaderOnly => None,
            Payload::Full(txs) => Some(txs.as_slice()),
            Payload::Filtered { matched, .. } => Some(matched.as_slice()),
        }
    }
}

/// An orphan header waiting for its parent
#[derive(Debug, Clone)]
pub struct OrphanBlock {
    pub header: Header,
    pub payload: Payload,
    /// Timestamp when this orphan was received
    pub received_at: u64,
    sequence: u64,
}

impl OrphanBlock {
    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn parent_hash(&self) -> Sha256Hash {
        self.header.prev_block_hash
    }

    /// Check if this orphan has expired
    pub fn is_expired(&self, current_time: u64, expiry: u64) -> bool {
        current_time.saturating_sub(self.received_at) > expiry
    }
}

/// Bounded pool of orphans indexed by hash and by the parent they wait for
#[derive(Debug, Clone)]
pub struct OrphanPool {
    orphans: HashMap<Sha256Hash, OrphanBlock>,
    by_parent: HashMap<Sha256Hash, Vec<Sha256Hash>>,
    capacity: usize,
    expiry: u64,
    next_sequence: u64,
}

impl OrphanPool {
    pub fn new(capacity: usize, expiry: u64) -> Self {
        Self {
            orphans: HashMap::new(),
            by_parent: HashMap::new(),
            capacity,
            expiry,
            next_sequence: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.orphans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orphans.is_empty()
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.orphans.contains_key(hash)
    }

    /// Add an orphan, making room first by dropping expired entries and then
    /// the oldest one. Returns `false` if it was already buffered.
    pub fn add(&mut self, header: Header, payload: Payload, current_time: u64) -> bool {
        let hash = header.hash();
        if self.orphans.contains_key(&hash) {
            return false;
        }

        if self.orphans.len() >= self.capacity {
            self.prune(current_time);
        }
        while self.orphans.len() >= self.capacity.max(1) {
            let oldest = self
                .orphans
                .values()
                .min_by_key(|o| (o.received_at, o.sequence))
                .map(OrphanBlock::hash);
            match oldest {
                Some(oldest) => {
                    log::warn!("Orphan pool full, evicting {}", oldest);
                    self.remove(&oldest);
                }
                None => break,
            }
        }

        let parent = header.prev_block_hash;
        let orphan = OrphanBlock {
            header,
            payload,
            received_at: current_time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.orphans.insert(hash, orphan);

        // Index by parent hash
        self.by_parent.entry(parent).or_default().push(hash);
        true
    }

    /// Take every orphan waiting directly on `parent`, in arrival order
    pub fn take_children(&mut self, parent: &Sha256Hash) -> Vec<OrphanBlock> {
        let hashes = self.by_parent.remove(parent).unwrap_or_default();
        let mut children: Vec<OrphanBlock> = hashes
            .iter()
            .filter_map(|h| self.orphans.remove(h))
            .collect();
        children.sort_by_key(|o| o.sequence);
        children
    }

    /// Remove an orphan (when it gets connected)
    pub fn remove(&mut self, hash: &Sha256Hash) -> Option<OrphanBlock> {
        let orphan = self.orphans.remove(hash)?;
        let parent = orphan.parent_hash();
        if let Some(siblings) = self.by_parent.get_mut(&parent) {
            siblings.retain(|h| h != hash);
            if siblings.is_empty() {
                self.by_parent.remove(&parent);
            }
        }
        Some(orphan)
    }

    /// Remove expired orphans
    pub fn prune(&mut self, current_time: u64) -> usize {
        let expired: Vec<Sha256Hash> = self
            .orphans
            .values()
            .filter(|o| o.is_expired(current_time, self.expiry))
            .map(OrphanBlock::hash)
            .collect();

        for hash in &expired {
            self.remove(hash);
        }
        if !expired.is_empty() {
            log::debug!("Pruned {} expired orphans", expired.len());
        }
        expired.len()
    }

    /// Earliest buffered ancestor of the orphan `hash`, which is the header
    /// whose missing parent blocks the whole run
    pub fn root(&self, hash: &Sha256Hash) -> Option<&OrphanBlock> {
        let mut cursor = self.orphans.get(hash)?;
        while let Some(parent) = self.orphans.get(&cursor.parent_hash()) {
            cursor = parent;
        }
        Some(cursor)
    }
}

/// Result of attempting to add a header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    /// Header extended the best chain
    AddedToMainChain,
    /// Header was stored on a branch with less work than the best chain
    AddedToSideChain,
    /// Header made a side branch the best chain
    CausedReorg { disconnected: usize, connected: usize },
    /// Predecessor is unknown; the header is buffered until it arrives
    Orphan,
    /// Header is already part of the chain
    Duplicate,
}

impl BlockStatus {
    /// Whether the best chain advanced
    pub fn advanced_head(&self) -> bool {
        matches!(
            self,
            BlockStatus::AddedToMainChain | BlockStatus::CausedReorg { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BLOCK_VERSION_GENESIS;

    fn header(prev: Sha256Hash, nonce: u32) -> Header {
        Header {
            version: BLOCK_VERSION_GENESIS,
            prev_block_hash: prev,
            merkle_root: Sha256Hash::ZERO,
            time: 1_296_688_602,
            bits: 0x207fffff,
            nonce,
        }
    }

    #[test]
    fn test_orphan_children_and_root() {
        let mut pool = OrphanPool::new(10, 3600);
        let missing = Sha256Hash::of(b"missing");
        let a = header(missing, 1);
        let b = header(a.hash(), 2);
        let c = header(b.hash(), 3);

        assert!(pool.add(c.clone(), Payload::HeaderOnly, 100));
        assert!(pool.add(b.clone(), Payload::HeaderOnly, 100));
        assert!(pool.add(a.clone(), Payload::HeaderOnly, 100));
        assert!(!pool.add(a.clone(), Payload::HeaderOnly, 100));

        assert_eq!(pool.root(&c.hash()).unwrap().hash(), a.hash());
        assert!(pool.root(&missing).is_none());

        let children = pool.take_children(&a.hash());
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].header, b);
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&b.hash()));
    }

    #[test]
    fn test_orphan_expiry() {
        let mut pool = OrphanPool::new(10, 3600);
        let prev = Sha256Hash::of(b"missing");
        pool.add(header(prev, 1), Payload::HeaderOnly, 0);
        pool.add(header(prev, 2), Payload::HeaderOnly, 3000);

        assert_eq!(pool.prune(3601), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_full_pool_evicts_oldest() {
        let mut pool = OrphanPool::new(2, 3600);
        let prev = Sha256Hash::of(b"missing");
        let first = header(prev, 1);
        pool.add(first.clone(), Payload::HeaderOnly, 10);
        pool.add(header(prev, 2), Payload::HeaderOnly, 10);
        pool.add(header(prev, 3), Payload::HeaderOnly, 11);

        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&first.hash()));
        assert_eq!(pool.take_children(&prev).len(), 2);
    }

    #[test]
    fn test_status_advanced_head() {
        assert!(BlockStatus::AddedToMainChain.advanced_head());
        assert!(BlockStatus::CausedReorg { disconnected: 1, connected: 2 }.advanced_head());
        assert!(!BlockStatus::AddedToSideChain.advanced_head());
        assert!(!BlockStatus::Orphan.advanced_head());
        assert!(!BlockStatus::Duplicate.advanced_head());
    }
}
