//! Chain event listeners
//!
//! Listeners are called synchronously, in registration order, from the
//! thread that changed the chain. A callback may query the chain but must
//! not add headers to it.

use crate::core::Transaction;
use crate::storage::StoredHeader;
use std::error::Error;
use std::fmt;

pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Handle returned by `BlockChain::add_listener`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Why a block is being delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationReason {
    /// The block is (or, when disconnected, was) part of the best chain
    NewBestChain,
    /// The block was stored on a branch with less work than the best chain
    SideChain,
}

/// One block inside a notification batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEvent {
    pub block: StoredHeader,
    /// Present when the header was added with its (possibly filtered) body
    pub transactions: Option<Vec<Transaction>>,
    pub reason: NotificationReason,
    /// Position of the block within its batch
    pub relativity_offset: usize,
}

impl BlockEvent {
    pub fn height(&self) -> u64 {
        self.block.height()
    }
}

pub trait ChainListener: Send + Sync {
    /// Blocks joined the chain, ordered lowest height first
    fn on_blocks_connected(&self, blocks: &[BlockEvent]) -> ListenerResult;

    /// Blocks left the best chain during a reorganization, ordered highest
    /// height first
    fn on_blocks_disconnected(&self, _blocks: &[BlockEvent]) -> ListenerResult {
        Ok(())
    }

    /// Height of the last block this listener processed, if it tracks one.
    ///
    /// A listener that reports a height below the chain head when it is
    /// registered causes the head to roll back to that height, so the
    /// blocks it missed are delivered again as they are re-added.
    fn last_seen_height(&self) -> Option<u64> {
        None
    }
}

impl<F> ChainListener for F
where
    F: Fn(&[BlockEvent]) -> ListenerResult + Send + Sync,
{
    fn on_blocks_connected(&self, blocks: &[BlockEvent]) -> ListenerResult {
        self(blocks)
    }
}
