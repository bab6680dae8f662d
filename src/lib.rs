//! Headerchain: header-chain validation and best-chain selection for
//! Bitcoin-style proof-of-work ledgers
//!
//! This crate provides:
//! - Per-network consensus parameters with verified genesis blocks
//! - Proof-of-work, difficulty retarget and version-majority checks
//! - Most-work chain selection with orphan buffering and reorganizations
//! - Block listeners, height futures and bloom false-positive estimation
//! - In-memory and append-only JSON header stores
//!
//! # Example
//!
//! ```no_run
//! use headerchain::{BlockChain, MemoryBlockStore, Network, ParamsRegistry};
//!
//! let registry = ParamsRegistry::new();
//! let params = registry.get(Network::Mainnet).unwrap();
//! let store = MemoryBlockStore::new(params.genesis_header());
//! let chain = BlockChain::new(params, store).unwrap();
//!
//! println!("Head at height {}", chain.best_chain_height());
//! ```

pub mod chain;
pub mod cli;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod params;
pub mod storage;

// Re-export commonly used types
pub use chain::{
    BlockChain, BlockEvent, BlockStatus, ChainConfig, ChainError, ChainListener, FilteredBlock,
    HeightFuture, ListenerId, NotificationReason,
};
pub use consensus::{DifficultyRules, VerificationError};
pub use core::{Block, Header, Transaction};
pub use crypto::Sha256Hash;
pub use params::{Network, NetworkParameters, ParamsError, ParamsRegistry};
pub use storage::{BlockStore, FileBlockStore, MemoryBlockStore, StoreError, StoredHeader};
