//! Header storage
//!
//! `BlockStore` is the persistence contract the chain engine runs on.
//! `MemoryBlockStore` is the reference implementation, `FileBlockStore`
//! the durable one.

pub mod persistence;
pub mod store;

pub use persistence::{FileBlockStore, FileStoreConfig, StoreStats};
pub use store::{BlockStore, MemoryBlockStore, StoreError, StoredHeader};
