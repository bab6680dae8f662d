//! Header chain selection
//!
//! The chain engine and everything it owns: orphan buffering, listener
//! notification, height futures and the false-positive estimate used by
//! filtered sync.

pub mod chain_state;
pub mod engine;
pub mod error;
pub mod false_positive;
pub mod future;
pub mod listener;

pub use chain_state::{
    BlockStatus, ChainConfig, OrphanBlock, OrphanPool, Payload, MAX_FUTURE_BLOCK_TIME,
    MAX_ORPHAN_BLOCKS, ORPHAN_BLOCK_EXPIRE_TIME,
};
pub use engine::{BlockChain, FilteredBlock};
pub use error::{ChainError, ListenerFailure};
pub use false_positive::{FalsePositiveEstimator, FP_ESTIMATOR_ALPHA, FP_ESTIMATOR_BETA};
pub use future::{Canceled, HeightFuture};
pub use listener::{
    BlockEvent, ChainListener, ListenerId, ListenerResult, NotificationReason,
};
