//! Chain engine errors

use crate::chain::listener::ListenerId;
use crate::consensus::VerificationError;
use crate::params::ParamsError;
use crate::storage::StoreError;
use thiserror::Error;

/// A listener callback that returned an error during a notification batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub listener: ListenerId,
    pub message: String,
}

/// Chain errors
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Verification failed: {0}")]
    Verification(#[from] VerificationError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Parameters error: {0}")]
    Params(#[from] ParamsError),
    /// The chain change was committed but some listeners failed to process it
    #[error("{} listener notification(s) failed", .failures.len())]
    ListenerNotification { failures: Vec<ListenerFailure> },
    #[error("Chain mutated from inside a listener callback")]
    ReentrantMutation,
}

impl ChainError {
    /// The verification failure behind this error, if that is what it is
    pub fn verification(&self) -> Option<&VerificationError> {
        match self {
            ChainError::Verification(e) => Some(e),
            _ => None,
        }
    }
}
