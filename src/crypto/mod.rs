//! Cryptographic utilities for the header chain
//!
//! This module provides:
//! - SHA-256 and double SHA-256 hashing
//! - The `Sha256Hash` digest type
//! - Merkle root calculation

pub mod hash;
pub mod merkle;

pub use hash::{double_sha256, sha256, sha256_hex, Sha256Hash};
pub use merkle::calculate_merkle_root;
