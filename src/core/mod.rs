//! Core wire types
//!
//! This module contains the data the chain engine consumes:
//! - Consensus codec (little-endian integers, `VarInt`, bounded reads)
//! - Transactions (only what merkle commitments and coinbase checks need)
//! - Headers and blocks

pub mod block;
pub mod codec;
pub mod transaction;

pub use block::{
    Block, Header, BLOCK_VERSION_BIP34, BLOCK_VERSION_BIP65, BLOCK_VERSION_BIP66,
    BLOCK_VERSION_GENESIS, HEADER_SIZE,
};
pub use codec::{CodecError, Decodable, Encodable, MAX_MESSAGE_SIZE};
pub use transaction::{
    OutPoint, Transaction, TransactionInput, TransactionOutput, COIN, FIFTY_COINS,
};
