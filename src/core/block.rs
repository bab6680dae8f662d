//! Block headers and blocks
//!
//! A header is the 80-byte consensus-critical part of a block. Its hash is
//! the double SHA-256 of those 80 bytes; a block adds the ordered
//! transaction list the header's merkle root commits to.

use crate::consensus::target::{decode_compact, hash_to_number, work_for_target};
use crate::core::codec::{
    read_hash, read_length, read_u32_le, write_var_int, CodecError, Decodable, Encodable,
};
use crate::core::transaction::{Transaction, FIFTY_COINS};
use crate::crypto::{calculate_merkle_root, Sha256Hash};
use bytes::{Buf, BufMut};
use chrono::{DateTime, TimeZone, Utc};
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

// =============================================================================
// Header Constants
// =============================================================================

/// Block header size in bytes
pub const HEADER_SIZE: usize = 80;

/// Version used by the genesis block and pre-BIP34 blocks
pub const BLOCK_VERSION_GENESIS: u32 = 1;

/// BIP34: height in coinbase
pub const BLOCK_VERSION_BIP34: u32 = 2;

/// BIP66: strict DER signatures
pub const BLOCK_VERSION_BIP66: u32 = 3;

/// BIP65: OP_CHECKLOCKTIMEVERIFY
pub const BLOCK_VERSION_BIP65: u32 = 4;

/// Block header containing the six consensus fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub version: u32,
    pub prev_block_hash: Sha256Hash,
    pub merkle_root: Sha256Hash,
    /// Seconds since the Unix epoch
    pub time: u32,
    /// Difficulty target in compact form
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    /// Calculate the hash of the block header
    pub fn hash(&self) -> Sha256Hash {
        Sha256Hash::of(&self.to_bytes())
    }

    /// Full target decoded from `bits`, `None` if the encoding is negative
    pub fn target(&self) -> Option<BigUint> {
        decode_compact(self.bits)
    }

    /// Work this header contributes to cumulative chain work
    pub fn work(&self) -> BigUint {
        self.target()
            .map(|target| work_for_target(&target))
            .unwrap_or_else(BigUint::zero)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.time as i64, 0)
            .single()
            .unwrap_or_default()
    }

    /// Check if the hash meets the header's own target
    pub fn meets_target(&self) -> bool {
        match self.target() {
            Some(target) => hash_to_number(&self.hash()) <= target,
            None => false,
        }
    }

    /// Search nonces (and, on wrap-around, timestamps) until the header
    /// satisfies its own target. Returns the number of attempts.
    ///
    /// Only practical for the easy targets of test networks.
    pub fn solve(&mut self) -> u64 {
        let mut attempts = 0u64;
        loop {
            attempts += 1;
            if self.meets_target() {
                return attempts;
            }
            if self.nonce == u32::MAX {
                self.time = self.time.wrapping_add(1);
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
    }
}

impl Encodable for Header {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.version);
        buf.put_slice(self.prev_block_hash.as_bytes());
        buf.put_slice(self.merkle_root.as_bytes());
        buf.put_u32_le(self.time);
        buf.put_u32_le(self.bits);
        buf.put_u32_le(self.nonce);
    }
}

impl Decodable for Header {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        Ok(Self {
            version: read_u32_le(buf)?,
            prev_block_hash: read_hash(buf)?,
            merkle_root: read_hash(buf)?,
            time: read_u32_le(buf)?,
            bits: read_u32_le(buf)?,
            nonce: read_u32_le(buf)?,
        })
    }
}

// =============================================================================
// Block
// =============================================================================

/// A header together with its transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    /// Calculate the merkle root from transactions
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Sha256Hash {
        let ids: Vec<Sha256Hash> = transactions.iter().map(Transaction::txid).collect();
        calculate_merkle_root(&ids)
    }

    /// Verify the block's merkle root
    pub fn verify_merkle_root(&self) -> bool {
        Self::calculate_merkle_root(&self.transactions) == self.header.merkle_root
    }

    /// Get the coinbase transaction (first transaction)
    pub fn coinbase_tx(&self) -> Option<&Transaction> {
        self.transactions.first().filter(|tx| tx.is_coinbase())
    }

    /// Build an unsolved block on top of `prev_hash`
    pub fn build(
        prev_hash: Sha256Hash,
        version: u32,
        transactions: Vec<Transaction>,
        time: u32,
        bits: u32,
    ) -> Self {
        let header = Header {
            version,
            prev_block_hash: prev_hash,
            merkle_root: Self::calculate_merkle_root(&transactions),
            time,
            bits,
            nonce: 0,
        };
        Self::new(header, transactions)
    }

    /// Build and solve the successor of `prev`, inheriting its difficulty
    /// and paying a fifty-coin coinbase to `pubkey`
    pub fn create_next(prev: &Header, version: u32, pubkey: &[u8], time: u32, height: u64) -> Self {
        let coinbase = Transaction::coinbase_for_height(height, pubkey, FIFTY_COINS);
        let mut block = Self::build(prev.hash(), version, vec![coinbase], time, prev.bits);
        block.solve();
        block
    }

    /// Replace the difficulty target and re-solve
    pub fn with_bits(mut self, bits: u32) -> Self {
        self.header.bits = bits;
        self.header.nonce = 0;
        self.solve();
        self
    }

    pub fn solve(&mut self) -> u64 {
        self.header.solve()
    }
}

impl Encodable for Block {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        self.header.encode(buf);
        write_var_int(buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            tx.encode(buf);
        }
    }
}

impl Decodable for Block {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let header = Header::decode(buf)?;
        let count = read_length(buf)?;
        let mut transactions = Vec::new();
        for _ in 0..count {
            transactions.push(Transaction::decode(buf)?);
        }
        Ok(Self::new(header, transactions))
    }
}
