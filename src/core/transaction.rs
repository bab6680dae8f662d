//! Transactions carried in block bodies
//!
//! The chain engine never interprets scripts. It only needs transaction
//! IDs for merkle commitments, coinbase detection for body sanity checks
//! and coinbase maturity, and enough structure to build the genesis block.

use crate::core::codec::{
    read_hash, read_length, read_u32_le, read_u64_le, read_var_bytes, write_var_bytes,
    write_var_int, CodecError, Decodable, Encodable,
};
use crate::crypto::Sha256Hash;
use bytes::{Buf, BufMut};

// =============================================================================
// Constants
// =============================================================================

/// Satoshis per coin
pub const COIN: u64 = 100_000_000;

/// Genesis and early-era block subsidy
pub const FIFTY_COINS: u64 = 50 * COIN;

/// Sequence number that disables locktime
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Output index used by the null outpoint of a coinbase input
pub const COINBASE_OUTPUT_INDEX: u32 = 0xFFFF_FFFF;

/// `OP_CHECKSIG`
pub const OP_CHECKSIG: u8 = 0xac;

/// Largest push that still uses a single length byte
const MAX_DIRECT_PUSH: usize = 0x4b;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Reference to an output of an earlier transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub hash: Sha256Hash,
    pub index: u32,
}

impl OutPoint {
    /// The outpoint a coinbase input spends
    pub fn null() -> Self {
        Self {
            hash: Sha256Hash::ZERO,
            index: COINBASE_OUTPUT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash.is_zero() && self.index == COINBASE_OUTPUT_INDEX
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInput {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutput {
    /// Value in satoshis
    pub value: u64,
    pub script_pubkey: Vec<u8>,
}

// =============================================================================
// Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Build a coinbase transaction with an explicit scriptSig
    pub fn coinbase(script_sig: Vec<u8>, value: u64, script_pubkey: Vec<u8>) -> Self {
        Self {
            version: 1,
            inputs: vec![TransactionInput {
                previous_output: OutPoint::null(),
                script_sig,
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TransactionOutput {
                value,
                script_pubkey,
            }],
            lock_time: 0,
        }
    }

    /// Build a coinbase paying `value` to `pubkey` whose scriptSig commits to
    /// `height`, so coinbases at different heights have distinct IDs
    pub fn coinbase_for_height(height: u64, pubkey: &[u8], value: u64) -> Self {
        let mut script_sig = Vec::new();
        push_data(&mut script_sig, &height.to_le_bytes());
        Self::coinbase(script_sig, value, pay_to_pubkey_script(pubkey))
    }

    /// Transaction ID (double SHA-256 of the serialized transaction)
    pub fn txid(&self) -> Sha256Hash {
        Sha256Hash::of(&self.to_bytes())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

/// `<pubkey> OP_CHECKSIG`
pub fn pay_to_pubkey_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    push_data(&mut script, pubkey);
    script.push(OP_CHECKSIG);
    script
}

/// Append a minimal data push to `script`
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        len if len <= MAX_DIRECT_PUSH => script.push(len as u8),
        len if len <= 0xff => {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
        }
        len => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

// =============================================================================
// Wire Encoding
// =============================================================================

impl Encodable for TransactionInput {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(self.previous_output.hash.as_bytes());
        buf.put_u32_le(self.previous_output.index);
        write_var_bytes(buf, &self.script_sig);
        buf.put_u32_le(self.sequence);
    }
}

impl Decodable for TransactionInput {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let hash = read_hash(buf)?;
        let index = read_u32_le(buf)?;
        let script_sig = read_var_bytes(buf)?;
        let sequence = read_u32_le(buf)?;
        Ok(Self {
            previous_output: OutPoint { hash, index },
            script_sig,
            sequence,
        })
    }
}

impl Encodable for TransactionOutput {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u64_le(self.value);
        write_var_bytes(buf, &self.script_pubkey);
    }
}

impl Decodable for TransactionOutput {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let value = read_u64_le(buf)?;
        let script_pubkey = read_var_bytes(buf)?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

impl Encodable for Transaction {
    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u32_le(self.version);
        write_var_int(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            input.encode(buf);
        }
        write_var_int(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(buf);
        }
        buf.put_u32_le(self.lock_time);
    }
}

impl Decodable for Transaction {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError> {
        let version = read_u32_le(buf)?;

        let input_count = read_length(buf)?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            inputs.push(TransactionInput::decode(buf)?);
        }

        let output_count = read_length(buf)?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            outputs.push(TransactionOutput::decode(buf)?);
        }

        let lock_time = read_u32_le(buf)?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coinbase_detection() {
        let tx = Transaction::coinbase_for_height(1, &[0x02; 33], FIFTY_COINS);
        assert!(tx.is_coinbase());
        assert_eq!(tx.total_output(), FIFTY_COINS);

        let mut spend = tx.clone();
        spend.inputs[0].previous_output = OutPoint {
            hash: tx.txid(),
            index: 0,
        };
        assert!(!spend.is_coinbase());
    }

    #[test]
    fn test_coinbase_ids_differ_by_height() {
        let a = Transaction::coinbase_for_height(1, &[0x02; 33], FIFTY_COINS);
        let b = Transaction::coinbase_for_height(2, &[0x02; 33], FIFTY_COINS);
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn test_decode_reencodes_identically() {
        let tx = Transaction::coinbase_for_height(7, &[0x03; 33], 12 * COIN);
        let bytes = tx.to_bytes();
        let decoded = Transaction::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.txid(), tx.txid());
    }

    #[test]
    fn test_truncated_transaction_fails() {
        let bytes = Transaction::coinbase_for_height(7, &[0x03; 33], COIN).to_bytes();
        assert!(Transaction::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_push_data_lengths() {
        let mut script = Vec::new();
        push_data(&mut script, &[0xaa; 65]);
        assert_eq!(script[0], 65);
        assert_eq!(script.len(), 66);

        let mut long = Vec::new();
        push_data(&mut long, &[0xbb; 80]);
        assert_eq!(&long[..2], &[OP_PUSHDATA1, 80]);
    }
}
