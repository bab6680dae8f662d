//! Consensus wire encoding
//!
//! Little-endian integers, Bitcoin `VarInt` length prefixes and the
//! length-prefixed byte/string helpers shared by headers and transactions.
//! Every length read from the wire is checked against `MAX_MESSAGE_SIZE`
//! before anything is allocated.

use crate::crypto::Sha256Hash;
use bytes::{Buf, BufMut};
use thiserror::Error;

/// Largest payload any single message may declare (32 MiB)
pub const MAX_MESSAGE_SIZE: u64 = 0x0200_0000;

/// Wire decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEof { needed: usize, available: usize },
    #[error("Declared length {length} exceeds maximum of {max}")]
    LengthTooLarge { length: u64, max: u64 },
    #[error("String is not valid UTF-8")]
    InvalidString,
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// Types with a consensus byte encoding
pub trait Encodable {
    fn encode<B: BufMut>(&self, buf: &mut B);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types that can be parsed from their consensus byte encoding
pub trait Decodable: Sized {
    fn decode<B: Buf>(buf: &mut B) -> Result<Self, CodecError>;

    /// Decode a value that must consume `data` exactly
    fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let mut buf = data;
        let value = Self::decode(&mut buf)?;
        if buf.has_remaining() {
            return Err(CodecError::TrailingBytes(buf.remaining()));
        }
        Ok(value)
    }

    fn from_hex(s: &str) -> Result<Self, CodecError> {
        let data = hex::decode(s.trim()).map_err(|e| CodecError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&data)
    }
}

fn ensure<B: Buf>(buf: &B, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::UnexpectedEof {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

pub fn read_u8<B: Buf>(buf: &mut B) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_u16_le<B: Buf>(buf: &mut B) -> Result<u16, CodecError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16_le())
}

pub fn read_u32_le<B: Buf>(buf: &mut B) -> Result<u32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub fn read_u64_le<B: Buf>(buf: &mut B) -> Result<u64, CodecError> {
    ensure(buf, 8)?;
    Ok(buf.get_u64_le())
}

pub fn read_hash<B: Buf>(buf: &mut B) -> Result<Sha256Hash, CodecError> {
    ensure(buf, 32)?;
    let mut bytes = [0u8; 32];
    buf.copy_to_slice(&mut bytes);
    Ok(Sha256Hash::from_bytes(bytes))
}

/// Number of bytes `write_var_int` emits for `value`
pub fn var_int_size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn write_var_int<B: BufMut>(buf: &mut B, value: u64) {
    match value {
        0..=0xfc => buf.put_u8(value as u8),
        0xfd..=0xffff => {
            buf.put_u8(0xfd);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xffff_ffff => {
            buf.put_u8(0xfe);
            buf.put_u32_le(value as u32);
        }
        _ => {
            buf.put_u8(0xff);
            buf.put_u64_le(value);
        }
    }
}

pub fn read_var_int<B: Buf>(buf: &mut B) -> Result<u64, CodecError> {
    match read_u8(buf)? {
        0xfd => Ok(read_u16_le(buf)? as u64),
        0xfe => Ok(read_u32_le(buf)? as u64),
        0xff => read_u64_le(buf),
        n => Ok(n as u64),
    }
}

/// Read a `VarInt` length and reject it if it is larger than the message limit
pub fn read_length<B: Buf>(buf: &mut B) -> Result<usize, CodecError> {
    let length = read_var_int(buf)?;
    if length > MAX_MESSAGE_SIZE {
        return Err(CodecError::LengthTooLarge {
            length,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(length as usize)
}

pub fn write_var_bytes<B: BufMut>(buf: &mut B, data: &[u8]) {
    write_var_int(buf, data.len() as u64);
    buf.put_slice(data);
}

pub fn read_var_bytes<B: Buf>(buf: &mut B) -> Result<Vec<u8>, CodecError> {
    let length = read_length(buf)?;
    ensure(buf, length)?;
    let mut data = vec![0u8; length];
    buf.copy_to_slice(&mut data);
    Ok(data)
}

pub fn write_var_str<B: BufMut>(buf: &mut B, s: &str) {
    write_var_bytes(buf, s.as_bytes());
}

pub fn read_var_str<B: Buf>(buf: &mut B) -> Result<String, CodecError> {
    let data = read_var_bytes(buf)?;
    String::from_utf8(data).map_err(|_| CodecError::InvalidString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_int_sizes() {
        for value in [0u64, 0xfc, 0xfd, 0xffff, 0x1_0000, 0xffff_ffff, u64::MAX] {
            let mut out = Vec::new();
            write_var_int(&mut out, value);
            assert_eq!(out.len(), var_int_size(value));

            let mut buf = out.as_slice();
            assert_eq!(read_var_int(&mut buf).unwrap(), value);
        }
    }

    #[test]
    fn test_var_str_of_extreme_length_is_rejected() {
        let mut payload = Vec::new();
        write_var_int(&mut payload, i32::MAX as u64);

        let mut buf = payload.as_slice();
        let err = read_var_str(&mut buf).unwrap_err();
        assert_eq!(
            err,
            CodecError::LengthTooLarge {
                length: i32::MAX as u64,
                max: MAX_MESSAGE_SIZE
            }
        );
    }

    #[test]
    fn test_var_bytes_of_extreme_length_is_rejected() {
        let mut payload = Vec::new();
        write_var_int(&mut payload, i32::MAX as u64);

        let mut buf = payload.as_slice();
        assert!(matches!(
            read_var_bytes(&mut buf),
            Err(CodecError::LengthTooLarge { .. })
        ));
    }

    #[test]
    fn test_truncated_var_bytes() {
        let mut payload = Vec::new();
        write_var_int(&mut payload, 10);
        payload.extend_from_slice(&[1, 2, 3]);

        let mut buf = payload.as_slice();
        assert_eq!(
            read_var_bytes(&mut buf),
            Err(CodecError::UnexpectedEof {
                needed: 10,
                available: 3
            })
        );
    }

    #[test]
    fn test_var_str() {
        let mut out = Vec::new();
        write_var_str(&mut out, "headerchain");

        let mut buf = out.as_slice();
        assert_eq!(read_var_str(&mut buf).unwrap(), "headerchain");
        assert!(!buf.has_remaining());
    }
}
