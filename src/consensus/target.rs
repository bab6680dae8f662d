//! Compact difficulty targets and chain work
//!
//! The `bits` header field packs a 256-bit target into a base-256
//! exponent byte and a 23-bit mantissa. Work is the expected number of
//! hashes needed to meet a target: `2^256 / (target + 1)`.

use crate::crypto::Sha256Hash;
use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};

/// Easiest target the compact encoding can express without setting the sign bit
pub const EASIEST_DIFFICULTY_TARGET: u32 = 0x207f_ffff;

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Expand compact `bits` into a full target.
///
/// Returns `None` for encodings with the sign bit set, which can never be
/// satisfied by a hash.
pub fn decode_compact(bits: u32) -> Option<BigUint> {
    let size = bits >> 24;
    let mut word = bits & MANTISSA_MASK;

    if word != 0 && bits & SIGN_BIT != 0 {
        return None;
    }

    if size <= 3 {
        word >>= 8 * (3 - size);
        Some(BigUint::from(word))
    } else {
        Some(BigUint::from(word) << (8 * (size - 3) as usize))
    }
}

/// Pack a target into compact `bits`, truncating to three mantissa bytes
pub fn encode_compact(target: &BigUint) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let mut size = ((target.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        let low = target.to_u32().unwrap_or(0);
        low << (8 * (3 - size))
    } else {
        let shifted: BigUint = target >> (8 * (size - 3) as usize);
        shifted.to_u32().unwrap_or(0)
    };

    // Keep the mantissa positive by moving a byte into the exponent
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24)
}

/// Work represented by a single header at `target`
pub fn work_for_target(target: &BigUint) -> BigUint {
    let numerator = BigUint::one() << 256usize;
    numerator / (target + BigUint::one())
}

/// Interpret a block hash as the 256-bit number it is compared against
pub fn hash_to_number(hash: &Sha256Hash) -> BigUint {
    BigUint::from_bytes_le(hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mainnet_limit() {
        let target = decode_compact(0x1d00ffff).unwrap();
        let expected = BigUint::from(0xffffu32) << 208usize;
        assert_eq!(target, expected);
    }

    #[test]
    fn test_encode_reverses_decode_for_canonical_bits() {
        for bits in [0x1d00ffffu32, 0x1d07fff8, 0x1b0404cb, 0x207fffff, 0x201fffff, 0x03123456] {
            let target = decode_compact(bits).unwrap();
            assert_eq!(encode_compact(&target), bits, "bits {:08x}", bits);
        }
    }

    #[test]
    fn test_encode_avoids_sign_bit() {
        let target = BigUint::from(0x80u32);
        let bits = encode_compact(&target);
        assert_eq!(bits, 0x0200_8000);
        assert_eq!(decode_compact(bits).unwrap(), target);
    }

    #[test]
    fn test_negative_compact_is_invalid() {
        assert!(decode_compact(0x04923456).is_none());
    }

    #[test]
    fn test_encode_truncates_mantissa() {
        let target = decode_compact(EASIEST_DIFFICULTY_TARGET).unwrap() >> 2usize;
        assert_eq!(encode_compact(&target), 0x201fffff);
    }

    #[test]
    fn test_work_increases_as_target_decreases() {
        let easy = work_for_target(&decode_compact(EASIEST_DIFFICULTY_TARGET).unwrap());
        let hard = work_for_target(&decode_compact(0x1d00ffff).unwrap());

        assert_eq!(easy, BigUint::from(2u32));
        assert_eq!(hard, BigUint::from(0x1_0001_0001u64));
        assert!(hard > easy);
    }

    #[test]
    fn test_hash_to_number_is_little_endian() {
        let mut bytes = [0u8; 32];
        bytes[0] = 1;
        assert_eq!(hash_to_number(&Sha256Hash::from_bytes(bytes)), BigUint::one());
    }
}
