//! Difficulty target encoding and comparison
//!
//! Targets are 256-bit unsigned integers held as 32 big-endian bytes. Digests are
//! compared against them with the same interpretation, so a digest with leading
//! zero bytes is numerically small.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compact bits of the difficulty-1 target
pub const DIFFICULTY_ONE_BITS: u32 = 0x1d00ffff;

/// Sign bit inside the compact mantissa
const COMPACT_SIGN_BIT: u32 = 0x0080_0000;

/// Decode compact bits into a 32-byte big-endian target.
///
/// `target = mantissa * 256^(exponent - 3)`, where the exponent is the top byte
/// and the mantissa the low three bytes. Bytes that would land above bit 255 are
/// dropped; use [`Target::from_compact_bits`] to reject such values instead.
pub fn compact_bits_to_target(bits: u32) -> [u8; 32] {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x00ff_ffff;
    let mut target = [0u8; 32];

    if exponent <= 3 {
        let value = mantissa >> (8 * (3 - exponent));
        target[28..].copy_from_slice(&value.to_be_bytes());
        return target;
    }

    // Mantissa bytes, most significant first, land at 32 - exponent onwards.
    for (i, byte) in mantissa.to_be_bytes()[1..].iter().enumerate() {
        let position = 32 + i as isize - exponent as isize;
        if (0..32).contains(&position) {
            target[position as usize] = *byte;
        }
    }
    target
}

/// Encode a 32-byte big-endian target as compact bits.
///
/// The mantissa is normalised so the sign bit is never set; precision below the
/// top three significant bytes is lost.
pub fn target_to_compact_bits(target: &[u8; 32]) -> u32 {
    let first_nonzero = match target.iter().position(|&b| b != 0) {
        Some(index) => index,
        None => return 0,
    };

    let mut exponent = (32 - first_nonzero) as u32;
    let mut mantissa = target[first_nonzero..]
        .iter()
        .take(3)
        .fold(0u32, |acc, &b| (acc << 8) | b as u32);

    // Short targets: left-align into the 3-byte mantissa
    if exponent < 3 {
        mantissa <<= 8 * (3 - exponent);
    }

    if mantissa & COMPACT_SIGN_BIT != 0 {
        mantissa >>= 8;
        exponent += 1;
    }

    (exponent << 24) | (mantissa & 0x007f_ffff)
}

/// Check a digest against a target: true iff `hash <= target` as big-endian integers
#[inline]
pub fn meets_target(hash: &[u8; 32], target: &[u8; 32]) -> bool {
    hash <= target
}

/// A 256-bit proof-of-work target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target([u8; 32]);

impl Target {
    /// Create a target from 32 big-endian bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create a target from a big-endian slice, which must be exactly 32 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::invalid_target(format!(
                "Invalid target length: expected 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Decode compact bits, rejecting negative and overflowing encodings
    pub fn from_compact_bits(bits: u32) -> Result<Self> {
        let exponent = bits >> 24;
        let mantissa = bits & 0x00ff_ffff;

        if mantissa & COMPACT_SIGN_BIT != 0 {
            return Err(Error::invalid_target(format!(
                "Compact bits {:08x} encode a negative target",
                bits
            )));
        }

        let overflows = mantissa != 0
            && (exponent > 34
                || (mantissa > 0xff && exponent > 33)
                || (mantissa > 0xffff && exponent > 32));
        if overflows {
            return Err(Error::invalid_target(format!(
                "Compact bits {:08x} exceed 256 bits",
                bits
            )));
        }

        Ok(Self(compact_bits_to_target(bits)))
    }

    /// Encode as compact bits
    pub fn to_compact_bits(&self) -> u32 {
        target_to_compact_bits(&self.0)
    }

    /// Target bytes in big-endian order
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if a digest meets this target
    #[inline]
    pub fn is_met_by(&self, hash: &[u8; 32]) -> bool {
        meets_target(hash, &self.0)
    }

    /// Maximum possible target (every digest meets it)
    pub fn max() -> Self {
        Self([0xff; 32])
    }

    /// Minimum possible target (only the all-zero digest meets it)
    pub fn min() -> Self {
        Self([0; 32])
    }

    /// Number of leading zero bits a digest needs at minimum
    pub fn leading_zero_bits(&self) -> u32 {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }

    /// Difficulty relative to the difficulty-1 target
    pub fn difficulty(&self) -> f64 {
        let current = to_f64(&self.0);
        if current == 0.0 {
            return f64::INFINITY;
        }
        to_f64(&compact_bits_to_target(DIFFICULTY_ONE_BITS)) / current
    }

    /// Big-endian hexadecimal (64 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

fn to_f64(bytes: &[u8; 32]) -> f64 {
    bytes.iter().fold(0.0, |acc, &b| acc * 256.0 + b as f64)
}

impl FromStr for Target {
    type Err = Error;

    /// Parse a big-endian hex value of up to 64 digits, optionally `0x`-prefixed.
    /// Shorter values are zero-extended on the left.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > 64 {
            return Err(Error::invalid_target(format!(
                "Invalid target hex length: expected 1-64 chars, got {}",
                digits.len()
            )));
        }

        let padded = format!("{:0>64}", digits);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&padded, &mut bytes)
            .map_err(|e| Error::invalid_target(format!("Invalid hex in target: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Target {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Target::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    /// Add a small signed delta to a 256-bit big-endian value
    fn offset(mut value: [u8; 32], delta: i8) -> [u8; 32] {
        if delta >= 0 {
            for _ in 0..delta {
                for byte in value.iter_mut().rev() {
                    let (next, carry) = byte.overflowing_add(1);
                    *byte = next;
                    if !carry {
                        break;
                    }
                }
            }
        } else {
            for _ in 0..(-delta) {
                for byte in value.iter_mut().rev() {
                    let (next, borrow) = byte.overflowing_sub(1);
                    *byte = next;
                    if !borrow {
                        break;
                    }
                }
            }
        }
        value
    }

    #[test]
    fn test_genesis_bits() {
        let target = compact_bits_to_target(0x1d00ffff);
        assert_eq!(&target[..4], &[0, 0, 0, 0]);
        assert_eq!(target[4], 0xff);
        assert_eq!(target[5], 0xff);
        assert!(target[6..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_high_difficulty_bits() {
        let target = compact_bits_to_target(0x17034219);
        assert!(target[..9].iter().all(|&b| b == 0));
        assert_eq!(&target[9..12], &[0x03, 0x42, 0x19]);
        assert!(target[12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_small_exponents() {
        // exponent 1: mantissa shifted right by two bytes
        assert_eq!(compact_bits_to_target(0x01123456)[31], 0x12);
        // exponent 2: mantissa shifted right by one byte
        let target = compact_bits_to_target(0x02123456);
        assert_eq!(&target[30..], &[0x12, 0x34]);
        // exponent 3: mantissa as-is
        let target = compact_bits_to_target(0x03123456);
        assert_eq!(&target[29..], &[0x12, 0x34, 0x56]);
        // exponent 0 is always zero
        assert_eq!(compact_bits_to_target(0x00ffffff), [0u8; 32]);
    }

    #[test]
    fn test_truncation_above_256_bits() {
        // exponent 33 pushes the top mantissa byte past bit 255
        let target = compact_bits_to_target(0x21123456);
        assert_eq!(&target[..2], &[0x34, 0x56]);
    }

    #[test]
    fn test_from_compact_bits_validation() {
        assert!(Target::from_compact_bits(0x1d00ffff).is_ok());
        assert!(Target::from_compact_bits(0x2100ffff).is_ok());
        assert_matches!(
            Target::from_compact_bits(0x1d80ffff),
            Err(Error::InvalidTarget { .. })
        );
        assert_matches!(
            Target::from_compact_bits(0x21123456),
            Err(Error::InvalidTarget { .. })
        );
        assert_matches!(
            Target::from_compact_bits(0x23000001),
            Err(Error::InvalidTarget { .. })
        );
        // zero mantissa never overflows
        assert_eq!(Target::from_compact_bits(0xff000000).unwrap(), Target::min());
    }

    #[test]
    fn test_bits_roundtrip() {
        for bits in [0x1d00ffff, 0x17034219, 0x1b0404cb, 0x207fffff] {
            let target = compact_bits_to_target(bits);
            assert_eq!(target_to_compact_bits(&target), bits, "bits {:08x}", bits);
        }
    }

    #[test]
    fn test_meets_target_boundaries() {
        let target = compact_bits_to_target(0x1d00ffff);

        assert!(meets_target(&target, &target));
        assert!(meets_target(&offset(target, -1), &target));
        assert!(!meets_target(&offset(target, 1), &target));
        assert!(meets_target(&[0u8; 32], &target));
        assert!(meets_target(&[0xff; 32], &[0xff; 32]));
        assert!(meets_target(&[0u8; 32], &[0u8; 32]));
        assert!(!meets_target(&offset([0u8; 32], 1), &[0u8; 32]));
    }

    #[test]
    fn test_leading_zero_bytes_are_significant() {
        let mut target = [0u8; 32];
        target[1] = 0x01;
        let mut hash = [0xffu8; 32];
        hash[0] = 0x00;
        hash[1] = 0x00;
        assert!(meets_target(&hash, &target));
    }

    #[test]
    fn test_target_hex_parsing() {
        let target: Target = "ff".parse().unwrap();
        assert_eq!(target.as_bytes()[31], 0xff);
        assert!(target.as_bytes()[..31].iter().all(|&b| b == 0));

        let full = "00000000ffff0000000000000000000000000000000000000000000000000000";
        let target: Target = full.parse().unwrap();
        assert_eq!(target.to_compact_bits(), 0x1d00ffff);
        assert_eq!(target.to_string(), full);

        let prefixed: Target = format!("0x{}", full).parse().unwrap();
        assert_eq!(prefixed, target);

        assert!("zz".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
        assert!("0".repeat(65).parse::<Target>().is_err());
    }

    #[test]
    fn test_target_serde() {
        let target = Target::from_compact_bits(0x1d00ffff).unwrap();
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, format!("\"{}\"", target.to_hex()));
        let parsed: Target = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, target);
    }

    #[test]
    fn test_difficulty() {
        let genesis = Target::from_compact_bits(0x1d00ffff).unwrap();
        assert!((genesis.difficulty() - 1.0).abs() < 1e-9);
        assert_eq!(genesis.leading_zero_bits(), 32);
        assert!(Target::min().difficulty().is_infinite());
        assert_eq!(Target::max().leading_zero_bits(), 0);
    }

    proptest! {
        #[test]
        fn prop_meets_target_is_numeric_order(hash in any::<[u8; 32]>(), target in any::<[u8; 32]>()) {
            let as_words = |bytes: &[u8; 32]| {
                let mut high = [0u8; 16];
                let mut low = [0u8; 16];
                high.copy_from_slice(&bytes[..16]);
                low.copy_from_slice(&bytes[16..]);
                (u128::from_be_bytes(high), u128::from_be_bytes(low))
            };
            prop_assert_eq!(meets_target(&hash, &target), as_words(&hash) <= as_words(&target));
            prop_assert_eq!(meets_target(&hash, &target), Target::new(target).is_met_by(&hash));
        }

        #[test]
        fn prop_compact_roundtrip_is_stable(bits in any::<u32>().prop_map(|b| b & !COMPACT_SIGN_BIT)) {
            // Re-encoding a decoded target and decoding again is a fixed point
            let target = compact_bits_to_target(bits);
            let reencoded = target_to_compact_bits(&target);
            prop_assert_eq!(compact_bits_to_target(reencoded), target);
        }
    }
}
