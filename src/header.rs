//! Block header templates and nonce substitution
//!
//! An 80-byte header in wire order:
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 4    | version (LE)     |
//! | 4      | 32   | previous block   |
//! | 36     | 32   | merkle root      |
//! | 68     | 4    | timestamp (LE)   |
//! | 72     | 4    | compact bits (LE)|
//! | 76     | 4    | nonce (LE)       |

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Header length in bytes
pub const HEADER_SIZE: usize = 80;

/// Offset of the nonce field
pub const NONCE_OFFSET: usize = HEADER_SIZE - 4;

/// Return a copy of `template` with the nonce field set to `nonce` (little-endian).
///
/// The first 76 bytes are copied unchanged. Fails if `template` is not 80 bytes.
pub fn with_nonce(template: &[u8], nonce: u32) -> Result<[u8; HEADER_SIZE]> {
    let mut header: [u8; HEADER_SIZE] = template.try_into().map_err(|_| {
        Error::invalid_header(format!(
            "Invalid header size: expected {} bytes, got {}",
            HEADER_SIZE,
            template.len()
        ))
    })?;
    LittleEndian::write_u32(&mut header[NONCE_OFFSET..], nonce);
    Ok(header)
}

/// An 80-byte header template; only the nonce varies between attempts
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderTemplate([u8; HEADER_SIZE]);

impl HeaderTemplate {
    /// Create a template from raw bytes, which must be exactly 80 bytes
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let array: [u8; HEADER_SIZE] = bytes.try_into().map_err(|_| {
            Error::invalid_header(format!(
                "Invalid header size: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Create a template from 160 hex characters
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| Error::invalid_header(format!("Invalid hex in header: {}", e)))?;
        Self::new(&bytes)
    }

    /// Header bytes
    pub fn bytes(&self) -> &[u8; HEADER_SIZE] {
        &self.0
    }

    /// Build the header for one attempt
    #[inline]
    pub fn with_nonce(&self, nonce: u32) -> [u8; HEADER_SIZE] {
        let mut header = self.0;
        LittleEndian::write_u32(&mut header[NONCE_OFFSET..], nonce);
        header
    }

    /// Block version
    pub fn version(&self) -> i32 {
        LittleEndian::read_i32(&self.0[0..4])
    }

    /// Previous block hash (internal byte order)
    pub fn prev_block_hash(&self) -> [u8; 32] {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&self.0[4..36]);
        hash
    }

    /// Merkle root (internal byte order)
    pub fn merkle_root(&self) -> [u8; 32] {
        let mut root = [0u8; 32];
        root.copy_from_slice(&self.0[36..68]);
        root
    }

    /// Block timestamp (Unix seconds)
    pub fn timestamp(&self) -> u32 {
        LittleEndian::read_u32(&self.0[68..72])
    }

    /// Compact difficulty bits
    pub fn bits(&self) -> u32 {
        LittleEndian::read_u32(&self.0[72..76])
    }

    /// Nonce currently stored in the template
    pub fn nonce(&self) -> u32 {
        LittleEndian::read_u32(&self.0[NONCE_OFFSET..])
    }

    /// Hexadecimal encoding (160 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for HeaderTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderTemplate")
            .field("version", &self.version())
            .field("timestamp", &self.timestamp())
            .field("bits", &format_args!("{:08x}", self.bits()))
            .field("nonce", &self.nonce())
            .finish()
    }
}

impl fmt::Display for HeaderTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for HeaderTemplate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for HeaderTemplate {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HeaderTemplate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HeaderTemplate::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Header fields, serialised into a [`HeaderTemplate`] in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderFields {
    pub version: i32,
    pub prev_block_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl HeaderFields {
    /// Serialize to an 80-byte template
    pub fn to_template(&self) -> HeaderTemplate {
        let mut header = [0u8; HEADER_SIZE];
        LittleEndian::write_i32(&mut header[0..4], self.version);
        header[4..36].copy_from_slice(&self.prev_block_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        LittleEndian::write_u32(&mut header[68..72], self.timestamp);
        LittleEndian::write_u32(&mut header[72..76], self.bits);
        LittleEndian::write_u32(&mut header[76..80], self.nonce);
        HeaderTemplate(header)
    }
}

impl From<&HeaderTemplate> for HeaderFields {
    fn from(template: &HeaderTemplate) -> Self {
        Self {
            version: template.version(),
            prev_block_hash: template.prev_block_hash(),
            merkle_root: template.merkle_root(),
            timestamp: template.timestamp(),
            bits: template.bits(),
            nonce: template.nonce(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    const GENESIS_HEADER: &str = "0100000000000000000000000000000000000000000000000000000000000000\
                                  000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa\
                                  4b1e5e4a29ab5f49ffff001d1dac2b7c";

    #[test]
    fn test_with_nonce_layout() {
        let template = [0x11u8; HEADER_SIZE];
        let header = with_nonce(&template, 0xDEADBEEF).unwrap();
        assert_eq!(&header[..NONCE_OFFSET], &template[..NONCE_OFFSET]);
        assert_eq!(&header[NONCE_OFFSET..], &[0xEF, 0xBE, 0xAD, 0xDE]);
        // input untouched
        assert_eq!(template, [0x11u8; HEADER_SIZE]);
    }

    #[test]
    fn test_with_nonce_rejects_wrong_length() {
        assert_matches!(with_nonce(&[0u8; 79], 1), Err(Error::InvalidHeader { .. }));
        assert_matches!(with_nonce(&[0u8; 81], 1), Err(Error::InvalidHeader { .. }));
        assert_matches!(with_nonce(&[], 1), Err(Error::InvalidHeader { .. }));
    }

    #[test]
    fn test_template_from_hex() {
        let template = HeaderTemplate::from_hex(GENESIS_HEADER).unwrap();
        assert_eq!(template.version(), 1);
        assert_eq!(template.prev_block_hash(), [0u8; 32]);
        assert_eq!(template.timestamp(), 1231006505);
        assert_eq!(template.bits(), 0x1d00ffff);
        assert_eq!(template.nonce(), 2083236893);
        assert_eq!(template.to_hex(), GENESIS_HEADER);

        assert_matches!(
            HeaderTemplate::from_hex(&GENESIS_HEADER[..158]),
            Err(Error::InvalidHeader { .. })
        );
        assert_matches!(
            HeaderTemplate::from_hex("zz"),
            Err(Error::InvalidHeader { .. })
        );
    }

    #[test]
    fn test_fields_roundtrip() {
        let template = HeaderTemplate::from_hex(GENESIS_HEADER).unwrap();
        let fields = HeaderFields::from(&template);
        assert_eq!(fields.to_template(), template);
    }

    #[test]
    fn test_fields_serialization() {
        let fields = HeaderFields {
            version: 0x20000000,
            prev_block_hash: [0x12; 32],
            merkle_root: [0x34; 32],
            timestamp: 1700000000,
            bits: 0x17034219,
            nonce: 0,
        };
        let template = fields.to_template();
        let bytes = template.bytes();
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x00, 0x20]);
        assert_eq!(&bytes[4..36], &[0x12; 32]);
        assert_eq!(&bytes[36..68], &[0x34; 32]);
        assert_eq!(&bytes[72..76], &[0x19, 0x42, 0x03, 0x17]);
    }

    #[test]
    fn test_template_serde() {
        let template = HeaderTemplate::from_hex(GENESIS_HEADER).unwrap();
        let json = serde_json::to_string(&template).unwrap();
        let parsed: HeaderTemplate = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, template);
    }

    proptest! {
        #[test]
        fn prop_with_nonce_preserves_prefix(
            template in proptest::collection::vec(any::<u8>(), HEADER_SIZE),
            nonce in any::<u32>(),
        ) {
            let header = with_nonce(&template, nonce).unwrap();
            prop_assert_eq!(&header[..NONCE_OFFSET], &template[..NONCE_OFFSET]);
            prop_assert_eq!(LittleEndian::read_u32(&header[NONCE_OFFSET..]), nonce);

            let typed = HeaderTemplate::new(&template).unwrap();
            prop_assert_eq!(typed.with_nonce(nonce), header);
        }
    }
}
