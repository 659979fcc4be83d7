//! Utility functions and helpers
//!
//! Formatting and parsing used by the command line front end.

use crate::{Error, Result};

/// Format hash rate as a human-readable string
pub fn format_hash_rate(hashes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["H/s", "KH/s", "MH/s", "GH/s", "TH/s"];
    let mut rate = hashes_per_sec;
    let mut unit = 0;

    while rate >= 1000.0 && unit < UNITS.len() - 1 {
        rate /= 1000.0;
        unit += 1;
    }

    format!("{:.2} {}", rate, UNITS[unit])
}

/// Format elapsed seconds, keeping sub-second precision for short searches
pub fn format_elapsed(seconds: f64) -> String {
    if seconds < 1.0 {
        return format!("{:.0}ms", seconds * 1000.0);
    }
    if seconds < 60.0 {
        return format!("{:.2}s", seconds);
    }

    let whole = seconds as u64;
    if whole < 3600 {
        format!("{}m {}s", whole / 60, whole % 60)
    } else {
        format!("{}h {}m {}s", whole / 3600, (whole % 3600) / 60, whole % 60)
    }
}

/// Parse a `u32` given as decimal or as hex with a `0x` prefix.
///
/// Compact bits are conventionally written in hex (`0x1d00ffff`), nonces in decimal.
pub fn parse_u32(value: &str) -> Result<u32> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| Error::config(format!("Invalid 32-bit value '{}': {}", value, e)))
}

/// Hex of a digest in the byte-reversed order block explorers display
pub fn display_hash(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}
