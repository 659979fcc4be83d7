//! BSV Proof-of-Work Engine
//!
//! Searches the nonce space of an 80-byte block header for a double SHA-256
//! digest at or below a difficulty target:
//! - Hand-written SHA-256 and double SHA-256
//! - Compact "bits" target decoding and encoding
//! - A cooperative async search engine with progress events and cancellation
//! - A pool hosting several engines over disjoint nonce ranges

pub mod config;
pub mod crypto;
pub mod error;
pub mod header;
pub mod target;
pub mod types;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use crypto::{double_hash256, hash256, Sha256};
pub use error::{Error, Result};
pub use header::{with_nonce, HeaderFields, HeaderTemplate, HEADER_SIZE, NONCE_OFFSET};
pub use target::{compact_bits_to_target, meets_target, target_to_compact_bits, Target};
pub use types::*;
pub use worker::{EngineConfig, EnginePool, SearchEngine};

/// Application information
pub const APP_NAME: &str = "bsv-pow-engine";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
