//! Core types for the proof-of-work search
//!
//! Jobs flow in, results and progress events flow out. Field names on the wire
//! are camelCase so collaborators can consume them without renaming.

use crate::worker::compute_hash_rate;
use crate::{Error, HeaderTemplate, Result, Target};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unit of search work, consumed by exactly one `start` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningJob {
    /// Identifier reported by status snapshots and log spans
    pub id: Uuid,
    /// Header template; only the nonce field is varied
    pub header: HeaderTemplate,
    /// Threshold a digest must not exceed
    pub target: Target,
    /// First nonce tried
    pub start_nonce: u32,
    /// Compact bits the target was derived from, if any
    pub difficulty_bits: Option<u32>,
    /// Optional attempt budget; the search ends as exhausted once it is spent
    pub max_attempts: Option<u64>,
}

impl MiningJob {
    /// Create a job with an explicit target
    pub fn new(header: HeaderTemplate, target: Target, start_nonce: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            header,
            target,
            start_nonce,
            difficulty_bits: None,
            max_attempts: None,
        }
    }

    /// Create a job whose target is decoded from compact bits
    pub fn from_compact_bits(header: HeaderTemplate, bits: u32, start_nonce: u32) -> Result<Self> {
        let target = Target::from_compact_bits(bits)?;
        Ok(Self::new(header, target, start_nonce).with_difficulty_bits(bits))
    }

    /// Record the compact bits associated with this job
    pub fn with_difficulty_bits(mut self, bits: u32) -> Self {
        self.difficulty_bits = Some(bits);
        self
    }

    /// Bound the number of hashes the search may compute
    pub fn with_max_attempts(mut self, max_attempts: u64) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Check the job is well-formed before a search begins
    pub fn validate(&self) -> Result<()> {
        if let Some(bits) = self.difficulty_bits {
            Target::from_compact_bits(bits)?;
        }
        if self.max_attempts == Some(0) {
            return Err(Error::config("Attempt budget must be greater than 0"));
        }
        Ok(())
    }
}

/// Serde-friendly job description as supplied by collaborators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    /// Header template as 160 hex characters
    pub header: String,
    /// Target as big-endian hex; takes precedence over `bits`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Compact bits used when no explicit target is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
    #[serde(default)]
    pub start_nonce: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u64>,
}

impl JobRequest {
    /// Decode into a validated [`MiningJob`]
    pub fn into_job(self) -> Result<MiningJob> {
        let header = HeaderTemplate::from_hex(&self.header)?;

        let target = match (&self.target, self.bits) {
            (Some(hex), _) => hex.parse::<Target>()?,
            (None, Some(bits)) => Target::from_compact_bits(bits)?,
            (None, None) => {
                return Err(Error::invalid_target(
                    "Job needs either a target or compact bits",
                ))
            }
        };

        let mut job = MiningJob::new(header, target, self.start_nonce);
        job.difficulty_bits = self.bits;
        job.max_attempts = self.max_attempts;
        job.validate()?;
        Ok(job)
    }
}

/// How a search ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchOutcome {
    Found,
    Exhausted,
    Cancelled,
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchOutcome::Found => write!(f, "found"),
            SearchOutcome::Exhausted => write!(f, "exhausted"),
            SearchOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Engine state machine: `Idle -> Running -> {Found, Exhausted, Cancelled} -> Idle`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchState {
    #[default]
    Idle,
    Running,
    Found,
    Exhausted,
    Cancelled,
}

impl SearchState {
    /// Whether this is one of the terminal states of a search
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchState::Found | SearchState::Exhausted | SearchState::Cancelled
        )
    }
}

impl From<SearchOutcome> for SearchState {
    fn from(outcome: SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Found => SearchState::Found,
            SearchOutcome::Exhausted => SearchState::Exhausted,
            SearchOutcome::Cancelled => SearchState::Cancelled,
        }
    }
}

/// Terminal result of one search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningResult {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u32>,
    #[serde(default, with = "optional_digest", skip_serializing_if = "Option::is_none")]
    pub hash: Option<[u8; 32]>,
    /// Hashes computed, including the successful one
    pub attempts: u64,
    /// Attempts per second over the whole search
    pub hashrate: f64,
    pub outcome: SearchOutcome,
    pub elapsed_seconds: f64,
}

impl MiningResult {
    /// Result for a search that found a solution
    pub fn found(nonce: u32, hash: [u8; 32], attempts: u64, elapsed_seconds: f64) -> Self {
        Self {
            found: true,
            nonce: Some(nonce),
            hash: Some(hash),
            attempts,
            hashrate: compute_hash_rate(attempts, elapsed_seconds),
            outcome: SearchOutcome::Found,
            elapsed_seconds,
        }
    }

    /// Result for a search that ended without a solution
    pub fn not_found(outcome: SearchOutcome, attempts: u64, elapsed_seconds: f64) -> Self {
        Self {
            found: false,
            nonce: None,
            hash: None,
            attempts,
            hashrate: compute_hash_rate(attempts, elapsed_seconds),
            outcome,
            elapsed_seconds,
        }
    }

    /// Digest as hex, if a solution was found
    pub fn hash_hex(&self) -> Option<String> {
        self.hash.map(hex::encode)
    }
}

/// Periodic progress report; not retained after emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub attempts: u64,
    pub hashrate: f64,
    /// Next nonce to be tried
    pub nonce: u32,
    pub elapsed_seconds: f64,
}

impl ProgressEvent {
    pub fn new(attempts: u64, nonce: u32, elapsed_seconds: f64) -> Self {
        Self {
            attempts,
            hashrate: compute_hash_rate(attempts, elapsed_seconds),
            nonce,
            elapsed_seconds,
        }
    }
}

/// Non-blocking snapshot of an engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub is_running: bool,
    pub state: SearchState,
    pub current_job: Option<MiningJob>,
    pub started_at: Option<DateTime<Utc>>,
    /// Outcome of the most recent completed search
    pub last_outcome: Option<SearchOutcome>,
}

mod optional_digest {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(hash) => serializer.serialize_some(&hex::encode(hash)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        value
            .map(|s| {
                let mut hash = [0u8; 32];
                hex::decode_to_slice(&s, &mut hash).map_err(de::Error::custom)?;
                Ok(hash)
            })
            .transpose()
    }
}
