//! Configuration management for the proof-of-work engine
//!
//! Supports configuration via command line arguments, environment variables,
//! and configuration files (YAML/JSON). Command line values win over file values.

use crate::utils::parse_u32;
use crate::worker::{EngineConfig, DEFAULT_BATCH_SIZE};
use crate::{Error, JobRequest, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(level)
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    Plain,
    /// One JSON object per event
    Json,
}

/// Complete configuration for one search run
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(
    name = "bsv-pow-engine",
    version = env!("CARGO_PKG_VERSION"),
    about = "Double SHA-256 proof-of-work search",
    long_about = "Searches the 32-bit nonce space of an 80-byte block header for a double SHA-256 digest at or below a target"
)]
pub struct Config {
    /// Print the parsed configuration and exit
    #[arg(long)]
    #[serde(default)]
    pub print_config: bool,

    /// Configuration file path (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    #[serde(default)]
    pub config_file: Option<PathBuf>,

    /// Header template as 160 hex characters
    #[arg(long, env = "BSV_POW_HEADER")]
    #[serde(default)]
    pub header: Option<String>,

    /// Target as big-endian hex (takes precedence over --bits)
    #[arg(long)]
    #[serde(default)]
    pub target: Option<String>,

    /// Compact difficulty bits, e.g. 0x1d00ffff
    #[arg(short = 'b', long)]
    #[serde(default)]
    pub bits: Option<String>,

    /// First nonce to try (decimal or 0x-prefixed hex)
    #[arg(short = 's', long, default_value = "0")]
    #[serde(default = "default_start_nonce")]
    pub start_nonce: String,

    /// Stop after this many attempts
    #[arg(short = 'm', long)]
    #[serde(default)]
    pub max_attempts: Option<u64>,

    /// Attempts between yields and progress events
    #[arg(long, default_value = "1000")]
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Number of engines searching disjoint nonce ranges (0 = one per CPU)
    #[arg(short = 'w', long, default_value = "1")]
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Give up after this long, e.g. "30s" or "2m"
    #[arg(long)]
    #[serde(default)]
    pub timeout: Option<String>,

    /// Log level
    #[arg(short = 'l', long, default_value = "info", env = "BSV_POW_LOG_LEVEL")]
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, default_value = "plain")]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Parse the command line, merge the config file if given and validate
    pub async fn load() -> Result<Self> {
        let mut config = Self::parse();

        if let Some(config_file) = &config.config_file {
            let file_config = Self::load_from_file(config_file).await?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;

        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content).map_err(Error::from)
        } else {
            serde_yaml::from_str(&content).map_err(Error::from)
        }
    }

    /// Merge CLI config with file config.
    ///
    /// Unset options and values still at their defaults are taken from the file.
    fn merge_with_file(mut self, file: Self) -> Self {
        self.header = self.header.or(file.header);
        self.target = self.target.or(file.target);
        self.bits = self.bits.or(file.bits);
        self.max_attempts = self.max_attempts.or(file.max_attempts);
        self.timeout = self.timeout.or(file.timeout);

        if self.start_nonce == default_start_nonce() {
            self.start_nonce = file.start_nonce;
        }
        if self.batch_size == default_batch_size() {
            self.batch_size = file.batch_size;
        }
        if self.workers == default_workers() {
            self.workers = file.workers;
        }
        if self.log_level == default_log_level() {
            self.log_level = file.log_level;
        }
        if self.log_format == default_log_format() {
            self.log_format = file.log_format;
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.print_config {
            // Printing a partial configuration is allowed
            return self.validate_settings();
        }

        if self.header.is_none() {
            return Err(Error::config("A header template is required (--header)"));
        }
        if self.target.is_none() && self.bits.is_none() {
            return Err(Error::config("Either --target or --bits is required"));
        }

        self.validate_settings()
    }

    fn validate_settings(&self) -> Result<()> {
        self.engine_config().validate()?;
        self.start_nonce()?;
        self.bits()?;
        self.timeout_duration()?;
        Ok(())
    }

    /// Parsed first nonce
    pub fn start_nonce(&self) -> Result<u32> {
        parse_u32(&self.start_nonce)
    }

    /// Parsed compact bits, if configured
    pub fn bits(&self) -> Result<Option<u32>> {
        self.bits.as_deref().map(parse_u32).transpose()
    }

    /// Parsed timeout, if configured
    pub fn timeout_duration(&self) -> Result<Option<Duration>> {
        self.timeout
            .as_deref()
            .map(|t| {
                humantime::parse_duration(t)
                    .map_err(|e| Error::config(format!("Invalid timeout '{}': {}", t, e)))
            })
            .transpose()
    }

    /// Engine settings
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            batch_size: self.batch_size,
        }
    }

    /// Job request built from the configured header and target
    pub fn job_request(&self) -> Result<JobRequest> {
        let header = self
            .header
            .clone()
            .ok_or_else(|| Error::config("A header template is required (--header)"))?;

        Ok(JobRequest {
            header,
            target: self.target.clone(),
            bits: self.bits()?,
            start_nonce: self.start_nonce()?,
            max_attempts: self.max_attempts,
        })
    }
}

// Default value functions for serde
fn default_start_nonce() -> String { "0".to_string() }
fn default_batch_size() -> u64 { DEFAULT_BATCH_SIZE }
fn default_workers() -> usize { 1 }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_log_format() -> LogFormat { LogFormat::Plain }
