//! Cooperative proof-of-work search engine
//!
//! The search loop hashes one nonce per iteration and yields to the tokio
//! scheduler every `batch_size` attempts, emitting a [`ProgressEvent`] each time.
//! Cancellation is checked at the top of every iteration and right after each
//! yield, so a `stop()` issued while the loop is suspended ends the search
//! before another hash is computed.

use super::{compute_hash_rate, search_span, ProgressSender, DEFAULT_BATCH_SIZE};
use crate::crypto::double_hash256;
use crate::{
    EngineStatus, Error, MiningJob, MiningResult, ProgressEvent, Result, SearchOutcome,
    SearchState,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Search engine tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts between yield points and progress events
    pub batch_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("Batch size must be greater than 0"));
        }
        Ok(())
    }
}

/// Mutable engine state, only touched under the lock and never across an await
#[derive(Debug, Default)]
struct EngineInner {
    state: SearchState,
    job: Option<MiningJob>,
    started_at: Option<DateTime<Utc>>,
    cancellation: Option<CancellationToken>,
    last_outcome: Option<SearchOutcome>,
}

/// Single-search proof-of-work engine.
///
/// Share it behind an `Arc` to call [`stop`](Self::stop) or
/// [`status`](Self::status) from a controller while [`start`](Self::start) is
/// suspended.
#[derive(Debug)]
pub struct SearchEngine {
    config: EngineConfig,
    inner: Mutex<EngineInner>,
    progress: Option<ProgressSender>,
}

impl SearchEngine {
    /// Create an engine with the default batch size
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            inner: Mutex::new(EngineInner::default()),
            progress: None,
        }
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    /// Deliver progress events to `progress`
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a search to completion.
    ///
    /// Fails without entering `Running` if a search is already in progress or the
    /// job is malformed. Otherwise returns once a solution is found, the nonce
    /// space or attempt budget is exhausted, or [`stop`](Self::stop) is called.
    pub async fn start(&self, job: MiningJob) -> Result<MiningResult> {
        self.start_with_cancellation(job, &CancellationToken::new()).await
    }

    /// Run a search that also ends when `parent` is cancelled.
    ///
    /// Unlike [`stop`](Self::stop), `parent` can be cancelled before the search
    /// enters `Running`; the search then ends as `Cancelled` without hashing.
    pub async fn start_with_cancellation(
        &self,
        job: MiningJob,
        parent: &CancellationToken,
    ) -> Result<MiningResult> {
        let cancellation = parent.child_token();
        self.enter_running(&job, &cancellation)?;
        let _guard = RunGuard { inner: &self.inner };

        let span = search_span(&job.id, job.start_nonce);
        let result = self.search(&job, &cancellation).instrument(span).await;

        {
            let mut inner = self.inner.lock();
            inner.state = result.outcome.into();
            inner.last_outcome = Some(result.outcome);
        }
        info!(
            job_id = %job.id,
            outcome = %result.outcome,
            attempts = result.attempts,
            hashrate = result.hashrate,
            "Search finished"
        );

        Ok(result)
    }

    /// Request cancellation of the running search; no effect when idle
    pub fn stop(&self) {
        let inner = self.inner.lock();
        if inner.state != SearchState::Running {
            return;
        }
        if let Some(cancellation) = &inner.cancellation {
            if !cancellation.is_cancelled() {
                info!("Stopping search");
            }
            cancellation.cancel();
        }
    }

    /// Snapshot of the engine state
    pub fn status(&self) -> EngineStatus {
        let inner = self.inner.lock();
        EngineStatus {
            is_running: inner.state == SearchState::Running,
            state: inner.state,
            current_job: inner.job.clone(),
            started_at: inner.started_at,
            last_outcome: inner.last_outcome,
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().state == SearchState::Running
    }

    /// Validate and transition `Idle -> Running` atomically
    fn enter_running(&self, job: &MiningJob, cancellation: &CancellationToken) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.state == SearchState::Running {
            warn!(job_id = %job.id, "Rejected job: a search is already running");
            return Err(Error::AlreadyRunning);
        }
        if let Err(e) = job.validate() {
            warn!(job_id = %job.id, category = e.category(), "Rejected job: {}", e);
            return Err(e);
        }

        inner.state = SearchState::Running;
        inner.job = Some(job.clone());
        inner.started_at = Some(Utc::now());
        inner.cancellation = Some(cancellation.clone());
        Ok(())
    }

    /// The hash loop
    async fn search(&self, job: &MiningJob, cancellation: &CancellationToken) -> MiningResult {
        info!(
            target_bits = job.target.leading_zero_bits(),
            max_attempts = ?job.max_attempts,
            "Starting search"
        );

        let started = Instant::now();
        let batch_size = self.config.batch_size;
        let mut nonce = job.start_nonce;
        let mut attempts = 0u64;

        let outcome = loop {
            if cancellation.is_cancelled() {
                break SearchOutcome::Cancelled;
            }

            let header = job.header.with_nonce(nonce);
            let hash = double_hash256(&header);
            attempts += 1;

            if job.target.is_met_by(&hash) {
                info!(nonce, hash = %hex::encode(hash), attempts, "Found valid hash");
                return MiningResult::found(nonce, hash, attempts, elapsed_secs(started));
            }

            if job.max_attempts.is_some_and(|budget| attempts >= budget) {
                debug!(attempts, "Attempt budget spent");
                break SearchOutcome::Exhausted;
            }

            nonce = match nonce.checked_add(1) {
                Some(next) => next,
                None => {
                    debug!(attempts, "Nonce space exhausted");
                    break SearchOutcome::Exhausted;
                }
            };

            if attempts % batch_size == 0 {
                tokio::task::yield_now().await;
                self.emit_progress(attempts, nonce, started.elapsed());

                if cancellation.is_cancelled() {
                    break SearchOutcome::Cancelled;
                }
            }
        };

        MiningResult::not_found(outcome, attempts, elapsed_secs(started))
    }

    fn emit_progress(&self, attempts: u64, nonce: u32, elapsed: Duration) {
        debug!(
            attempts,
            nonce,
            hashrate = compute_hash_rate(attempts, elapsed.as_secs_f64()),
            "Search progress"
        );
        if let Some(progress) = &self.progress {
            // A dropped receiver must not stall the search
            let _ = progress.send(ProgressEvent::new(attempts, nonce, elapsed.as_secs_f64()));
        }
    }
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

/// Returns the engine to `Idle` on every exit path, including a dropped future
struct RunGuard<'a> {
    inner: &'a Mutex<EngineInner>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.inner.lock();
        if inner.state == SearchState::Running {
            inner.last_outcome = Some(SearchOutcome::Cancelled);
        }
        inner.state = SearchState::Idle;
        inner.job = None;
        inner.started_at = None;
        inner.cancellation = None;
    }
}
