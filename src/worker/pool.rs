//! Multi-engine host
//!
//! Splits the nonce space into disjoint ranges and runs one [`SearchEngine`] per
//! tokio task. Each engine stays single-threaded and owns its own state; the
//! pool only shares a cancellation token and the progress channel.

use super::{EngineConfig, ProgressSender, SearchEngine};
use crate::{EngineStatus, Error, MiningJob, MiningResult, Result, SearchOutcome};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// A fixed set of engines searching one job together
#[derive(Debug)]
pub struct EnginePool {
    engines: Vec<Arc<SearchEngine>>,
    cancellation: Mutex<Option<CancellationToken>>,
}

impl EnginePool {
    /// Create a pool of `workers` engines; `0` means one per CPU core
    pub fn new(
        workers: usize,
        config: EngineConfig,
        progress: Option<ProgressSender>,
    ) -> Result<Self> {
        let workers = if workers == 0 { num_cpus::get() } else { workers };
        info!("Creating engine pool with {} workers", workers);

        let engines = (0..workers)
            .map(|_| {
                let engine = SearchEngine::with_config(config.clone())?;
                Ok(Arc::new(match &progress {
                    Some(tx) => engine.with_progress(tx.clone()),
                    None => engine,
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            engines,
            cancellation: Mutex::new(None),
        })
    }

    pub fn workers(&self) -> usize {
        self.engines.len()
    }

    /// Search `job` across all engines and return the first solution.
    ///
    /// Attempts are summed over every engine. Without a solution the outcome is
    /// `Cancelled` if the pool was stopped, otherwise `Exhausted`.
    pub async fn run(&self, job: MiningJob) -> Result<MiningResult> {
        self.run_with_cancellation(job, &CancellationToken::new()).await
    }

    /// Like [`run`](Self::run), but also stops when `parent` is cancelled
    pub async fn run_with_cancellation(
        &self,
        job: MiningJob,
        parent: &CancellationToken,
    ) -> Result<MiningResult> {
        job.validate()?;

        let cancellation = {
            let mut slot = self.cancellation.lock();
            if slot.is_some() {
                return Err(Error::AlreadyRunning);
            }
            let token = parent.child_token();
            *slot = Some(token.clone());
            token
        };
        let _active = ActiveRun {
            slot: &self.cancellation,
        };

        let ranges = nonce_ranges(job.start_nonce, job.max_attempts, self.engines.len());
        info!(
            job_id = %job.id,
            ranges = ranges.len(),
            "Starting pooled search"
        );

        let started = Instant::now();
        let mut pending: FuturesUnordered<JoinHandle<Result<MiningResult>>> = ranges
            .into_iter()
            .zip(self.engines.iter())
            .map(|((start_nonce, budget), engine)| {
                let sub_job = MiningJob {
                    id: Uuid::new_v4(),
                    start_nonce,
                    max_attempts: Some(budget),
                    ..job.clone()
                };
                let engine = Arc::clone(engine);
                let token = cancellation.clone();
                tokio::spawn(async move { engine.start_with_cancellation(sub_job, &token).await })
            })
            .collect();

        let mut attempts = 0u64;
        let mut winner: Option<(u32, [u8; 32])> = None;
        let mut failure: Option<Error> = None;

        while let Some(joined) = pending.next().await {
            let outcome = joined
                .map_err(|e| Error::worker(format!("Search task failed: {}", e)))
                .and_then(|result| result);

            match outcome {
                Ok(result) => {
                    attempts += result.attempts;
                    if winner.is_none() {
                        if let Some(solution) = result.nonce.zip(result.hash) {
                            info!(nonce = solution.0, "Pool found a solution, stopping other engines");
                            cancellation.cancel();
                            winner = Some(solution);
                        }
                    }
                }
                Err(e) => {
                    warn!(category = e.category(), "Engine failed: {}", e);
                    cancellation.cancel();
                    failure.get_or_insert(e);
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        match (winner, failure) {
            (Some((nonce, hash)), _) => Ok(MiningResult::found(nonce, hash, attempts, elapsed)),
            (None, Some(e)) => Err(e),
            (None, None) => {
                let outcome = if cancellation.is_cancelled() {
                    SearchOutcome::Cancelled
                } else {
                    SearchOutcome::Exhausted
                };
                Ok(MiningResult::not_found(outcome, attempts, elapsed))
            }
        }
    }

    /// Stop every engine of the running search; no effect when idle
    pub fn stop(&self) {
        if let Some(token) = self.cancellation.lock().as_ref() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancellation.lock().is_some()
    }

    /// Status of every engine
    pub fn status(&self) -> Vec<EngineStatus> {
        self.engines.iter().map(|engine| engine.status()).collect()
    }
}

/// Clears the pool's active token and cancels stragglers when a run ends
struct ActiveRun<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.slot.lock().take() {
            token.cancel();
        }
    }
}

/// Split `[start, u32::MAX]` into up to `workers` disjoint `(start, length)` ranges.
///
/// A total attempt budget is shared across the ranges; ranges that would get no
/// attempts are dropped.
pub fn nonce_ranges(start: u32, budget: Option<u64>, workers: usize) -> Vec<(u32, u64)> {
    let space = u64::from(u32::MAX) - u64::from(start) + 1;
    let total = budget.map_or(space, |b| b.min(space));
    let count = (workers.max(1) as u64).min(total);
    if count == 0 {
        return Vec::new();
    }

    let range_len = space / count;
    let range_extra = space % count;
    let share = total / count;
    let share_extra = total % count;

    let mut ranges = Vec::with_capacity(count as usize);
    let mut offset = u64::from(start);
    for i in 0..count {
        let len = range_len + u64::from(i < range_extra);
        let attempts = (share + u64::from(i < share_extra)).min(len);
        // offset stays within u32 because the ranges partition [start, u32::MAX]
        ranges.push((offset as u32, attempts));
        offset += len;
    }
    ranges
}
