//! Proof-of-work search workers
//!
//! [`SearchEngine`] runs one cooperative nonce search at a time; [`EnginePool`]
//! hosts several engines over disjoint nonce ranges.

use crate::ProgressEvent;
use tokio::sync::mpsc;
use tracing::Span;
use uuid::Uuid;

pub mod engine;
pub mod pool;

pub use engine::{EngineConfig, SearchEngine};
pub use pool::EnginePool;

/// Attempts between yields when no batch size is configured
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Channel half that receives progress events. Sends never block.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half for progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Create a progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Compute hash rate over a time period
pub fn compute_hash_rate(hashes: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds > 0.0 {
        hashes as f64 / elapsed_seconds
    } else {
        0.0
    }
}

/// Create a tracing span for one search
pub fn search_span(job_id: &Uuid, start_nonce: u32) -> Span {
    tracing::info_span!("search", job_id = %job_id, start_nonce = start_nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_hash_rate() {
        assert_eq!(compute_hash_rate(1000, 10.0), 100.0);
        assert_eq!(compute_hash_rate(0, 10.0), 0.0);
        assert_eq!(compute_hash_rate(1000, 0.0), 0.0);
        assert_eq!(compute_hash_rate(500, 0.5), 1000.0);
    }

    #[test]
    fn test_progress_channel_never_blocks_without_receiver() {
        let (tx, rx) = progress_channel();
        drop(rx);
        // a closed channel reports an error instead of blocking
        assert!(tx.send(ProgressEvent::new(1, 1, 1.0)).is_err());
    }
}
