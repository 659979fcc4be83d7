//! BSV Proof-of-Work Engine - Main Application
//!
//! Runs one nonce search from the command line and prints the result as JSON.

use bsv_pow_engine::{
    config::{Config, LogFormat},
    utils::{display_hash, format_elapsed, format_hash_rate},
    worker::{progress_channel, ProgressReceiver},
    EnginePool, Error, MiningJob, MiningResult, ProgressEvent, Result, SearchEngine, APP_NAME,
    APP_VERSION,
};

use std::time::Duration;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Either a single engine or a pool
enum Searcher {
    Single(SearchEngine),
    Pool(EnginePool),
}

impl Searcher {
    async fn run(&self, job: MiningJob, cancellation: &CancellationToken) -> Result<MiningResult> {
        match self {
            Searcher::Single(engine) => engine.start_with_cancellation(job, cancellation).await,
            Searcher::Pool(pool) => pool.run_with_cancellation(job, cancellation).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().await?;
    init_tracing(&config);

    if config.print_config {
        print_configuration(&config)?;
        return Ok(());
    }

    info!("Starting {} v{}", APP_NAME, APP_VERSION);

    let job = config.job_request()?.into_job()?;
    let (progress_tx, progress_rx) = progress_channel();

    let searcher = if config.workers == 1 {
        let engine = SearchEngine::with_config(config.engine_config())?.with_progress(progress_tx);
        Searcher::Single(engine)
    } else {
        let pool = EnginePool::new(config.workers, config.engine_config(), Some(progress_tx))?;
        info!("Searching with {} engines", pool.workers());
        Searcher::Pool(pool)
    };

    info!(
        job_id = %job.id,
        target = %job.target,
        start_nonce = job.start_nonce,
        "Searching for a nonce"
    );

    let cancellation = CancellationToken::new();
    let reporter = tokio::spawn(report_progress(progress_rx));
    let watchdog = tokio::spawn(watch_for_stop(
        cancellation.clone(),
        config.timeout_duration()?,
    ));

    let result = searcher.run(job, &cancellation).await;
    watchdog.abort();
    reporter.abort();
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            if e.is_job_rejection() {
                warn!(category = e.category(), "Job rejected: {}", e);
            }
            return Err(e);
        }
    };

    if let (Some(hash), Some(digest)) = (&result.hash, result.hash_hex()) {
        info!(
            nonce = result.nonce,
            block_hash = %display_hash(hash),
            digest = %digest,
            "Found a solution after {} attempts",
            result.attempts
        );
    } else {
        info!(
            outcome = %result.outcome,
            "No solution after {} attempts",
            result.attempts
        );
    }
    info!(
        "Searched for {} at {}",
        format_elapsed(result.elapsed_seconds),
        format_hash_rate(result.hashrate)
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Install the global subscriber in the configured format
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Plain => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Log the latest progress event once per second
async fn report_progress(mut progress: ProgressReceiver) {
    let mut ticker = interval(Duration::from_secs(1));
    let mut latest: Option<ProgressEvent> = None;

    loop {
        tokio::select! {
            event = progress.recv() => match event {
                Some(event) => latest = Some(event),
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(event) = latest.take() {
                    info!(
                        attempts = event.attempts,
                        nonce = event.nonce,
                        "Hashing at {}",
                        format_hash_rate(event.hashrate)
                    );
                }
            }
        }
    }
}

/// Cancel the search on timeout or Ctrl-C, even before it starts running
async fn watch_for_stop(cancellation: CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(duration) => sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = deadline => warn!("Timeout reached, stopping search"),
        _ = interrupted => info!("Interrupted, stopping search"),
    }
    cancellation.cancel();
}

/// Print the current configuration
fn print_configuration(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).map_err(Error::from)?;
    println!("{}", yaml);
    Ok(())
}
