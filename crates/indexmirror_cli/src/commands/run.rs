//! Run command implementation.

use super::connect;
use indexmirror_core::{CacheStore, ProgressTracker};
use indexmirror_sync::{RemoteSource, SyncConfig, SyncDriver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

/// Options for the run command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Seconds between delta attempts.
    pub interval: u64,
    /// Tracker state file, restored on start and written on exit.
    pub state_file: Option<PathBuf>,
    /// Seconds between status log lines (0 disables).
    pub status_every: u64,
    /// Records requested per kind in the snapshot.
    pub page_size: u32,
}

/// Runs the run command.
pub async fn run(endpoint: &str, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let interval = Duration::from_secs(options.interval.max(1));
    let config = SyncConfig::new(endpoint)
        .with_update_interval(interval)
        .with_page_size(options.page_size);

    let tracker = Arc::new(ProgressTracker::with_config(config.tracker.clone()));
    if let Some(path) = &options.state_file {
        restore(&tracker, path);
    }

    let source = connect(&config)?;
    let driver = Arc::new(SyncDriver::with_parts(
        config,
        source,
        Arc::clone(&tracker),
        Arc::new(CacheStore::new()),
    ));

    driver.initialize().await?;
    driver.start_schedule(interval);

    let mut status_ticker = (options.status_every > 0).then(|| {
        let period = Duration::from_secs(options.status_every);
        tokio::time::interval_at(Instant::now() + period, period)
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                info!("interrupt received, shutting down");
                break;
            }
            _ = next_tick(&mut status_ticker) => log_status(&*driver),
        }
    }

    driver.stop();
    if let Some(path) = &options.state_file {
        tracker.save_to(path)?;
        info!(path = %path.display(), checkpoint = tracker.current(), "tracker state saved");
    }
    Ok(())
}

fn restore(tracker: &ProgressTracker, path: &Path) {
    if !path.exists() {
        debug!(path = %path.display(), "no saved tracker state");
        return;
    }
    match tracker.load_from(path) {
        Ok(true) => info!(path = %path.display(), checkpoint = tracker.current(), "restored tracker state"),
        Ok(false) => warn!(path = %path.display(), "saved tracker state rejected"),
        Err(err) => warn!(path = %path.display(), error = %err, "failed to read tracker state"),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn log_status<S: RemoteSource>(driver: &SyncDriver<S>) {
    let report = driver.health_report();
    let status = &report.status;
    info!(
        state = ?status.state,
        checkpoint = status.checkpoint,
        records = status.cache.total_records,
        attempts = status.sync.total_attempts,
        failures = status.sync.failures,
        "sync status"
    );
    if !report.healthy {
        warn!(issues = ?report.issues, "sync unhealthy");
    }
}
