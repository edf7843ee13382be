//! Sync driver state machine.
//!
//! The driver performs the initial full load, then absorbs deltas on a
//! fixed schedule. At most one attempt is in flight at a time; an attempt
//! that finds another in progress is skipped, never queued.

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::source::RemoteSource;
use crate::stats::SyncStats;
use indexmirror_core::{unix_millis, CacheStats, CacheStore, Checkpoint, ProgressTracker, TrackerStatus};
use indexmirror_protocol::is_valid_checkpoint;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Lifecycle state of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    /// No full load has completed.
    Uninitialized,
    /// A full load is in progress.
    Initializing,
    /// Ready for the next delta.
    Idle,
    /// A delta attempt is in flight.
    Syncing,
}

impl DriverState {
    /// Returns true while a fetch is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, DriverState::Initializing | DriverState::Syncing)
    }
}

/// Outcome of one [`SyncDriver::sync_once`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another attempt was already in flight.
    Skipped,
    /// No checkpoint to compute a delta from.
    NotInitialized,
    /// The remote reported no newer checkpoint.
    UpToDate,
    /// A delta was merged and the checkpoint advanced.
    Applied {
        /// Newly appended records.
        added: usize,
        /// Checkpoint before the delta.
        from: Checkpoint,
        /// Checkpoint after the delta.
        to: Checkpoint,
    },
    /// The fetch failed; nothing was changed.
    Failed(String),
}

impl SyncOutcome {
    /// True for [`UpToDate`](Self::UpToDate) and [`Applied`](Self::Applied).
    pub fn succeeded(&self) -> bool {
        matches!(self, SyncOutcome::UpToDate | SyncOutcome::Applied { .. })
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Skipped => f.write_str("skipped"),
            SyncOutcome::NotInitialized => f.write_str("not initialized"),
            SyncOutcome::UpToDate => f.write_str("up to date"),
            SyncOutcome::Applied { added, from, to } => {
                write!(f, "applied {from} -> {to} ({added} new records)")
            }
            SyncOutcome::Failed(message) => write!(f, "failed: {message}"),
        }
    }
}

/// Aggregate snapshot of the driver.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatus {
    /// Lifecycle state.
    pub state: DriverState,
    /// Cache initialized and non-empty.
    pub ready: bool,
    /// A delta attempt is in flight.
    pub syncing: bool,
    /// The schedule is running.
    pub auto_updates: bool,
    /// Schedule period in milliseconds.
    pub update_interval_ms: u64,
    /// Current checkpoint.
    pub checkpoint: Checkpoint,
    /// Progress tracker snapshot.
    pub tracker: TrackerStatus,
    /// Cache store snapshot.
    pub cache: CacheStats,
    /// Attempt counters.
    pub sync: SyncStats,
}

/// Health verdict with every failing check listed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// True when `issues` is empty.
    pub healthy: bool,
    /// Human-readable failing checks.
    pub issues: Vec<String>,
    /// Status the checks were evaluated against.
    pub status: DriverStatus,
    /// Unix milliseconds when the report was built.
    pub generated_at: u64,
}

struct Schedule {
    interval: Duration,
    stop: watch::Sender<bool>,
}

/// Holds the in-flight flag for the duration of an attempt.
struct InFlight<'a> {
    flag: &'a AtomicBool,
    state: &'a RwLock<DriverState>,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a RwLock<DriverState>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag, state })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if *state == DriverState::Syncing {
            *state = DriverState::Idle;
        }
        self.flag.store(false, Ordering::Release);
    }
}

/// Orchestrates the remote source, the cache store and the progress
/// tracker.
pub struct SyncDriver<S: RemoteSource> {
    config: SyncConfig,
    source: S,
    tracker: Arc<ProgressTracker>,
    store: Arc<CacheStore>,
    state: RwLock<DriverState>,
    in_flight: AtomicBool,
    stats: RwLock<SyncStats>,
    schedule: Mutex<Option<Schedule>>,
}

impl<S: RemoteSource> SyncDriver<S> {
    /// Creates a driver with a fresh tracker and store.
    pub fn new(config: SyncConfig, source: S) -> Self {
        let tracker = Arc::new(ProgressTracker::with_config(config.tracker.clone()));
        Self::with_parts(config, source, tracker, Arc::new(CacheStore::new()))
    }

    /// Creates a driver over an existing tracker and store.
    pub fn with_parts(
        config: SyncConfig,
        source: S,
        tracker: Arc<ProgressTracker>,
        store: Arc<CacheStore>,
    ) -> Self {
        Self {
            config,
            source,
            tracker,
            store,
            state: RwLock::new(DriverState::Uninitialized),
            in_flight: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
            schedule: Mutex::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Returns the progress tracker.
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Returns the cache store.
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> DriverState {
        *self.state.read()
    }

    /// Returns a copy of the attempt counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true while a delta attempt is in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns true while the schedule is running.
    pub fn is_scheduled(&self) -> bool {
        self.schedule.lock().is_some()
    }

    /// Cache initialized and non-empty.
    pub fn is_ready(&self) -> bool {
        self.store.is_ready()
    }

    fn set_state(&self, state: DriverState) {
        *self.state.write() = state;
    }

    /// Performs the initial full load.
    ///
    /// Loads the snapshot into the store and initializes the tracker from
    /// its checkpoint. A snapshot without a checkpoint still initializes the
    /// cache, leaving progress at 0. Fetch failures are returned to the
    /// caller and recorded as the last error.
    pub async fn initialize(&self) -> SyncResult<Option<Checkpoint>> {
        info!("initializing cache with full snapshot");
        self.set_state(DriverState::Initializing);

        let payload = match self.source.fetch_full(self.config.page_size).await {
            Ok(payload) => payload,
            Err(err) => {
                error!(error = %err, "failed to initialize cache");
                self.stats.write().last_error = Some(err.to_string());
                self.set_state(if self.store.is_initialized() {
                    DriverState::Idle
                } else {
                    DriverState::Uninitialized
                });
                return Err(err);
            }
        };

        let total = self.store.load_full(&payload);
        let checkpoint = payload.checkpoint();
        match checkpoint {
            Some(checkpoint) if self.tracker.current() == 0 => {
                if !self.tracker.initialize(checkpoint) {
                    warn!(checkpoint, "snapshot checkpoint rejected by tracker");
                }
            }
            Some(checkpoint) => {
                // Tracker state was restored before the load.
                self.tracker.advance(checkpoint);
            }
            None => warn!("snapshot carried no checkpoint; progress tracking stays at 0"),
        }

        self.set_state(DriverState::Idle);
        info!(
            total_records = total,
            checkpoint = self.tracker.current(),
            "cache initialization completed"
        );
        Ok(checkpoint)
    }

    /// Runs one guarded delta attempt.
    ///
    /// Never fails: errors are recorded in the statistics and reported as
    /// [`SyncOutcome::Failed`].
    pub async fn sync_once(&self) -> SyncOutcome {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight, &self.state) else {
            debug!("sync already in progress, skipping");
            return SyncOutcome::Skipped;
        };

        let from = {
            let mut state = self.state.write();
            if *state == DriverState::Initializing {
                debug!("full load in progress, skipping");
                return SyncOutcome::Skipped;
            }
            let from = self.tracker.current();
            if from != 0 {
                *state = DriverState::Syncing;
            }
            from
        };
        self.stats.write().record_attempt();

        if from == 0 {
            warn!("progress tracker not initialized, cannot compute delta");
            return SyncOutcome::NotInitialized;
        }
        debug!(since = from, "checking for updates");

        let outcome = match self.source.fetch_delta(from).await {
            Err(err) => SyncOutcome::Failed(err.to_string()),
            Ok(payload) => match payload.checkpoint() {
                None => SyncOutcome::Failed("delta carried no checkpoint".into()),
                Some(to) if to <= from => {
                    debug!(checkpoint = to, "no new blocks");
                    SyncOutcome::UpToDate
                }
                Some(to) if !is_valid_checkpoint(to) => {
                    SyncOutcome::Failed(format!("delta checkpoint {to} out of range"))
                }
                Some(_) if self.tracker.current() != from => {
                    warn!("progress moved during fetch, discarding delta");
                    SyncOutcome::Skipped
                }
                Some(to) if self.tracker.advance(to) => {
                    let added = self.store.merge_delta(&payload);
                    SyncOutcome::Applied { added, from, to }
                }
                Some(_) => {
                    warn!("checkpoint refused by tracker, discarding delta");
                    SyncOutcome::Skipped
                }
            },
        };

        let mut stats = self.stats.write();
        match &outcome {
            SyncOutcome::UpToDate => stats.record_success(),
            SyncOutcome::Applied { added, to, .. } => {
                stats.record_success();
                if *added > 0 {
                    info!(added, checkpoint = to, "update completed");
                } else {
                    debug!(checkpoint = to, "update completed with no new records");
                }
            }
            SyncOutcome::Failed(message) => {
                error!(error = %message, "update failed");
                stats.record_failure(message.clone());
            }
            SyncOutcome::Skipped | SyncOutcome::NotInitialized => {}
        }
        outcome
    }

    /// Stops the schedule. Returns false if it was not running.
    ///
    /// An attempt already in flight runs to completion.
    pub fn stop(&self) -> bool {
        match self.schedule.lock().take() {
            Some(schedule) => {
                let _ = schedule.stop.send(true);
                info!("auto updates stopped");
                true
            }
            None => false,
        }
    }

    /// Returns an aggregate snapshot.
    pub fn status(&self) -> DriverStatus {
        DriverStatus {
            state: self.state(),
            ready: self.store.is_ready(),
            syncing: self.is_syncing(),
            auto_updates: self.is_scheduled(),
            update_interval_ms: u64::try_from(self.update_interval().as_millis()).unwrap_or(u64::MAX),
            checkpoint: self.tracker.current(),
            tracker: self.tracker.status(),
            cache: self.store.stats(),
            sync: self.stats(),
        }
    }

    /// Evaluates every health check and lists the failing ones.
    pub fn health_report(&self) -> HealthReport {
        self.health_report_at(SystemTime::now())
    }

    fn health_report_at(&self, now: SystemTime) -> HealthReport {
        let status = self.status();
        let mut issues = Vec::new();

        if !status.cache.initialized {
            issues.push("cache not initialized".to_owned());
        }
        if !status.auto_updates {
            issues.push("auto updates disabled".to_owned());
        }
        if !self.tracker.healthy(self.config.tracker_max_age) {
            issues.push("progress tracker unhealthy".to_owned());
        }
        if !status.ready {
            issues.push("cache not ready".to_owned());
        }
        let since_success = status
            .sync
            .last_success_time
            .and_then(|time| now.duration_since(time).ok());
        if since_success.is_some_and(|elapsed| elapsed > self.update_interval() * 3) {
            issues.push("updates are delayed".to_owned());
        }

        HealthReport {
            healthy: issues.is_empty(),
            issues,
            status,
            generated_at: unix_millis(now),
        }
    }

    /// Period of the running schedule, else the configured one.
    fn update_interval(&self) -> Duration {
        self.schedule
            .lock()
            .as_ref()
            .map_or(self.config.update_interval, |schedule| schedule.interval)
    }
}

impl<S: RemoteSource + 'static> SyncDriver<S> {
    /// Starts invoking [`sync_once`](Self::sync_once) every `interval`.
    ///
    /// Each tick runs its attempt as a separate task, so a slow attempt
    /// never delays the clock; a tick landing on an in-flight attempt is
    /// skipped. Returns false if the schedule was already running or the
    /// interval is zero.
    pub fn start_schedule(self: &Arc<Self>, interval: Duration) -> bool {
        if interval.is_zero() {
            warn!("refusing to schedule with a zero interval");
            return false;
        }
        let mut slot = self.schedule.lock();
        if slot.is_some() {
            warn!("auto updates already running");
            return false;
        }

        let (stop, mut stopped) = watch::channel(false);
        let driver = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(driver) = driver.upgrade() else {
                            break;
                        };
                        tokio::spawn(async move {
                            driver.sync_once().await;
                        });
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("schedule ticker exited");
        });

        *slot = Some(Schedule { interval, stop });
        let interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "starting auto updates");
        true
    }

    /// Discards all cached state and reloads from a full snapshot.
    ///
    /// Stops the schedule, clears the store, resets the tracker and
    /// re-initializes. The schedule is restarted only if the reload
    /// succeeds.
    pub async fn force_refresh(self: &Arc<Self>) -> SyncResult<()> {
        info!("performing force refresh");
        let interval = self.update_interval();
        self.stop();

        self.store.clear();
        self.tracker.reset();
        self.set_state(DriverState::Uninitialized);

        self.initialize().await?;
        self.start_schedule(interval);
        info!("force refresh completed");
        Ok(())
    }
}

impl<S: RemoteSource> Drop for SyncDriver<S> {
    fn drop(&mut self) {
        if let Some(schedule) = self.schedule.get_mut().take() {
            let _ = schedule.stop.send(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockResponse, MockSource};
    use indexmirror_core::{EntityKind, Payload};
    use serde_json::{json, Value};

    fn payload(checkpoint: Option<u64>, fields: Value) -> Payload {
        let mut data = fields;
        if let Some(checkpoint) = checkpoint {
            data["_meta"] = json!({ "block": { "number": checkpoint } });
        }
        Payload::from_data(data).unwrap()
    }

    fn driver_with(source: MockSource) -> Arc<SyncDriver<MockSource>> {
        let config = SyncConfig::new("mock://").with_update_interval(Duration::from_secs(30));
        Arc::new(SyncDriver::new(config, source))
    }

    #[tokio::test]
    async fn initialize_loads_and_tracks() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(
            Some(100),
            json!({ "tokens": [{ "id": "A" }] }),
        )));
        let driver = driver_with(source);

        assert_eq!(driver.state(), DriverState::Uninitialized);
        assert_eq!(driver.initialize().await.unwrap(), Some(100));
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(driver.is_ready());
        assert_eq!(driver.tracker().current(), 100);
    }

    #[tokio::test]
    async fn initialize_without_checkpoint_is_degraded() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(None, json!({ "tokens": [{ "id": "A" }] }))));
        let driver = driver_with(source);

        assert_eq!(driver.initialize().await.unwrap(), None);
        assert!(driver.is_ready());
        assert_eq!(driver.tracker().current(), 0);
        assert_eq!(driver.sync_once().await, SyncOutcome::NotInitialized);
        assert_eq!(driver.source().delta_calls(), 0);

        let stats = driver.stats();
        assert_eq!(stats.total_attempts, 1);
        assert_eq!((stats.successes, stats.failures), (0, 0));
    }

    #[tokio::test]
    async fn initialize_failure_propagates() {
        let source = MockSource::new();
        source.push_full(MockResponse::Fail("subgraph down".into()));
        let driver = driver_with(source);

        assert!(driver.initialize().await.is_err());
        assert_eq!(driver.state(), DriverState::Uninitialized);
        assert!(!driver.is_ready());
        assert!(driver.stats().last_error.unwrap().contains("subgraph down"));
    }

    #[tokio::test]
    async fn sync_applies_delta() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(Some(100), json!({ "tokens": [{ "id": "A" }] }))));
        source.push_delta(MockResponse::Payload(payload(
            Some(105),
            json!({ "tokens": [{ "id": "A", "derivedETH": "2" }, { "id": "B" }] }),
        )));
        let driver = driver_with(source);
        driver.initialize().await.unwrap();

        let outcome = driver.sync_once().await;
        assert_eq!(outcome, SyncOutcome::Applied { added: 1, from: 100, to: 105 });
        assert!(outcome.succeeded());
        assert_eq!(driver.source().last_since(), Some(100));
        assert_eq!(driver.tracker().current(), 105);
        assert_eq!(driver.store().get(EntityKind::Tokens).len(), 2);
        assert_eq!(driver.state(), DriverState::Idle);
        assert!(!driver.is_syncing());
    }

    #[tokio::test]
    async fn failure_changes_nothing() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(Some(100), json!({ "tokens": [{ "id": "A" }] }))));
        source.push_delta(MockResponse::Fail("boom".into()));
        let driver = driver_with(source);
        driver.initialize().await.unwrap();

        let outcome = driver.sync_once().await;
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert!(!outcome.succeeded());
        assert_eq!(driver.tracker().current(), 100);
        assert_eq!(driver.store().total_records(), 1);

        let stats = driver.stats();
        assert_eq!(stats.failures, 1);
        assert!(stats.last_error.unwrap().contains("boom"));
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn health_lists_every_issue() {
        let driver = driver_with(MockSource::new());
        let report = driver.health_report();
        assert!(!report.healthy);
        assert_eq!(
            report.issues,
            [
                "cache not initialized",
                "auto updates disabled",
                "progress tracker unhealthy",
                "cache not ready"
            ]
        );
    }

    #[tokio::test]
    async fn stop_without_schedule_is_noop() {
        let driver = driver_with(MockSource::new());
        assert!(!driver.stop());
        assert!(!driver.start_schedule(Duration::ZERO));
        assert!(driver.start_schedule(Duration::from_secs(10)));
        assert!(!driver.start_schedule(Duration::from_secs(10)));
        assert!(driver.is_scheduled());
        assert_eq!(driver.status().update_interval_ms, 10_000);
        assert!(driver.stop());
        assert!(!driver.is_scheduled());
    }

    #[tokio::test]
    async fn out_of_range_checkpoint_is_never_merged() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(Some(100), json!({ "tokens": [{ "id": "A" }] }))));
        source.push_delta(MockResponse::Payload(payload(
            Some(1 << 53),
            json!({ "tokens": [{ "id": "B" }] }),
        )));
        let driver = driver_with(source);
        driver.initialize().await.unwrap();

        for _ in 0..2 {
            let outcome = driver.sync_once().await;
            assert!(matches!(outcome, SyncOutcome::Failed(ref m) if m.contains("out of range")));
            assert_eq!(driver.source().last_since(), Some(100));
        }
        assert_eq!(driver.tracker().current(), 100);
        assert!(driver.store().get_by_id(EntityKind::Tokens, "B").is_none());
        assert_eq!(driver.store().total_records(), 1);

        let stats = driver.stats();
        assert_eq!((stats.successes, stats.failures), (0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn sync_during_full_load_is_skipped() {
        let tracker = Arc::new(ProgressTracker::new());
        assert!(tracker.initialize(80));
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(Some(100), json!({ "tokens": [{ "id": "A" }] }))));
        source.push_delta(MockResponse::Payload(payload(Some(101), json!({}))));
        source.set_latency(Duration::from_millis(500));
        let config = SyncConfig::new("mock://");
        let driver = SyncDriver::with_parts(config, source, tracker, Arc::new(CacheStore::new()));

        let (loaded, outcome) = tokio::join!(driver.initialize(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(driver.state(), DriverState::Initializing);
            driver.sync_once().await
        });

        assert_eq!(loaded.unwrap(), Some(100));
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(driver.source().delta_calls(), 0);
        assert_eq!(driver.stats().total_attempts, 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[tokio::test]
    async fn health_flags_delayed_updates() {
        let source = MockSource::new();
        source.push_full(MockResponse::Payload(payload(Some(100), json!({ "tokens": [{ "id": "A" }] }))));
        let driver = driver_with(source);
        driver.initialize().await.unwrap();

        let now = SystemTime::now();
        let interval = driver.config().update_interval;

        driver.stats.write().last_success_time = Some(now - interval * 3);
        let report = driver.health_report_at(now);
        assert_eq!(report.issues, ["auto updates disabled"]);

        driver.stats.write().last_success_time = Some(now - interval * 3 - Duration::from_secs(1));
        let report = driver.health_report_at(now);
        assert!(!report.healthy);
        assert_eq!(report.issues, ["auto updates disabled", "updates are delayed"]);
    }

    #[test]
    fn outcome_display() {
        let outcome = SyncOutcome::Applied { added: 2, from: 1, to: 3 };
        assert_eq!(outcome.to_string(), "applied 1 -> 3 (2 new records)");
        assert_eq!(SyncOutcome::Skipped.to_string(), "skipped");
    }
}
