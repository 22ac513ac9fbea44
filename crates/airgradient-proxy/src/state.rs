//! Application state shared between the poller and the HTTP handlers.
//!
//! The poller is the only writer of every field here. Handlers only read,
//! except for the store mutex which both sides take briefly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};

use airgradient_store::Store;
use airgradient_types::{AveragedRecord, Measurement};

use crate::averager::WindowAverager;
use crate::cache::LatestCache;
use crate::config::PollerConfig;

/// Shared application state.
pub struct AppState {
    /// The archive (wrapped in Mutex for thread-safe access).
    pub store: Mutex<Store>,
    /// Most recent snapshot.
    pub latest: LatestCache,
    /// Rolling two-minute average.
    pub two_minute: RwLock<TwoMinuteWindow>,
    /// Poller control and statistics.
    pub poller: PollerState,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: &PollerConfig) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            latest: LatestCache::new(),
            two_minute: RwLock::new(TwoMinuteWindow::default()),
            poller: PollerState::new(config),
        })
    }
}

/// The open two-minute window plus the last one that closed.
#[derive(Debug, Default)]
pub struct TwoMinuteWindow {
    averager: WindowAverager,
    last_closed: Option<AveragedRecord>,
}

impl TwoMinuteWindow {
    /// Add a snapshot to the open window.
    pub fn add(&mut self, m: &Measurement) {
        self.averager.add(m);
    }

    /// Close the open window at `boundary`.
    ///
    /// Returns false if the window held no samples, in which case the
    /// previously closed record is kept.
    pub fn close(&mut self, boundary: OffsetDateTime) -> bool {
        match self.averager.flush(boundary) {
            Some(record) => {
                self.last_closed = Some(record);
                true
            }
            None => false,
        }
    }

    /// The open window's running average if it has samples, otherwise the
    /// last closed record.
    pub fn current(&self) -> Option<AveragedRecord> {
        self.averager.peek().or_else(|| self.last_closed.clone())
    }
}

/// State for tracking and controlling the poller.
pub struct PollerState {
    /// Whether the poller task is running.
    running: AtomicBool,
    /// When the poller was started (Unix timestamp, 0 if never).
    started_at: AtomicI64,
    /// Channel to signal the poller to stop.
    stop_tx: watch::Sender<bool>,
    /// Receiver for stop signal (cloned by the poller task).
    stop_rx: watch::Receiver<bool>,
    /// Seconds between polls.
    pub poll_interval_secs: u64,
    /// Seconds per archive record.
    pub archive_interval_secs: u64,
    /// Poll statistics.
    pub stats: RwLock<PollStats>,
}

impl PollerState {
    /// Create a new poller state.
    pub fn new(config: &PollerConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicI64::new(0),
            stop_tx,
            stop_rx,
            poll_interval_secs: config.poll_interval_secs,
            archive_interval_secs: config.archive_interval_secs,
            stats: RwLock::new(PollStats::default()),
        }
    }

    /// Check if the poller is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the poller as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp();
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the poller start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        match self.started_at.load(Ordering::SeqCst) {
            0 => None,
            ts => OffsetDateTime::from_unix_timestamp(ts).ok(),
        }
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the poller to stop after its current tick.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Poll and archive counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStats {
    /// Time of last successful poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_poll_at: Option<OffsetDateTime>,
    /// Time of last failed poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful polls.
    pub success_count: u64,
    /// Total failed polls.
    pub failure_count: u64,
    /// Failed polls since the last success.
    pub consecutive_failures: u32,
    /// Records appended to the archive by this process.
    pub archived_count: u64,
    /// Timestamp of the last record this process archived.
    pub last_archived: Option<i64>,
}

impl PollStats {
    pub(crate) fn record_success(&mut self, at: OffsetDateTime) {
        self.last_poll_at = Some(at);
        self.success_count += 1;
        self.consecutive_failures = 0;
    }

    /// Returns the number of consecutive failures including this one.
    pub(crate) fn record_failure(&mut self, at: OffsetDateTime, error: String) -> u32 {
        self.last_error_at = Some(at);
        self.last_error = Some(error);
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    pub(crate) fn record_archived(&mut self, timestamp: i64) {
        self.archived_count += 1;
        self.last_archived = Some(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airgradient_types::{DeviceInfo, SensorValues};

    fn at(ts: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(ts).unwrap()
    }

    fn sample(ts: i64, co2: f64) -> Measurement {
        Measurement {
            values: SensorValues {
                rco2: Some(co2),
                ..Default::default()
            },
            info: DeviceInfo::default(),
            measurement_time: at(ts),
        }
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let store = Store::open_in_memory().unwrap();
        let state = AppState::new(store, &PollerConfig::default());

        assert!(state.latest.read().is_none());
        assert!(state.two_minute.read().await.current().is_none());
        assert_eq!(state.store.lock().await.count().unwrap(), 0);
        assert_eq!(state.poller.poll_interval_secs, 30);
        assert_eq!(state.poller.archive_interval_secs, 300);
    }

    #[test]
    fn test_two_minute_peek_then_last_closed() {
        let mut window = TwoMinuteWindow::default();
        assert!(window.current().is_none());

        window.add(&sample(10, 400.0));
        window.add(&sample(40, 420.0));
        assert_eq!(window.current().unwrap().values.rco2, Some(410.0));

        assert!(window.close(at(120)));
        let closed = window.current().unwrap();
        assert_eq!(closed.unix_timestamp(), 120);
        assert_eq!(closed.values.rco2, Some(410.0));

        // An empty close keeps the previous record.
        assert!(!window.close(at(240)));
        assert_eq!(window.current().unwrap().unix_timestamp(), 120);

        // A new sample takes precedence over the closed record.
        window.add(&sample(250, 500.0));
        assert_eq!(window.current().unwrap().values.rco2, Some(500.0));
    }

    #[test]
    fn test_poller_state_running() {
        let poller = PollerState::new(&PollerConfig::default());
        assert!(!poller.is_running());
        assert!(poller.started_at().is_none());

        poller.set_running(true);
        assert!(poller.is_running());
        assert!(poller.started_at().is_some());

        poller.set_running(false);
        assert!(!poller.is_running());
    }

    #[tokio::test]
    async fn test_stop_signal() {
        let poller = PollerState::new(&PollerConfig::default());
        let mut rx = poller.subscribe_stop();
        assert!(!*rx.borrow());

        poller.signal_stop();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[test]
    fn test_poll_stats() {
        let mut stats = PollStats::default();
        assert_eq!(stats.record_failure(at(10), "timeout".to_string()), 1);
        assert_eq!(stats.record_failure(at(40), "timeout".to_string()), 2);

        stats.record_success(at(70));
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));

        stats.record_archived(300);
        assert_eq!(stats.archived_count, 1);
        assert_eq!(stats.last_archived, Some(300));
    }

    #[test]
    fn test_poll_stats_serialize() {
        let mut stats = PollStats::default();
        stats.record_success(at(0));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["last_poll_at"], "1970-01-01T00:00:00Z");
        assert!(json["last_error_at"].is_null());
        assert_eq!(json["success_count"], 1);
    }
}
