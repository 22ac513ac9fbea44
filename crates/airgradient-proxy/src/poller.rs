//! Background poller.
//!
//! One task polls the monitor on aligned ticks. Each tick fetches a
//! snapshot, feeds the latest cache and both averagers, and closes the
//! two-minute and archive windows when their boundaries are reached.
//! Archive records are appended to the store; two-minute records only live
//! in memory.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use airgradient_store::Error as StoreError;
use airgradient_types::Measurement;

use crate::averager::WindowAverager;
use crate::config::PollerConfig;
use crate::device::{DeviceError, MeasurementSource};
use crate::schedule::{Schedule, TWO_MINUTES, WindowClock};
use crate::state::AppState;

/// Consecutive failures logged at warn level before going quiet.
const LOUD_FAILURES: u32 = 3;

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Whether the fetch succeeded.
    pub polled: bool,
    /// Boundary of the two-minute window closed on this tick, if it had samples.
    pub two_minute_closed: Option<i64>,
    /// Timestamp of the record appended to the archive on this tick.
    pub archived: Option<i64>,
}

/// Polls a [`MeasurementSource`] and maintains the caches and archive.
pub struct Poller<S> {
    source: S,
    state: Arc<AppState>,
    schedule: Schedule,
    archive: WindowAverager,
    archive_clock: WindowClock,
    two_minute_clock: WindowClock,
}

impl<S: MeasurementSource> Poller<S> {
    /// Create a poller. `config` must already be validated.
    pub fn new(source: S, state: Arc<AppState>, config: &PollerConfig) -> Self {
        Self {
            source,
            state,
            schedule: Schedule::new(config),
            archive: WindowAverager::new(),
            archive_clock: WindowClock::new(config.archive_interval_secs as i64),
            two_minute_clock: WindowClock::new(TWO_MINUTES),
        }
    }

    /// Run until the stop signal in [`AppState::poller`] fires.
    ///
    /// The first tick runs immediately; later ticks wait for the next
    /// aligned instant. Stopping takes effect between ticks.
    pub async fn run(mut self) {
        let mut stop = self.state.poller.subscribe_stop();
        self.state.poller.set_running(true);
        info!(
            "Poller started (poll every {}s, archive every {}s)",
            self.state.poller.poll_interval_secs,
            self.archive_clock.length()
        );

        let mut first = true;
        loop {
            if !first {
                let wait = self.schedule.until_next_tick(OffsetDateTime::now_utc());
                debug!("Next poll in {:.3}s", wait.as_secs_f64());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = stop.changed() => {}
                }
            }
            first = false;

            if *stop.borrow() {
                break;
            }

            let nominal = self.schedule.nominal(OffsetDateTime::now_utc());
            self.on_tick(nominal).await;
        }

        self.state.poller.set_running(false);
        info!("Poller stopped");
    }

    /// Process one tick at nominal epoch second `nominal`.
    ///
    /// A sample fetched on a boundary tick counts toward the window closing
    /// there. A tick that lands past a boundary (after a suspend or a stalled
    /// fetch) closes the old window first and starts the new one with its
    /// sample.
    pub async fn on_tick(&mut self, nominal: i64) -> TickReport {
        let mut report = TickReport::default();
        let fetched = self.source.fetch().await;

        let two_minute_overdue = self.two_minute_clock.overdue(nominal);
        let archive_overdue = self.archive_clock.overdue(nominal);
        if two_minute_overdue {
            report.two_minute_closed = self.observe_two_minute(nominal).await;
        }
        if archive_overdue {
            report.archived = self.observe_archive(nominal).await;
        }

        match fetched {
            Ok(m) => {
                self.on_sample(&m).await;
                self.state.latest.update(m);
                report.polled = true;
            }
            Err(e) => self.on_failure(e).await,
        }

        if !two_minute_overdue {
            report.two_minute_closed = self.observe_two_minute(nominal).await;
        }
        if !archive_overdue {
            report.archived = self.observe_archive(nominal).await;
        }

        report
    }

    async fn observe_two_minute(&mut self, nominal: i64) -> Option<i64> {
        let boundary = self.two_minute_clock.observe(nominal)?;
        self.close_two_minute(boundary).await
    }

    async fn observe_archive(&mut self, nominal: i64) -> Option<i64> {
        let boundary = self.archive_clock.observe(nominal)?;
        self.close_archive(boundary).await
    }

    async fn on_sample(&mut self, m: &Measurement) {
        let recovered_after = {
            let mut stats = self.state.poller.stats.write().await;
            let failures = stats.consecutive_failures;
            stats.record_success(m.measurement_time);
            failures
        };
        if recovered_after > 0 {
            info!("Device reachable again after {} failed polls", recovered_after);
        }

        debug!(
            "Polled device: CO2={:?} PM2.5={:?}",
            m.values.rco2, m.values.pm02
        );
        self.archive.add(m);
        self.state.two_minute.write().await.add(m);
    }

    async fn on_failure(&self, e: DeviceError) {
        let failures = self
            .state
            .poller
            .stats
            .write()
            .await
            .record_failure(OffsetDateTime::now_utc(), e.to_string());

        if failures <= LOUD_FAILURES {
            warn!("Failed to poll device: {} (attempt {})", e, failures);
        } else if failures == LOUD_FAILURES + 1 {
            error!(
                "Failed to poll device after {} attempts, will continue trying silently",
                failures
            );
        } else {
            debug!("Failed to poll device: {} (attempt {})", e, failures);
        }
    }

    async fn close_two_minute(&mut self, boundary: i64) -> Option<i64> {
        let at = boundary_time(boundary)?;
        if self.state.two_minute.write().await.close(at) {
            debug!("Closed two-minute window at {}", boundary);
            Some(boundary)
        } else {
            warn!(
                "Skipping two-minute record at {}: no successful polls in window",
                boundary
            );
            None
        }
    }

    async fn close_archive(&mut self, boundary: i64) -> Option<i64> {
        let at = boundary_time(boundary)?;
        let Some(record) = self.archive.average_at(at) else {
            warn!(
                "Skipping archive record at {}: no successful polls in interval",
                boundary
            );
            return None;
        };

        let result = self.state.store.lock().await.append(&record);
        match result {
            Ok(()) => {
                self.archive.clear();
                info!(
                    "Added record {} to archive ({} samples)",
                    boundary, record.samples
                );
                self.state.poller.stats.write().await.record_archived(boundary);
                Some(boundary)
            }
            Err(StoreError::NonMonotonicTimestamp { timestamp, last }) => {
                self.archive.clear();
                warn!(
                    "Dropping archive record {}: archive already ends at {}",
                    timestamp, last
                );
                None
            }
            Err(e) => {
                // Samples stay in the window and go into the next record.
                error!(
                    "Failed to archive record {}: {} (keeping {} samples)",
                    boundary, e, record.samples
                );
                None
            }
        }
    }
}

fn boundary_time(boundary: i64) -> Option<OffsetDateTime> {
    match OffsetDateTime::from_unix_timestamp(boundary) {
        Ok(at) => Some(at),
        Err(e) => {
            error!("Window boundary {} out of range: {}", boundary, e);
            None
        }
    }
}
