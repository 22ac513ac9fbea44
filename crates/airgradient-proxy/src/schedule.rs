//! Wall-clock alignment for polls and windows.
//!
//! Polls fire on multiples of the poll interval, shifted by a fixed offset.
//! Windows close on multiples of their own length. Both work on the
//! *nominal* tick time, which is the wall-clock tick with the offset
//! removed, so an offset never moves a window boundary.

use std::time::Duration;

use time::OffsetDateTime;

use crate::config::PollerConfig;

/// Length of the rolling short-term window.
pub const TWO_MINUTES: i64 = 120;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Largest multiple of `step` that is `<= t`.
pub fn align_down(t: i64, step: i64) -> i64 {
    t - t.rem_euclid(step)
}

/// Poll timing derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: i64,
    offset: i64,
}

impl Schedule {
    /// Build a schedule from validated configuration.
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            interval: config.poll_interval_secs as i64,
            offset: config.poll_offset_secs,
        }
    }

    /// Time to sleep from `now` until the next aligned tick.
    pub fn until_next_tick(&self, now: OffsetDateTime) -> Duration {
        let now_ns = now.unix_timestamp_nanos();
        let interval_ns = i128::from(self.interval) * NANOS_PER_SEC;
        let offset_ns = i128::from(self.offset) * NANOS_PER_SEC;

        let shifted = now_ns - offset_ns;
        let next = shifted - shifted.rem_euclid(interval_ns) + interval_ns + offset_ns;
        Duration::from_nanos((next - now_ns) as u64)
    }

    /// Nominal epoch second of a tick firing at `now`.
    ///
    /// Rounds to the nearest second so a tick that wakes a few milliseconds
    /// early or late still lands on its boundary.
    pub fn nominal(&self, now: OffsetDateTime) -> i64 {
        let shifted = now.unix_timestamp_nanos() - i128::from(self.offset) * NANOS_PER_SEC;
        (shifted + NANOS_PER_SEC / 2).div_euclid(NANOS_PER_SEC) as i64
    }
}

/// Tracks when a fixed-length window closes.
///
/// The window open at nominal time `t` closes at the next multiple of the
/// window length strictly after the first tick observed. A tick landing on
/// or past the closing instant closes the window once, stamped with the
/// latest boundary reached, even if several boundaries were skipped.
#[derive(Debug, Clone)]
pub struct WindowClock {
    length: i64,
    closes_at: Option<i64>,
}

impl WindowClock {
    /// Create a clock for windows of `length` seconds.
    pub fn new(length: i64) -> Self {
        Self {
            length,
            closes_at: None,
        }
    }

    /// Window length in seconds.
    pub fn length(&self) -> i64 {
        self.length
    }

    /// Closing instant of the open window, if any tick was observed yet.
    pub fn closes_at(&self) -> Option<i64> {
        self.closes_at
    }

    /// Whether a tick at `t` lands past the closing instant without sitting
    /// on a boundary itself.
    ///
    /// Such a tick closes the window before its own sample is counted: the
    /// sample was taken after the window ended. A tick exactly on a boundary
    /// belongs to the window closing there.
    pub fn overdue(&self, t: i64) -> bool {
        self.closes_at.is_some_and(|closes_at| t > closes_at) && t.rem_euclid(self.length) != 0
    }

    /// Observe a tick at nominal time `t`.
    ///
    /// Returns the boundary to stamp the closing record with if the window
    /// closed on this tick.
    pub fn observe(&mut self, t: i64) -> Option<i64> {
        let boundary = align_down(t, self.length);
        match self.closes_at {
            Some(closes_at) if t >= closes_at => {
                self.closes_at = Some(boundary + self.length);
                Some(boundary)
            }
            Some(_) => None,
            None => {
                self.closes_at = Some(boundary + self.length);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ts: i64, millis: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(ts * 1_000 + millis) * 1_000_000)
            .unwrap()
    }

    fn schedule(interval: u64, offset: i64) -> Schedule {
        Schedule::new(&PollerConfig {
            poll_interval_secs: interval,
            poll_offset_secs: offset,
            archive_interval_secs: interval * 10,
        })
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(299, 300), 0);
        assert_eq!(align_down(300, 300), 300);
        assert_eq!(align_down(301, 300), 300);
        assert_eq!(align_down(-1, 300), -300);
    }

    #[test]
    fn test_until_next_tick() {
        let s = schedule(30, 0);
        assert_eq!(s.until_next_tick(at(100, 0)), Duration::from_secs(20));
        assert_eq!(s.until_next_tick(at(100, 500)), Duration::from_millis(19_500));
        // Exactly on a tick waits a full interval.
        assert_eq!(s.until_next_tick(at(120, 0)), Duration::from_secs(30));
    }

    #[test]
    fn test_until_next_tick_with_offset() {
        let s = schedule(30, 5);
        assert_eq!(s.until_next_tick(at(100, 0)), Duration::from_secs(25));
        assert_eq!(s.until_next_tick(at(125, 0)), Duration::from_secs(30));

        let s = schedule(30, -5);
        assert_eq!(s.until_next_tick(at(100, 0)), Duration::from_secs(15));
        assert_eq!(s.until_next_tick(at(116, 0)), Duration::from_secs(29));
    }

    #[test]
    fn test_nominal_removes_offset_and_rounds() {
        let s = schedule(30, 5);
        assert_eq!(s.nominal(at(305, 0)), 300);
        assert_eq!(s.nominal(at(305, 12)), 300);
        assert_eq!(s.nominal(at(304, 990)), 300);

        let s = schedule(30, -5);
        assert_eq!(s.nominal(at(295, 3)), 300);
    }

    #[test]
    fn test_window_first_tick_never_closes() {
        let mut clock = WindowClock::new(300);
        assert_eq!(clock.observe(300), None);
        assert_eq!(clock.closes_at(), Some(600));
    }

    #[test]
    fn test_window_closes_on_boundary() {
        let mut clock = WindowClock::new(300);
        assert_eq!(clock.observe(137), None);
        assert_eq!(clock.closes_at(), Some(300));

        assert_eq!(clock.observe(270), None);
        assert_eq!(clock.observe(300), Some(300));
        assert_eq!(clock.observe(330), None);
        assert_eq!(clock.observe(600), Some(600));
    }

    #[test]
    fn test_window_skipping_boundaries_closes_once() {
        let mut clock = WindowClock::new(300);
        clock.observe(250);

        // Suspended from 250 until 1000: boundaries 300, 600 and 900 passed.
        assert_eq!(clock.observe(1000), Some(900));
        assert_eq!(clock.closes_at(), Some(1200));
        assert_eq!(clock.observe(1100), None);
    }

    #[test]
    fn test_window_overdue() {
        let mut clock = WindowClock::new(300);
        assert!(!clock.overdue(1000));

        clock.observe(250);
        assert!(!clock.overdue(270));
        assert!(!clock.overdue(300));
        assert!(clock.overdue(301));
        assert!(clock.overdue(1000));
        // Landing on a later boundary still counts toward the window closing there.
        assert!(!clock.overdue(900));
    }

    #[test]
    fn test_two_minute_window() {
        let mut clock = WindowClock::new(TWO_MINUTES);
        let closed: Vec<i64> = (0..=12)
            .map(|i| 30 * i)
            .filter_map(|t| clock.observe(t))
            .collect();
        assert_eq!(closed, [120, 240, 360]);
    }
}
