//! Windowed averaging of snapshots.
//!
//! A [`WindowAverager`] is either empty or accumulating. [`add`] folds a
//! snapshot into running per-field sums; [`flush`] turns the sums into an
//! [`AveragedRecord`] and empties the window. A field that any sample in the
//! window reported as `null` averages to `null`.
//!
//! [`add`]: WindowAverager::add
//! [`flush`]: WindowAverager::flush

use time::OffsetDateTime;

use airgradient_types::{AveragedRecord, DeviceInfo, Measurement, SensorValues};

#[derive(Debug, Clone)]
struct Accumulator {
    count: u32,
    sums: SensorValues,
    info: DeviceInfo,
    window_start: OffsetDateTime,
    last_sample: OffsetDateTime,
}

/// Running average over one window.
#[derive(Debug, Clone, Default)]
pub struct WindowAverager {
    acc: Option<Accumulator>,
}

impl WindowAverager {
    /// Create an empty averager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a snapshot into the open window, opening one if needed.
    pub fn add(&mut self, m: &Measurement) {
        match &mut self.acc {
            None => {
                self.acc = Some(Accumulator {
                    count: 1,
                    sums: m.values,
                    info: m.info.clone(),
                    window_start: m.measurement_time,
                    last_sample: m.measurement_time,
                });
            }
            Some(acc) => {
                acc.count += 1;
                acc.sums = acc
                    .sums
                    .zip_with(&m.values, |sum, v| sum.zip(v).map(|(sum, v)| sum + v));
                acc.info = m.info.clone();
                acc.last_sample = m.measurement_time;
            }
        }
    }

    /// Close the window and return its average stamped with `window_end`.
    ///
    /// Returns `None` if no sample was added since the last flush; the
    /// caller must not emit a record in that case.
    pub fn flush(&mut self, window_end: OffsetDateTime) -> Option<AveragedRecord> {
        let record = self.average_at(window_end);
        self.clear();
        record
    }

    /// Average of the open window stamped with `window_end`, leaving the
    /// window open. Pair with [`clear`](Self::clear) once the record is saved.
    pub fn average_at(&self, window_end: OffsetDateTime) -> Option<AveragedRecord> {
        let acc = self.acc.as_ref()?;
        let n = f64::from(acc.count);
        Some(AveragedRecord {
            values: acc.sums.map(|sum| sum.map(|s| s / n)),
            info: acc.info.clone(),
            timestamp: window_end,
            samples: acc.count,
        })
    }

    /// Discard the open window.
    pub fn clear(&mut self) {
        self.acc = None;
    }

    /// Average of the open window stamped with its most recent sample time,
    /// without closing it.
    pub fn peek(&self) -> Option<AveragedRecord> {
        let acc = self.acc.as_ref()?;
        self.average_at(acc.last_sample)
    }

    /// Number of samples in the open window.
    pub fn len(&self) -> u32 {
        self.acc.as_ref().map_or(0, |acc| acc.count)
    }

    /// Returns true if no window is open.
    pub fn is_empty(&self) -> bool {
        self.acc.is_none()
    }

    /// Fetch time of the first sample in the open window.
    pub fn window_start(&self) -> Option<OffsetDateTime> {
        self.acc.as_ref().map(|acc| acc.window_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airgradient_types::SensorField;
    use proptest::prelude::*;

    fn at(ts: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(ts).unwrap()
    }

    fn sample(ts: i64, co2: f64, pm02: Option<f64>) -> Measurement {
        Measurement {
            values: SensorValues {
                rco2: Some(co2),
                pm02,
                ..Default::default()
            },
            info: DeviceInfo {
                boot: Some(ts),
                ..Default::default()
            },
            measurement_time: at(ts),
        }
    }

    #[test]
    fn test_flush_empty_is_none() {
        let mut avg = WindowAverager::new();
        assert!(avg.flush(at(300)).is_none());
        assert!(avg.peek().is_none());
        assert!(avg.is_empty());
    }

    #[test]
    fn test_mean_of_three() {
        let mut avg = WindowAverager::new();
        for (ts, co2) in [(10, 400.0), (40, 420.0), (70, 410.0)] {
            avg.add(&sample(ts, co2, Some(1.0)));
        }
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.window_start(), Some(at(10)));

        let record = avg.flush(at(120)).unwrap();
        assert_eq!(record.values.rco2, Some(410.0));
        assert_eq!(record.values.pm02, Some(1.0));
        assert_eq!(record.values.get(SensorField::Atmp), None);
        assert_eq!(record.samples, 3);
        assert_eq!(record.unix_timestamp(), 120);
    }

    #[test]
    fn test_info_comes_from_latest_sample() {
        let mut avg = WindowAverager::new();
        avg.add(&sample(10, 400.0, None));
        avg.add(&sample(40, 400.0, None));

        let record = avg.flush(at(60)).unwrap();
        assert_eq!(record.info.boot, Some(40));
    }

    #[test]
    fn test_null_in_any_sample_nulls_the_field() {
        let mut avg = WindowAverager::new();
        avg.add(&sample(10, 400.0, Some(2.0)));
        avg.add(&sample(40, 420.0, None));
        avg.add(&sample(70, 440.0, Some(4.0)));

        let record = avg.flush(at(120)).unwrap();
        assert_eq!(record.values.pm02, None);
        assert_eq!(record.values.rco2, Some(420.0));
    }

    #[test]
    fn test_flush_resets() {
        let mut avg = WindowAverager::new();
        avg.add(&sample(10, 400.0, None));
        avg.flush(at(120)).unwrap();

        assert!(avg.is_empty());
        assert!(avg.flush(at(240)).is_none());

        avg.add(&sample(130, 500.0, None));
        let record = avg.flush(at(240)).unwrap();
        assert_eq!(record.values.rco2, Some(500.0));
        assert_eq!(record.samples, 1);
    }

    #[test]
    fn test_peek_does_not_close_window() {
        let mut avg = WindowAverager::new();
        avg.add(&sample(10, 400.0, None));
        avg.add(&sample(40, 420.0, None));

        let peeked = avg.peek().unwrap();
        assert_eq!(peeked.values.rco2, Some(410.0));
        assert_eq!(peeked.unix_timestamp(), 40);
        assert_eq!(avg.len(), 2);

        avg.add(&sample(70, 410.0, None));
        assert_eq!(avg.peek().unwrap().values.rco2, Some(410.0));
    }

    #[test]
    fn test_average_at_keeps_window_until_cleared() {
        let mut avg = WindowAverager::new();
        avg.add(&sample(10, 400.0, None));

        let record = avg.average_at(at(300)).unwrap();
        assert_eq!(record.unix_timestamp(), 300);
        assert_eq!(avg.len(), 1);

        avg.add(&sample(310, 500.0, None));
        assert_eq!(avg.average_at(at(600)).unwrap().values.rco2, Some(450.0));

        avg.clear();
        assert!(avg.is_empty());
        assert!(avg.average_at(at(600)).is_none());
    }

    proptest! {
        #[test]
        fn flush_is_sum_over_count(values in prop::collection::vec(-1.0e6f64..1.0e6, 1..64)) {
            let mut avg = WindowAverager::new();
            for (i, &v) in values.iter().enumerate() {
                avg.add(&sample(i as i64, v, Some(v)));
            }

            let sum = values.iter().fold(0.0, |acc, v| acc + v);
            let expected = sum / values.len() as f64;

            let record = avg.flush(at(1_000)).unwrap();
            prop_assert_eq!(record.values.rco2, Some(expected));
            prop_assert_eq!(record.samples as usize, values.len());
        }
    }
}
