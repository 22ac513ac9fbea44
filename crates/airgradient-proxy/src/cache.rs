//! The most recent snapshot.

use tokio::sync::watch;

use airgradient_types::Measurement;

/// Holds the last successfully fetched [`Measurement`].
///
/// Backed by a `watch` channel: the poller replaces the whole value in one
/// step and readers clone it out, so a reader never sees a partial update
/// and never waits on the poller's fetch.
#[derive(Debug)]
pub struct LatestCache {
    tx: watch::Sender<Option<Measurement>>,
}

impl LatestCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Replace the held snapshot.
    pub fn update(&self, measurement: Measurement) {
        self.tx.send_replace(Some(measurement));
    }

    /// The latest snapshot, or `None` before the first successful poll.
    pub fn read(&self) -> Option<Measurement> {
        self.tx.borrow().clone()
    }
}

impl Default for LatestCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn measurement(co2: f64, ts: i64) -> Measurement {
        let body = format!(r#"{{"rco2": {co2}}}"#);
        Measurement::parse(body.as_bytes(), OffsetDateTime::from_unix_timestamp(ts).unwrap())
            .unwrap()
    }

    #[test]
    fn test_empty_until_first_update() {
        let cache = LatestCache::new();
        assert!(cache.read().is_none());
    }

    #[test]
    fn test_update_overwrites() {
        let cache = LatestCache::new();
        cache.update(measurement(400.0, 100));
        cache.update(measurement(420.0, 130));

        let latest = cache.read().unwrap();
        assert_eq!(latest.values.rco2, Some(420.0));
        assert_eq!(latest.measurement_time.unix_timestamp(), 130);
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_snapshots() {
        let cache = Arc::new(LatestCache::new());

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    for _ in 0..200 {
                        if let Some(m) = cache.read() {
                            // co2 and timestamp are written together
                            let co2 = m.values.rco2.unwrap();
                            assert_eq!(co2 as i64, m.measurement_time.unix_timestamp());
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for i in 0..200 {
            cache.update(measurement(i as f64, i));
            tokio::task::yield_now().await;
        }

        for reader in readers {
            reader.await.unwrap();
        }
    }
}
