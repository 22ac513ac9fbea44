//! HTTP client for the monitor's local server.
//!
//! The monitor publishes one JSON snapshot at `GET /measures/current`.
//! [`DeviceClient`] fetches it, stamps it with the fetch time and parses it
//! into a [`Measurement`]. The poller talks to it through the
//! [`MeasurementSource`] trait so tests can script the device.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use time::OffsetDateTime;
use tracing::{debug, info};

use airgradient_types::{Measurement, ParseError};

use crate::config::DeviceConfig;

/// Errors returned when fetching a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Connection failed, timed out, or the monitor answered with an error status.
    #[error("Device not reachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The monitor answered but the body is not a usable snapshot.
    #[error("Malformed response: {0}")]
    Malformed(#[from] ParseError),

    /// The HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Anything that can produce a fresh [`Measurement`] on demand.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Fetch one snapshot.
    async fn fetch(&self) -> Result<Measurement, DeviceError>;
}

/// Client for a single monitor.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    client: Client,
    url: String,
    long_read: Duration,
}

impl DeviceClient {
    /// Create a client from the device configuration.
    ///
    /// The configured timeout bounds the whole request, body included, so a
    /// stalled monitor surfaces as [`DeviceError::Unreachable`].
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(DeviceError::Client)?;

        Ok(Self {
            client,
            url: config.measures_url(),
            long_read: config.long_read(),
        })
    }

    /// The snapshot URL this client polls.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the current snapshot.
    pub async fn fetch(&self) -> Result<Measurement, DeviceError> {
        let start = Instant::now();

        let body = self.get_body().await?;
        let fetched_at = OffsetDateTime::now_utc();

        let elapsed = start.elapsed();
        if elapsed > self.long_read {
            info!(
                "Fetch from {} took longer than expected: {:.3}s",
                self.url,
                elapsed.as_secs_f64()
            );
        } else {
            debug!(
                "Fetched {} bytes from {} in {:.3}s",
                body.len(),
                self.url,
                elapsed.as_secs_f64()
            );
        }

        Ok(Measurement::parse(&body, fetched_at)?)
    }

    async fn get_body(&self) -> Result<Vec<u8>, DeviceError> {
        let unreachable = |source| DeviceError::Unreachable {
            url: self.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(unreachable)?
            .error_for_status()
            .map_err(unreachable)?;

        let body = response.bytes().await.map_err(unreachable)?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl MeasurementSource for DeviceClient {
    async fn fetch(&self) -> Result<Measurement, DeviceError> {
        DeviceClient::fetch(self).await
    }
}
