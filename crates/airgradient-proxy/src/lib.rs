//! Polling proxy and archive for AirGradient air-quality monitors.
//!
//! This crate provides a service that:
//! - Polls one monitor's local `/measures/current` endpoint on aligned ticks
//! - Keeps the latest snapshot and a rolling two-minute average in memory
//! - Archives one averaged record per archive interval to SQLite
//! - Serves all of it over a small REST API
//!
//! # REST API Endpoints
//!
//! - `GET /measures/current` - Latest snapshot (`{}` before the first poll)
//! - `GET /fetch-current-record` - Same as `/measures/current`
//! - `GET /fetch-two-minute-record` - Rolling two-minute average
//! - `GET /get-version` - Protocol version (`{"version": "1"}`)
//! - `GET /get-earliest-timestamp` - Oldest archived timestamp (`{}` when empty)
//! - `GET /fetch-archive-records?since_ts=&max_ts=&limit=` - Archived records
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Poller and archive status
//!
//! ## Archive boundaries
//!
//! `since_ts` alone is inclusive. Adding `max_ts` or `limit` makes it
//! exclusive, so a client can pass the timestamp of the last record it
//! already holds. `max_ts` is always inclusive and `limit` keeps the
//! earliest records.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airgradient-proxy/proxy.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8000"
//!
//! [storage]
//! path = "/var/lib/airgradient-proxy/archive.sdb"
//!
//! [device]
//! host = "airgradient.local"
//! port = 80
//! timeout_secs = 25
//!
//! [poller]
//! poll_interval_secs = 30
//! archive_interval_secs = 300
//! ```

pub mod api;
pub mod averager;
pub mod cache;
pub mod config;
pub mod device;
pub mod poller;
pub mod query;
pub mod schedule;
pub mod state;

pub use averager::WindowAverager;
pub use cache::LatestCache;
pub use config::{
    Config, ConfigError, DeviceConfig, LoggingConfig, PollerConfig, ServerConfig, StorageConfig,
};
pub use device::{DeviceClient, DeviceError, MeasurementSource};
pub use poller::{Poller, TickReport};
pub use query::{ArchiveParams, QueryEngine, QueryError};
pub use schedule::{Schedule, WindowClock};
pub use state::{AppState, PollStats, TwoMinuteWindow};
