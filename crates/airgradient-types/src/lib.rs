//! Types for AirGradient air-quality monitors.
//!
//! This crate provides the data model shared by the archive store and the
//! proxy service:
//!
//! - [`Measurement`]: one snapshot from the monitor's local JSON API
//! - [`AveragedRecord`]: the mean over one window of measurements
//! - [`SensorValues`] / [`SensorField`]: the numeric field set
//! - [`DeviceInfo`]: descriptive fields (serial number, firmware, ...)
//!
//! # Example
//!
//! ```
//! use airgradient_types::{Measurement, SensorField};
//! use time::OffsetDateTime;
//!
//! let body = br#"{"pm02": 3.5, "rco2": 420, "model": "I-9PSL"}"#;
//! let m = Measurement::parse(body, OffsetDateTime::now_utc())?;
//! assert_eq!(m.values.get(SensorField::Rco2), Some(420.0));
//! # Ok::<(), airgradient_types::ParseError>(())
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{AveragedRecord, DeviceInfo, Measurement, SensorField, SensorValues};
