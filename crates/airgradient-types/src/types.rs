//! Core types for AirGradient sensor data.
//!
//! The monitor's local server publishes one flat JSON object per request
//! (`GET /measures/current`). Numeric sensor fields are modelled by
//! [`SensorValues`], descriptive fields by [`DeviceInfo`]. A [`Measurement`]
//! is one snapshot stamped by the proxy at fetch time; an [`AveragedRecord`]
//! is the mean of all snapshots seen during one window.

use core::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

macro_rules! sensor_fields {
    ($( $(#[$doc:meta])* $variant:ident => $field:ident, $key:literal; )+) => {
        /// A numeric field published by the monitor.
        ///
        /// Every variant is averaged independently by the proxy.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum SensorField {
            $( $(#[$doc])* $variant, )+
        }

        impl SensorField {
            /// All fields, in the order the monitor documents them.
            pub const ALL: &'static [SensorField] = &[ $( SensorField::$variant, )+ ];

            /// The JSON key used by the monitor for this field.
            #[must_use]
            pub const fn key(self) -> &'static str {
                match self {
                    $( SensorField::$variant => $key, )+
                }
            }
        }

        /// Numeric sensor values of one snapshot or one averaged window.
        ///
        /// `None` means the monitor reported `null` (or omitted the field).
        #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
        pub struct SensorValues {
            $(
                $(#[$doc])*
                #[serde(rename = $key, default)]
                pub $field: Option<f64>,
            )+
        }

        impl SensorValues {
            /// Get the value of a single field.
            #[must_use]
            pub fn get(&self, field: SensorField) -> Option<f64> {
                match field {
                    $( SensorField::$variant => self.$field, )+
                }
            }

            /// Set the value of a single field.
            pub fn set(&mut self, field: SensorField, value: Option<f64>) {
                match field {
                    $( SensorField::$variant => self.$field = value, )+
                }
            }
        }
    };
}

sensor_fields! {
    /// PM1.0 in µg/m³ (atmospheric environment).
    Pm01 => pm01, "pm01";
    /// PM2.5 in µg/m³ (atmospheric environment).
    Pm02 => pm02, "pm02";
    /// PM10 in µg/m³ (atmospheric environment).
    Pm10 => pm10, "pm10";
    /// PM1.0 in µg/m³ (standard particle).
    Pm01Standard => pm01_standard, "pm01Standard";
    /// PM2.5 in µg/m³ (standard particle).
    Pm02Standard => pm02_standard, "pm02Standard";
    /// PM10 in µg/m³ (standard particle).
    Pm10Standard => pm10_standard, "pm10Standard";
    /// Particle count 0.3µm per dL.
    Pm003Count => pm003_count, "pm003Count";
    /// Particle count 0.5µm per dL.
    Pm005Count => pm005_count, "pm005Count";
    /// Particle count 1.0µm per dL.
    Pm01Count => pm01_count, "pm01Count";
    /// Particle count 2.5µm per dL.
    Pm02Count => pm02_count, "pm02Count";
    /// Particle count 5.0µm per dL (indoor monitor only).
    Pm50Count => pm50_count, "pm50Count";
    /// Particle count 10µm per dL (indoor monitor only).
    Pm10Count => pm10_count, "pm10Count";
    /// PM2.5 in µg/m³ with correction applied.
    Pm02Compensated => pm02_compensated, "pm02Compensated";
    /// Temperature in °C.
    Atmp => atmp, "atmp";
    /// Temperature in °C with correction applied.
    AtmpCompensated => atmp_compensated, "atmpCompensated";
    /// Relative humidity in percent.
    Rhum => rhum, "rhum";
    /// Relative humidity in percent with correction applied.
    RhumCompensated => rhum_compensated, "rhumCompensated";
    /// CO2 in ppm.
    Rco2 => rco2, "rco2";
    /// Sensirion VOC index.
    TvocIndex => tvoc_index, "tvocIndex";
    /// VOC raw value.
    TvocRaw => tvoc_raw, "tvocRaw";
    /// Sensirion NOx index.
    NoxIndex => nox_index, "noxIndex";
    /// NOx raw value.
    NoxRaw => nox_raw, "noxRaw";
    /// WiFi signal strength in dBm.
    Wifi => wifi, "wifi";
}

impl fmt::Display for SensorField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl SensorValues {
    /// Build values field by field, stopping at the first error.
    pub fn try_from_fn<E>(
        mut f: impl FnMut(SensorField) -> Result<Option<f64>, E>,
    ) -> Result<Self, E> {
        let mut values = Self::default();
        for &field in SensorField::ALL {
            values.set(field, f(field)?);
        }
        Ok(values)
    }

    /// Combine two value sets field by field.
    #[must_use]
    pub fn zip_with(
        &self,
        other: &Self,
        f: impl Fn(Option<f64>, Option<f64>) -> Option<f64>,
    ) -> Self {
        let mut out = Self::default();
        for &field in SensorField::ALL {
            out.set(field, f(self.get(field), other.get(field)));
        }
        out
    }

    /// Apply `f` to every field.
    #[must_use]
    pub fn map(&self, f: impl Fn(Option<f64>) -> Option<f64>) -> Self {
        let mut out = Self::default();
        for &field in SensorField::ALL {
            out.set(field, f(self.get(field)));
        }
        out
    }

    /// Iterate over `(field, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (SensorField, Option<f64>)> + '_ {
        SensorField::ALL.iter().map(move |&field| (field, self.get(field)))
    }

    /// Returns true if no field carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(|(_, v)| v.is_none())
    }
}

/// Descriptive (non-averaged) fields reported by the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Measurement cycle counter. Low values indicate a restart.
    #[serde(default)]
    pub boot: Option<i64>,
    /// Same as `boot`, kept for Home Assistant compatibility.
    #[serde(default)]
    pub boot_count: Option<i64>,
    /// Configured LED mode.
    #[serde(default)]
    pub led_mode: Option<String>,
    /// Serial number of the monitor.
    #[serde(default)]
    pub serialno: Option<String>,
    /// Firmware version.
    #[serde(default)]
    pub firmware: Option<String>,
    /// Model name.
    #[serde(default)]
    pub model: Option<String>,
}

/// Raw snapshot as published by the monitor, without a proxy timestamp.
#[derive(Debug, Clone, Default, Deserialize)]
struct DeviceSnapshot {
    #[serde(flatten)]
    values: SensorValues,
    #[serde(flatten)]
    info: DeviceInfo,
}

/// One snapshot fetched from the monitor.
///
/// `measurement_time` is assigned by the proxy when the fetch completes,
/// not by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Numeric sensor values.
    #[serde(flatten)]
    pub values: SensorValues,
    /// Descriptive fields.
    #[serde(flatten)]
    pub info: DeviceInfo,
    /// When the proxy fetched this snapshot.
    #[serde(rename = "measurementTime", with = "measurement_time")]
    pub measurement_time: OffsetDateTime,
}

impl Measurement {
    /// Parse a `/measures/current` response body.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the body is not a JSON object, a field has
    /// the wrong type, or no sensor field is present at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use airgradient_types::Measurement;
    /// use time::OffsetDateTime;
    ///
    /// let body = br#"{"rco2": 514, "atmp": 21.91, "serialno": "abc"}"#;
    /// let m = Measurement::parse(body, OffsetDateTime::UNIX_EPOCH).unwrap();
    /// assert_eq!(m.values.rco2, Some(514.0));
    /// assert_eq!(m.info.serialno.as_deref(), Some("abc"));
    /// ```
    pub fn parse(body: &[u8], fetched_at: OffsetDateTime) -> ParseResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        if !value.is_object() {
            return Err(ParseError::NotAnObject(json_kind(&value)));
        }

        let snapshot: DeviceSnapshot = serde_json::from_value(value)?;
        if snapshot.values.is_empty() {
            return Err(ParseError::NoSensorFields);
        }

        Ok(Self {
            values: snapshot.values,
            info: snapshot.info,
            measurement_time: fetched_at,
        })
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// `measurementTime` wire format: UTC with exactly six fractional digits.
///
/// Deserializing also accepts RFC 3339 with any precision.
mod measurement_time {
    use serde::{Deserialize, Deserializer, Serializer, de, ser};
    use time::format_description::BorrowedFormatItem;
    use time::format_description::well_known::Rfc3339;
    use time::macros::format_description;
    use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

    const FORMAT: &[BorrowedFormatItem<'_>] = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
    );

    pub fn serialize<S>(t: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = t
            .to_offset(UtcOffset::UTC)
            .format(FORMAT)
            .map_err(ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        match PrimitiveDateTime::parse(&text, FORMAT) {
            Ok(t) => Ok(t.assume_utc()),
            Err(_) => OffsetDateTime::parse(&text, &Rfc3339).map_err(de::Error::custom),
        }
    }
}

/// The mean of all measurements observed during one window.
///
/// `timestamp` is the window's closing instant. On the wire the record has
/// the same shape as a [`Measurement`], with `measurementTime` carrying the
/// closing instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragedRecord {
    /// Averaged sensor values.
    #[serde(flatten)]
    pub values: SensorValues,
    /// Descriptive fields of the most recent sample in the window.
    #[serde(flatten)]
    pub info: DeviceInfo,
    /// Closing instant of the window.
    #[serde(rename = "measurementTime", with = "measurement_time")]
    pub timestamp: OffsetDateTime,
    /// Number of samples averaged into this record.
    #[serde(skip)]
    pub samples: u32,
}

impl AveragedRecord {
    /// Closing instant as whole epoch seconds.
    #[must_use]
    pub fn unix_timestamp(&self) -> i64 {
        self.timestamp.unix_timestamp()
    }
}
