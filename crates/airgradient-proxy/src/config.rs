//! Proxy configuration.
//!
//! Loaded once at startup from a TOML file, validated, and handed to the
//! poller and server by value. Nothing re-reads it at runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name used in log output.
    pub service_name: String,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Archive storage settings.
    pub storage: StorageConfig,
    /// Monitor to poll.
    pub device: DeviceConfig,
    /// Poll and archive cadence.
    pub poller: PollerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            device: DeviceConfig::default(),
            poller: PollerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        if config.service_name.is_empty() {
            config.service_name = default_service_name();
        }
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Storage path is not empty
    /// - A device host is configured
    /// - The archive interval is a whole number of poll intervals
    ///
    /// # Example
    ///
    /// ```
    /// use airgradient_proxy::Config;
    ///
    /// let mut config = Config::default();
    /// assert!(config.validate().is_err()); // no device host yet
    ///
    /// config.device.host = "airgradient.local".to_string();
    /// config.validate().expect("config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.device.validate());
        errors.extend(self.poller.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

fn default_service_name() -> String {
    "airgradient-proxy".to_string()
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                ));
            } else {
                match parts[0].parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", parts[0]),
                    )),
                    Ok(_) => {}
                }
            }
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "server.request_timeout_secs",
                "request timeout must be at least 1 second",
            ));
        }

        errors
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Archive storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airgradient_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Connection parameters for the monitor's local HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hostname or IP address of the monitor.
    pub host: String,
    /// HTTP port of the monitor.
    pub port: u16,
    /// Request timeout in seconds. A timeout counts as unreachable.
    pub timeout_secs: u64,
    /// Fetches slower than this are logged.
    pub long_read_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
            timeout_secs: 25,
            long_read_secs: 10,
        }
    }
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push(ValidationError::new(
                "device.host",
                "device host must be specified",
            ));
        }
        if self.port == 0 {
            errors.push(ValidationError::new("device.port", "port cannot be 0"));
        }
        if self.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "device.timeout_secs",
                "timeout must be at least 1 second",
            ));
        }

        errors
    }

    /// URL of the monitor's current-measures endpoint.
    pub fn measures_url(&self) -> String {
        format!("http://{}:{}/measures/current", self.host, self.port)
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Threshold above which a successful fetch is logged as slow.
    pub fn long_read(&self) -> Duration {
        Duration::from_secs(self.long_read_secs)
    }
}

/// Poll and archive cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between device polls.
    pub poll_interval_secs: u64,
    /// Shift applied to each aligned poll instant, in seconds.
    pub poll_offset_secs: i64,
    /// Seconds covered by each archived record.
    pub archive_interval_secs: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
            poll_offset_secs: 0,
            archive_interval_secs: 300,
        }
    }
}

impl PollerConfig {
    /// Validate poller configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval_secs == 0 {
            errors.push(ValidationError::new(
                "poller.poll_interval_secs",
                "poll interval must be at least 1 second",
            ));
        } else if self.poll_offset_secs.unsigned_abs() >= self.poll_interval_secs {
            errors.push(ValidationError::new(
                "poller.poll_offset_secs",
                format!(
                    "poll offset {} must be smaller than the poll interval {}",
                    self.poll_offset_secs, self.poll_interval_secs
                ),
            ));
        }

        if self.archive_interval_secs == 0 {
            errors.push(ValidationError::new(
                "poller.archive_interval_secs",
                "archive interval must be at least 1 second",
            ));
        } else if self.poll_interval_secs != 0
            && self.archive_interval_secs % self.poll_interval_secs != 0
        {
            errors.push(ValidationError::new(
                "poller.archive_interval_secs",
                format!(
                    "archive interval {} must be a multiple of the poll interval {}",
                    self.archive_interval_secs, self.poll_interval_secs
                ),
            ));
        }

        errors
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log at debug level instead of info.
    pub debug: bool,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `poller.poll_interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airgradient-proxy")
        .join("proxy.toml")
}
