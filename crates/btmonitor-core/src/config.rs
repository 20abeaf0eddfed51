//! Application configuration management.
//!
//! Configuration is read once at startup from the file named by
//! `BTMONITOR_CONFIG` (or the platform default path), then overlaid with
//! `BTMONITOR_*` environment variables. A `.toml` file is read as TOML;
//! any other file is read as JSON, so the plain form
//! `{"log_dir": "/var/log/btmonitor"}` works whatever the file is called.
//! The equivalent TOML:
//!
//! ```toml
//! log_dir = "/var/log/btmonitor"
//!
//! [presence]
//! not_detected_limit = 3
//! poll_interval_secs = 5
//! ```
//!
//! Nested keys are overridden with a double underscore, e.g.
//! `BTMONITOR_PRESENCE__NOT_DETECTED_LIMIT=5`.

use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::debounce::{DebouncePolicy, MetadataPolicy, DEFAULT_NOT_DETECTED_LIMIT};
use crate::sink::DEFAULT_EVENTS_FILE;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "BTMONITOR_CONFIG";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "BTMONITOR";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// No platform configuration directory could be determined.
    #[error("Cannot determine configuration directory")]
    NoConfigDir,

    /// The file could not be read or deserialized.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] ::config::ConfigError),

    /// A single field failed validation.
    #[error("Invalid value for '{field}': {message}")]
    ValidationError {
        /// The offending key.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),

    /// The log directory could not be created.
    #[error("Failed to create log directory {}: {source}", path.display())]
    CreateDirError {
        /// Directory path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Main application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Directory for the structured event log. Created if absent.
    pub log_dir: PathBuf,

    /// File name of the event log inside `log_dir`.
    #[serde(default = "default_events_file")]
    pub events_file: String,

    /// Scanner settings.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Debounce and polling settings.
    #[serde(default)]
    pub presence: PresenceConfig,

    /// Diagnostic logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scanner settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Adapter name (e.g. `hci0`). The system default when unset.
    pub adapter: Option<String>,

    /// Length of each discovery window in seconds.
    pub timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            timeout_secs: 10,
        }
    }
}

/// Debounce and polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Consecutive missed scans before a device is reported LOST.
    pub not_detected_limit: u32,

    /// Delay between scan cycles in seconds.
    pub poll_interval_secs: u64,

    /// Refresh name and signal on every sighting instead of keeping the
    /// values captured when the device was found.
    pub refresh_metadata: bool,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            not_detected_limit: DEFAULT_NOT_DETECTED_LIMIT.get(),
            poll_interval_secs: 5,
            refresh_metadata: false,
        }
    }
}

/// Diagnostic logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter. `RUST_LOG` takes precedence.
    pub level: String,

    /// Also write JSON diagnostics to a daily rolling file in `log_dir`.
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
        }
    }
}

fn default_events_file() -> String {
    DEFAULT_EVENTS_FILE.to_string()
}

impl Config {
    /// Configuration with defaults for everything but the log directory.
    pub fn with_log_dir(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            events_file: default_events_file(),
            scan: ScanConfig::default(),
            presence: PresenceConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from [`Config::config_path`] with environment
    /// overrides applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path, Self::environment())
    }

    /// Load configuration from `path`, overlaid with `env`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load_from(path: &Path, env: Environment) -> ConfigResult<Self> {
        Self::build(path, Some(env))
    }

    /// Load configuration from `path` alone, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::build(path, None)
    }

    /// The environment source used for overrides.
    #[must_use]
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn build(path: &Path, env: Option<Environment>) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        };
        let file = File::new(&path.to_string_lossy(), format).required(true);

        let mut builder = ::config::Config::builder().add_source(file);
        if let Some(env) = env {
            builder = builder.add_source(env);
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the configuration file.
    ///
    /// `BTMONITOR_CONFIG` when set; otherwise `/etc/btmonitor/config.toml`
    /// on Linux and the platform config directory elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if no platform directory exists.
    pub fn config_path() -> ConfigResult<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }

        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/btmonitor/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "btmonitor")
                .ok_or(ConfigError::NoConfigDir)?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }

    /// Check every field, reporting all failures at once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single failure or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field, message: &str| {
            errors.push(ConfigError::ValidationError {
                field,
                message: message.to_string(),
            });
        };

        if self.log_dir.as_os_str().is_empty() {
            invalid("log_dir", "must not be empty");
        }
        if self.events_file.is_empty() {
            invalid("events_file", "must not be empty");
        } else if Path::new(&self.events_file).components().count() != 1 {
            invalid("events_file", "must be a plain file name");
        }
        if self.scan.timeout_secs == 0 {
            invalid("scan.timeout_secs", "must be at least 1");
        }
        if self.presence.not_detected_limit == 0 {
            invalid("presence.not_detected_limit", "must be at least 1");
        }
        if self.presence.poll_interval_secs == 0 {
            invalid("presence.poll_interval_secs", "must be at least 1");
        }
        if self.logging.level.parse::<LevelFilter>().is_err() {
            invalid("logging.level", "must be one of off, error, warn, info, debug, trace");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Create the log directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::CreateDirError`] if it cannot be created.
    pub fn ensure_log_dir(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.log_dir).map_err(|source| ConfigError::CreateDirError {
            path: self.log_dir.clone(),
            source,
        })
    }

    /// Full path of the event log.
    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.log_dir.join(&self.events_file)
    }

    /// Delay between scan cycles.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.presence.poll_interval_secs)
    }

    /// Length of each discovery window.
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan.timeout_secs)
    }

    /// Debounce policy derived from the presence settings.
    #[must_use]
    pub fn debounce_policy(&self) -> DebouncePolicy {
        let limit =
            NonZeroU32::new(self.presence.not_detected_limit).unwrap_or(DEFAULT_NOT_DETECTED_LIMIT);
        let metadata = if self.presence.refresh_metadata {
            MetadataPolicy::RefreshOnSighting
        } else {
            MetadataPolicy::CaptureOnce
        };
        DebouncePolicy::with_limit(limit).metadata(metadata)
    }
}
