//! The locwatch configuration file and its environment overrides.

use super::env::{EnvError, EnvParser, parse_log_level};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default poll interval for the status transport.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default ceiling for each captured log buffer (5 MiB).
pub const DEFAULT_MAX_LOG_BYTES: usize = 5_242_880;

const MIN_POLL_INTERVAL_MS: u64 = 100;
const MAX_POLL_INTERVAL_MS: u64 = 3_600_000;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{} invalid environment override(s): {}", .0.len(), join_env_errors(.0))]
    Env(Vec<EnvError>),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn join_env_errors(errors: &[EnvError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// locwatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocwatchConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Never use the push transport, even when it is available.
    #[serde(default)]
    pub disable_push: bool,
    /// Interval between status polls when polling (ms).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            disable_push: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl TransportConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Upper bound for each of the stdout and stderr buffers, in bytes.
    #[serde(default = "default_max_log_bytes")]
    pub max_bytes: usize,
    /// Root used to qualify relative download URLs (e.g. `http://localhost:3000`).
    #[serde(default)]
    pub server_root: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            server_root: String::new(),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error, off).
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Pretty,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_max_log_bytes() -> usize {
    DEFAULT_MAX_LOG_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default location of the config file (`~/.config/locwatch/config.toml` on Linux).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("locwatch").join("config.toml"))
}

impl LocwatchConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load configuration from `path`, or from the default path when it exists.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    /// Environment overrides are applied and the result validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::load_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env(&mut EnvParser::new())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&contents, path)
    }

    /// Apply `LOCWATCH_*` environment overrides.
    pub fn apply_env(&mut self, parser: &mut EnvParser) -> Result<(), ConfigError> {
        let disable_push = parser.get_bool("DISABLE_PUSH", self.transport.disable_push);
        let poll_interval = parser.get_u64_range(
            "POLL_INTERVAL_MS",
            self.transport.poll_interval_ms,
            MIN_POLL_INTERVAL_MS,
            MAX_POLL_INTERVAL_MS,
        );
        let max_bytes =
            parser.get_u64_range("MAX_LOG_BYTES", self.logs.max_bytes as u64, 1, u64::MAX);
        let server_root = parser.get_optional_string("SERVER_ROOT");
        let level = parser.get_log_level("LOG_LEVEL", &self.logging.level);
        let json = parser.get_bool("LOG_JSON", self.logging.format == LogFormat::Json);

        if parser.has_errors() {
            return Err(ConfigError::Env(parser.take_errors()));
        }

        self.transport.disable_push = disable_push.value;
        self.transport.poll_interval_ms = poll_interval.value;
        self.logs.max_bytes = usize::try_from(max_bytes.value).unwrap_or(usize::MAX);
        if server_root.is_overridden() {
            self.logs.server_root = server_root.value.unwrap_or_default();
        }
        self.logging.level = level.value;
        if json.is_overridden() {
            self.logging.format = if json.value {
                LogFormat::Json
            } else {
                LogFormat::Pretty
            };
        }
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.transport.poll_interval_ms)
        {
            return Err(ConfigError::Invalid {
                field: "transport.poll_interval_ms",
                reason: format!(
                    "{} is outside {}..={}",
                    self.transport.poll_interval_ms, MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS
                ),
            });
        }
        if self.logs.max_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "logs.max_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if parse_log_level(&self.logging.level).is_none() {
            return Err(ConfigError::Invalid {
                field: "logging.level",
                reason: format!("unknown level '{}'", self.logging.level),
            });
        }
        Ok(())
    }
}
