//! Configuration system for locwatch.
//!
//! - TOML config file with per-section defaults
//! - `LOCWATCH_*` environment overrides with type checking and source tracking
//! - Validation before a watch session starts

pub mod env;
pub mod settings;
pub mod source;

pub use env::{EnvError, EnvParser};
pub use settings::{
    ConfigError, DEFAULT_MAX_LOG_BYTES, DEFAULT_POLL_INTERVAL_MS, LocwatchConfig, LogFormat,
    LoggingConfig, LogsConfig, TransportConfig, default_config_path,
};
pub use source::{ConfigSource, Sourced};

#[cfg(test)]
pub(crate) fn env_test_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
