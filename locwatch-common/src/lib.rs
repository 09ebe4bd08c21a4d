//! Shared types, errors, configuration and logging for locwatch.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{
    ConfigError, LocwatchConfig, LogFormat, LoggingConfig, LogsConfig, TransportConfig,
};
pub use errors::{SourceError, WatchError};
pub use types::{
    CapturedLogMetadata, CodeLocationEntry, IoType, LoadStatus, LocationId, LocationSnapshot,
    LogChunk, LogCursor, LogKey, StreamMetadata, WorkspaceReload,
};
