//! Error types shared by the watch engine and its collaborators.
//!
//! | Type          | Raised by                            | Surfaced as            |
//! |---------------|--------------------------------------|------------------------|
//! | `SourceError` | workspace / log data sources         | wrapped in `WatchError` |
//! | `WatchError`  | watch sessions                       | `warning` / `error` notifications |
//!
//! Nothing here is fatal: every variant is reported and the session keeps running.

use thiserror::Error;

/// Failure reported by an external data source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("subscription closed: {0}")]
    SubscriptionClosed(String),

    #[error("push transport unavailable")]
    PushUnavailable,
}

/// Errors raised while a watch session is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// Subscription or poll request failed; state is unchanged.
    #[error("transport error: {0}")]
    Transport(SourceError),

    /// Dependent workspace data could not be reloaded after a transition.
    #[error("workspace refetch failed: {0}")]
    Refetch(SourceError),

    /// Captured log metadata could not be fetched.
    #[error("log metadata fetch failed: {0}")]
    Metadata(SourceError),

    /// The session was stopped before the request could be handled.
    #[error("watch session stopped")]
    SessionStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        assert_eq!(
            SourceError::Timeout(3000).to_string(),
            "request timed out after 3000ms"
        );
        assert_eq!(
            SourceError::PushUnavailable.to_string(),
            "push transport unavailable"
        );
    }

    #[test]
    fn test_watch_error_display_includes_source() {
        let err = WatchError::Refetch(SourceError::Request("502 Bad Gateway".into()));
        let msg = err.to_string();
        assert!(msg.contains("workspace refetch failed"));
        assert!(msg.contains("502 Bad Gateway"));
    }
}
