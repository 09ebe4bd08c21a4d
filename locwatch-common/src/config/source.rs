//! Source tracking for configuration values.

use serde::Serialize;

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Built-in default.
    Default,
    /// Environment variable.
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Environment => write!(f, "environment"),
        }
    }
}

/// A value together with its origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sourced<T> {
    pub value: T,
    pub source: ConfigSource,
    /// Environment variable name when `source` is `Environment`.
    pub var: Option<String>,
}

impl<T> Sourced<T> {
    pub fn default_value(value: T) -> Self {
        Self {
            value,
            source: ConfigSource::Default,
            var: None,
        }
    }

    pub fn from_env(value: T, var: impl Into<String>) -> Self {
        Self {
            value,
            source: ConfigSource::Environment,
            var: Some(var.into()),
        }
    }

    /// Whether the value was explicitly set by the environment.
    pub fn is_overridden(&self) -> bool {
        self.source == ConfigSource::Environment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sourced_tracks_origin() {
        let default = Sourced::default_value(3000u64);
        assert!(!default.is_overridden());
        assert_eq!(default.source.to_string(), "default");
        assert!(default.var.is_none());

        let env = Sourced::from_env(1500u64, "LOCWATCH_POLL_INTERVAL_MS");
        assert!(env.is_overridden());
        assert_eq!(env.source.to_string(), "environment");
        assert_eq!(env.var.as_deref(), Some("LOCWATCH_POLL_INTERVAL_MS"));
    }
}
