//! Common types used across locwatch components.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Stable identifier of a code location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(pub String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LocationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Load status reported by the workspace for a code location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    /// The location is being (re)loaded by the server.
    Loading,
    /// The location finished loading, successfully or not.
    #[default]
    Loaded,
}

/// One code location as observed in a workspace snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeLocationEntry {
    pub id: LocationId,
    #[serde(default)]
    pub load_status: LoadStatus,
    /// Whether the location failed to load.
    #[serde(default)]
    pub has_error: bool,
}

impl CodeLocationEntry {
    pub fn new(id: impl Into<String>, load_status: LoadStatus) -> Self {
        Self {
            id: LocationId::new(id),
            load_status,
            has_error: false,
        }
    }

    pub fn loaded(id: impl Into<String>) -> Self {
        Self::new(id, LoadStatus::Loaded)
    }

    pub fn loading(id: impl Into<String>) -> Self {
        Self::new(id, LoadStatus::Loading)
    }

    /// Mark this entry as carrying a load error.
    pub fn with_error(mut self) -> Self {
        self.has_error = true;
        self
    }

    pub fn is_loading(&self) -> bool {
        self.load_status == LoadStatus::Loading
    }
}

/// Full set of entries observed at one instant, in server order.
pub type LocationSnapshot = Vec<CodeLocationEntry>;

/// Result of refetching the dependent workspace data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceReload {
    /// Top-level error reported instead of (or alongside) the workspace.
    #[serde(default)]
    pub workspace_error: Option<String>,
    #[serde(default)]
    pub entries: Vec<CodeLocationEntry>,
}

impl WorkspaceReload {
    pub fn from_entries(entries: Vec<CodeLocationEntry>) -> Self {
        Self {
            workspace_error: None,
            entries,
        }
    }

    /// Number of entries that failed to load.
    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.has_error).count()
    }

    /// Whether the reload surfaced any error at all.
    pub fn has_errors(&self) -> bool {
        self.workspace_error.is_some() || self.error_count() > 0
    }
}

/// Key identifying one captured log (e.g. `["run-id", "compute", "step"]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogKey(pub Vec<String>);

impl LogKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for LogKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Opaque position token in a captured log stream.
///
/// Sources usually encode byte offsets (`"1024"` or `"1024:96"` for separate stdout and
/// stderr offsets). When both cursors follow that shape they are compared component-wise;
/// anything else is treated as opaque and trusted to move forward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogCursor(pub String);

impl LogCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn offsets(&self) -> Option<Vec<u64>> {
        self.0
            .split(':')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect()
    }

    /// Whether moving from `previous` to `self` would move the cursor backwards.
    pub fn regresses_from(&self, previous: &LogCursor) -> bool {
        match (self.offsets(), previous.offsets()) {
            (Some(next), Some(prev)) if next.len() == prev.len() => {
                next.iter().zip(prev.iter()).any(|(n, p)| n < p)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for LogCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which captured stream to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoType {
    Stdout,
    Stderr,
}

impl std::fmt::Display for IoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

impl FromStr for IoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stdout" => Ok(Self::Stdout),
            "stderr" => Ok(Self::Stderr),
            other => Err(format!("unknown io type '{other}' (expected stdout or stderr)")),
        }
    }
}

/// One incremental delivery from a captured log subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub cursor: Option<LogCursor>,
}

/// Where one captured stream lives and how to download it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl StreamMetadata {
    /// Overlay `update` onto `self`; absent fields keep their current value.
    pub fn overlay(&mut self, update: &StreamMetadata) {
        if let Some(url) = &update.download_url {
            self.download_url = Some(url.clone());
        }
        if let Some(location) = &update.location {
            self.location = Some(location.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.download_url.is_none() && self.location.is_none()
    }
}

/// Metadata response for both captured streams of a log key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedLogMetadata {
    #[serde(default)]
    pub stdout_download_url: Option<String>,
    #[serde(default)]
    pub stdout_location: Option<String>,
    #[serde(default)]
    pub stderr_download_url: Option<String>,
    #[serde(default)]
    pub stderr_location: Option<String>,
}

impl CapturedLogMetadata {
    pub fn stream(&self, io_type: IoType) -> StreamMetadata {
        match io_type {
            IoType::Stdout => StreamMetadata {
                download_url: self.stdout_download_url.clone(),
                location: self.stdout_location.clone(),
            },
            IoType::Stderr => StreamMetadata {
                download_url: self.stderr_download_url.clone(),
                location: self.stderr_location.clone(),
            },
        }
    }
}
