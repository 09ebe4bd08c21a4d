//! User-facing notifications and the sinks that deliver them.

use chrono::Utc;
use locwatch_common::{LocationId, SourceError};
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

/// Kind of notification, mirroring the toast intents of a display layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Added,
    Updating,
    Reloaded,
    Warning,
    Error,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Updating => write!(f, "updating"),
            Self::Reloaded => write!(f, "reloaded"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A decided notification. Rendering is up to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    /// Locations the notification is about, if any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub location_ids: Vec<LocationId>,
}

impl Notification {
    fn new(kind: NotificationKind, message: String, location_ids: Vec<LocationId>) -> Self {
        Self {
            kind,
            message,
            location_ids,
        }
    }

    /// "Code location X added" or "N code locations added".
    pub fn added(ids: Vec<LocationId>) -> Self {
        let message = match ids.as_slice() {
            [only] => format!("Code location {only} added"),
            many => format!("{} code locations added", many.len()),
        };
        Self::new(NotificationKind::Added, message, ids)
    }

    /// "Updating X" or "Updating N code locations".
    pub fn updating(ids: Vec<LocationId>) -> Self {
        let message = match ids.as_slice() {
            [only] => format!("Updating {only}"),
            many => format!("Updating {} code locations", many.len()),
        };
        Self::new(NotificationKind::Updating, message, ids)
    }

    pub fn reloaded() -> Self {
        Self::new(
            NotificationKind::Reloaded,
            "Definitions reloaded".to_string(),
            Vec::new(),
        )
    }

    /// Reload finished but the workspace or some locations reported errors.
    pub fn loaded_with_errors(error_count: usize) -> Self {
        let message = match error_count {
            0 => "Workspace loaded with errors".to_string(),
            1 => "Workspace loaded with errors: 1 code location failed to load".to_string(),
            n => format!("Workspace loaded with errors: {n} code locations failed to load"),
        };
        Self::new(NotificationKind::Warning, message, Vec::new())
    }

    pub fn refetch_failed(err: &SourceError) -> Self {
        Self::new(
            NotificationKind::Error,
            format!("Failed to reload definitions: {err}"),
            Vec::new(),
        )
    }

    pub fn transport_failed(err: &SourceError) -> Self {
        Self::new(
            NotificationKind::Warning,
            format!("Unable to fetch code location status: {err}"),
            Vec::new(),
        )
    }
}

/// Receives decided notifications. Fire-and-forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Broadcast channel for notifications (JSON lines).
#[derive(Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<String>,
}

impl NotificationBus {
    /// Create a new bus with the provided buffer size.
    ///
    /// The effective buffer is clamped to at least `DEFAULT_BUFFER`.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event with payload.
    pub fn emit<T: Serialize>(&self, event: &str, data: &T) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                // No subscribers is fine.
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl NotificationSink for NotificationBus {
    fn notify(&self, notification: Notification) {
        self.emit("notification", &notification);
    }
}

/// Forwards notifications into an unbounded channel.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Notification receiver dropped");
        }
    }
}
