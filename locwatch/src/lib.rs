//! Live code-location status reconciliation and bounded captured-log streaming.
//!
//! A status session ([`StatusWatch`]) receives workspace snapshots over a push
//! subscription or by polling, classifies each transition and decides which
//! notifications to emit. A log session ([`LogWatch`]) merges stdout/stderr chunks
//! into two bounded buffers and keeps the captured-log metadata current.

#![forbid(unsafe_code)]

pub mod diff;
pub mod log_watch;
pub mod logs;
pub mod merge;
pub mod mock;
pub mod notify;
pub mod reconciler;
pub mod replay;
pub mod source;
pub mod status_watch;
pub mod transport;

pub use diff::{Classification, classify};
pub use log_watch::{LogWatch, LogWatchOptions};
pub use logs::{LogState, LogStreamAggregator, LogView, resolve_download_url};
pub use merge::bounded_merge;
pub use notify::{ChannelSink, Notification, NotificationBus, NotificationKind, NotificationSink};
pub use reconciler::{LocationStatus, Reaction, ReconcilerState, RefetchMode, StatusReconciler};
pub use source::{LogSource, Subscription, WorkspaceSource};
pub use status_watch::{StatusView, StatusWatch, StatusWatchOptions};
pub use transport::{PushAvailability, Transport, TransportEvent, TransportKind};
