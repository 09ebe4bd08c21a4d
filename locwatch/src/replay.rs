//! Replay recorded status snapshots and log chunks through the engine.
//!
//! Recordings are JSON lines. Status lines are either a snapshot (a JSON array of
//! entries), `{"reload": {...}}` to script the next workspace refetch, or
//! `{"error": "..."}` for a failed observation. Log lines are either a chunk object or
//! `{"metadata": {...}}`.

use crate::logs::LogStreamAggregator;
use crate::mock::ScriptedWorkspaceSource;
use crate::notify::Notification;
use crate::reconciler::{LocationStatus, StatusReconciler};
use crate::source::WorkspaceSource;
use locwatch_common::{
    CapturedLogMetadata, LocationSnapshot, LogChunk, SourceError, WorkspaceReload,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read recording: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusRecord {
    Failure { error: String },
    Reload { reload: WorkspaceReload },
    Snapshot(LocationSnapshot),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LogRecord {
    Metadata { metadata: CapturedLogMetadata },
    Chunk(LogChunk),
}

/// Outcome of a status replay.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReplay {
    pub notifications: Vec<Notification>,
    pub summary: Option<LocationStatus>,
    pub entries: LocationSnapshot,
}

fn records<T: DeserializeOwned, R: BufRead>(
    reader: R,
) -> impl Iterator<Item = Result<T, ReplayError>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(index, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(|source| ReplayError::Parse {
                line: index + 1,
                source,
            })),
            Err(err) => Some(Err(err.into())),
        })
}

/// Feed recorded snapshots through a reconciler. Refetches resolve immediately.
pub async fn replay_status<R: BufRead>(reader: R) -> Result<StatusReplay, ReplayError> {
    let source = ScriptedWorkspaceSource::new();
    let mut reconciler = StatusReconciler::new();
    let mut notifications = Vec::new();

    for record in records::<StatusRecord, _>(reader) {
        match record? {
            StatusRecord::Snapshot(snapshot) => {
                source.set_current(snapshot.clone());
                let reaction = reconciler.observe(snapshot);
                notifications.extend(reaction.notifications);
                if let Some(mode) = reaction.refetch {
                    let result = source.refetch_workspace().await;
                    notifications.extend(reconciler.complete_refetch(mode, result));
                }
            }
            StatusRecord::Reload { reload } => source.push_reload(Ok(reload)),
            StatusRecord::Failure { error } => {
                let err = SourceError::Request(error);
                notifications.extend(reconciler.observe_failure(&err));
            }
        }
    }
    debug!(notifications = notifications.len(), "Status replay finished");

    Ok(StatusReplay {
        notifications,
        summary: reconciler.summarize(),
        entries: reconciler.entries().to_vec(),
    })
}

/// Feed recorded chunks and metadata through an aggregator.
pub fn replay_logs<R: BufRead>(
    reader: R,
    max_bytes: usize,
    server_root: &str,
) -> Result<LogStreamAggregator, ReplayError> {
    let mut aggregator = LogStreamAggregator::new(max_bytes, server_root);
    for record in records::<LogRecord, _>(reader) {
        match record? {
            LogRecord::Metadata { metadata } => aggregator.on_metadata(&metadata),
            LogRecord::Chunk(chunk) => aggregator.on_chunk(chunk),
        }
    }
    Ok(aggregator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use locwatch_common::IoType;
    use std::fs::File;
    use std::io::{BufReader, Cursor, Write};

    #[tokio::test]
    async fn test_replay_status_grown_then_reload() {
        let recording = r#"
[{"id":"A","load_status":"LOADED"}]
[{"id":"A"},{"id":"B"}]
"#;
        let replay = replay_status(Cursor::new(recording)).await.unwrap();
        let kinds: Vec<_> = replay.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Added, NotificationKind::Reloaded]);
        assert_eq!(replay.notifications[0].message, "Code location B added");
        assert_eq!(replay.summary, None);
        assert_eq!(replay.entries.len(), 2);
    }

    #[tokio::test]
    async fn test_replay_status_scripted_reload_and_failures() {
        let recording = r#"
[{"id":"A","load_status":"LOADING"}]
{"reload":{"workspace_error":"SyntaxError"}}
[{"id":"A","load_status":"LOADED"}]
{"error":"connection refused"}
{"error":"connection refused"}
"#;
        let replay = replay_status(Cursor::new(recording)).await.unwrap();
        let kinds: Vec<_> = replay.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NotificationKind::Warning, NotificationKind::Warning]);
        assert_eq!(replay.notifications[0].message, "Workspace loaded with errors");
        assert!(replay.notifications[1].message.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_replay_status_reports_bad_line() {
        let err = replay_status(Cursor::new("[]\nnot json\n")).await.unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_replay_logs_merges_and_resolves() {
        let recording = r#"
{"metadata":{"stdout_download_url":"/download/run/stdout"}}
{"stdout":"0123456789","cursor":"10"}
{"stdout":"ABCDE","stderr":"oops","cursor":"15"}
"#;
        let aggregator = replay_logs(Cursor::new(recording), 10, "http://localhost:3000").unwrap();
        let view = aggregator.current_view(IoType::Stdout);
        assert_eq!(view.content, Some("56789ABCDE"));
        assert_eq!(
            view.download_url.as_deref(),
            Some("http://localhost:3000/download/run/stdout")
        );
        assert_eq!(aggregator.current_view(IoType::Stderr).content, Some("oops"));
        assert_eq!(aggregator.cursor().map(|c| c.as_str()), Some("15"));
    }

    #[tokio::test]
    async fn test_replay_status_from_recording_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"[{{"id":"A"}}]"#).unwrap();
        writeln!(
            file,
            r#"[{{"id":"A"}},{{"id":"B","load_status":"LOADING"}}]"#
        )
        .unwrap();
        file.flush().unwrap();

        let reader = BufReader::new(File::open(file.path()).unwrap());
        let replay = replay_status(reader).await.unwrap();
        assert_eq!(replay.notifications.len(), 1);
        assert_eq!(replay.notifications[0].message, "Updating B");
        assert!(replay.summary.is_some_and(|status| status.busy));
    }

    #[test]
    fn test_replay_logs_unreadable_recording_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let reader = BufReader::new(File::open(dir.path()).unwrap());
        let err = replay_logs(reader, 1024, "").unwrap_err();
        assert!(matches!(err, ReplayError::Io(_)));
    }
}
