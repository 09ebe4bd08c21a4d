//! Captured log aggregation for one log key.

use crate::merge::bounded_merge;
use locwatch_common::config::DEFAULT_MAX_LOG_BYTES;
use locwatch_common::{CapturedLogMetadata, IoType, LogChunk, LogCursor, StreamMetadata};
use serde::Serialize;
use tracing::{debug, warn};

/// Everything known about one captured log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogState {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub cursor: Option<LogCursor>,
    /// True until the first chunk or metadata response arrives.
    pub is_loading: bool,
    pub stdout_meta: Option<StreamMetadata>,
    pub stderr_meta: Option<StreamMetadata>,
}

impl Default for LogState {
    fn default() -> Self {
        Self {
            stdout: None,
            stderr: None,
            cursor: None,
            is_loading: true,
            stdout_meta: None,
            stderr_meta: None,
        }
    }
}

/// Read-only view of one stream, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogView<'a> {
    pub io_type: IoType,
    pub content: Option<&'a str>,
    pub is_loading: bool,
    pub location: Option<&'a str>,
    pub download_url: Option<String>,
}

/// Qualify a relative download URL with `server_root`.
///
/// Absolute URLs and an empty root pass `url` through unchanged.
pub fn resolve_download_url(server_root: &str, url: &str) -> String {
    if url.contains("://") || server_root.is_empty() {
        return url.to_string();
    }
    let root = server_root.trim_end_matches('/');
    if url.starts_with('/') {
        format!("{root}{url}")
    } else {
        format!("{root}/{url}")
    }
}

/// Merges chunk deliveries into two bounded buffers.
#[derive(Debug, Clone)]
pub struct LogStreamAggregator {
    state: LogState,
    max_bytes: usize,
    server_root: String,
}

impl Default for LogStreamAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_BYTES, String::new())
    }
}

impl LogStreamAggregator {
    pub fn new(max_bytes: usize, server_root: impl Into<String>) -> Self {
        Self {
            state: LogState::default(),
            max_bytes,
            server_root: server_root.into(),
        }
    }

    pub fn state(&self) -> &LogState {
        &self.state
    }

    pub fn cursor(&self) -> Option<&LogCursor> {
        self.state.cursor.as_ref()
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Merge one delivered chunk.
    pub fn on_chunk(&mut self, chunk: LogChunk) {
        let LogChunk {
            stdout,
            stderr,
            cursor,
        } = chunk;
        self.state.stdout = bounded_merge(
            self.state.stdout.take(),
            stdout.as_deref(),
            self.max_bytes,
        );
        self.state.stderr = bounded_merge(
            self.state.stderr.take(),
            stderr.as_deref(),
            self.max_bytes,
        );

        if let Some(next) = cursor {
            let regresses = self
                .state
                .cursor
                .as_ref()
                .is_some_and(|current| next.regresses_from(current));
            if regresses {
                warn!(
                    current = self.state.cursor.as_ref().map(LogCursor::as_str),
                    received = %next,
                    "Ignoring log cursor that moves backwards"
                );
            } else {
                self.state.cursor = Some(next);
            }
        }
        self.state.is_loading = false;

        debug!(
            stdout_bytes = self.state.stdout.as_ref().map_or(0, String::len),
            stderr_bytes = self.state.stderr.as_ref().map_or(0, String::len),
            cursor = self.state.cursor.as_ref().map(LogCursor::as_str),
            "Merged log chunk"
        );
    }

    /// Overlay metadata; fields absent from `metadata` keep their known value.
    pub fn on_metadata(&mut self, metadata: &CapturedLogMetadata) {
        overlay(&mut self.state.stdout_meta, metadata.stream(IoType::Stdout));
        overlay(&mut self.state.stderr_meta, metadata.stream(IoType::Stderr));
        self.state.is_loading = false;
    }

    pub fn current_view(&self, io_type: IoType) -> LogView<'_> {
        let (content, meta) = match io_type {
            IoType::Stdout => (&self.state.stdout, &self.state.stdout_meta),
            IoType::Stderr => (&self.state.stderr, &self.state.stderr_meta),
        };
        let meta = meta.as_ref();
        LogView {
            io_type,
            content: content.as_deref(),
            is_loading: self.state.is_loading,
            location: meta.and_then(|meta| meta.location.as_deref()),
            download_url: meta
                .and_then(|meta| meta.download_url.as_deref())
                .map(|url| resolve_download_url(&self.server_root, url)),
        }
    }
}

fn overlay(slot: &mut Option<StreamMetadata>, update: StreamMetadata) {
    match slot {
        Some(known) => known.overlay(&update),
        None if !update.is_empty() => *slot = Some(update),
        None => {}
    }
}
