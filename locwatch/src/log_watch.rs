//! Log watch session: one actor task owning a [`LogStreamAggregator`].
//!
//! The aggregator lives inside a `watch` channel and is only modified by the actor.
//! Readers borrow it to render a [`crate::logs::LogView`]. The chunk subscription is
//! opened and drained by a separate task, so stopping never waits on the source.

use crate::logs::{LogState, LogStreamAggregator};
use crate::source::{DEFAULT_SUBSCRIPTION_BUFFER, LogSource};
use locwatch_common::config::DEFAULT_MAX_LOG_BYTES;
use locwatch_common::{
    CapturedLogMetadata, LocwatchConfig, LogChunk, LogCursor, LogKey, SourceError, WatchError,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Session start parameters.
#[derive(Debug, Clone)]
pub struct LogWatchOptions {
    pub max_bytes: usize,
    /// Root for relative download URLs.
    pub server_root: String,
    /// Resume after this cursor instead of from the beginning.
    pub start_cursor: Option<LogCursor>,
}

impl Default for LogWatchOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_LOG_BYTES,
            server_root: String::new(),
            start_cursor: None,
        }
    }
}

impl LogWatchOptions {
    pub fn from_config(config: &LocwatchConfig) -> Self {
        Self {
            max_bytes: config.logs.max_bytes,
            server_root: config.logs.server_root.clone(),
            start_cursor: None,
        }
    }

    pub fn with_start_cursor(mut self, cursor: Option<LogCursor>) -> Self {
        self.start_cursor = cursor;
        self
    }
}

enum Command {
    RefreshMetadata,
}

/// Handle to a running log watch session.
pub struct LogWatch {
    session_id: Uuid,
    log_key: LogKey,
    state: watch::Receiver<LogStreamAggregator>,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: Option<oneshot::Sender<()>>,
    actor: Option<JoinHandle<()>>,
    stream: Option<JoinHandle<()>>,
}

impl LogWatch {
    /// Start watching `log_key`. Must be called from within a tokio runtime.
    pub fn start<L: LogSource>(source: Arc<L>, log_key: LogKey, options: LogWatchOptions) -> Self {
        let session_id = Uuid::new_v4();
        let (state_tx, state) = watch::channel(LogStreamAggregator::new(
            options.max_bytes,
            options.server_root,
        ));
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (chunks_tx, chunks_rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            session = %session_id,
            log_key = %log_key,
            max_bytes = options.max_bytes,
            "Log watch started"
        );

        let actor = Actor {
            source,
            log_key: log_key.clone(),
            state: state_tx,
        };
        let span = info_span!("log_watch", session = %session_id);
        let stream_task = tokio::spawn(
            forward_chunks(
                Arc::clone(&actor.source),
                log_key.clone(),
                options.start_cursor,
                chunks_tx,
            )
            .instrument(span.clone()),
        );
        let actor_task = tokio::spawn(
            actor
                .run(commands_rx, chunks_rx, shutdown_rx)
                .instrument(span),
        );

        Self {
            session_id,
            log_key,
            state,
            commands,
            shutdown: Some(shutdown_tx),
            actor: Some(actor_task),
            stream: Some(stream_task),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn log_key(&self) -> &LogKey {
        &self.log_key
    }

    /// Receiver for the aggregator; borrow it to render views.
    pub fn subscribe(&self) -> watch::Receiver<LogStreamAggregator> {
        self.state.clone()
    }

    pub fn state(&self) -> LogState {
        self.state.borrow().state().clone()
    }

    /// Last stored cursor, for resuming in a new session.
    pub fn cursor(&self) -> Option<LogCursor> {
        self.state.borrow().cursor().cloned()
    }

    /// Ask the session to fetch metadata again.
    pub fn refresh_metadata(&self) -> Result<(), WatchError> {
        self.commands
            .send(Command::RefreshMetadata)
            .map_err(|_| WatchError::SessionStopped)
    }

    /// Stop the session, dropping the chunk subscription even if it is still opening.
    pub async fn stop(mut self) {
        if let Some(stream) = self.stream.take() {
            stream.abort();
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(actor) = self.actor.take() {
            if let Err(err) = actor.await {
                if !err.is_cancelled() {
                    warn!(session = %self.session_id, "Log watch actor failed: {}", err);
                }
            }
        }
        info!(session = %self.session_id, "Log watch stopped");
    }
}

impl Drop for LogWatch {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.abort();
        }
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
    }
}

struct Actor<L> {
    source: Arc<L>,
    log_key: LogKey,
    state: watch::Sender<LogStreamAggregator>,
}

impl<L: LogSource> Actor<L> {
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut chunks: mpsc::Receiver<Result<LogChunk, SourceError>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let (metadata_tx, mut metadata_rx) = mpsc::unbounded_channel();
        self.fetch_metadata(&metadata_tx);
        let mut stream_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some(command) = commands.recv() => match command {
                    Command::RefreshMetadata => self.fetch_metadata(&metadata_tx),
                },
                Some(result) = metadata_rx.recv() => self.on_metadata(result),
                item = chunks.recv(), if stream_open => match item {
                    Some(Ok(chunk)) => self.on_chunk(chunk),
                    Some(Err(err)) => {
                        warn!(log_key = %self.log_key, "{}", WatchError::Transport(err));
                    }
                    None => {
                        info!(
                            log_key = %self.log_key,
                            cursor = self.state.borrow().cursor().map(LogCursor::as_str),
                            "Log stream ended, keeping buffers"
                        );
                        stream_open = false;
                    }
                },
            }
        }
        debug!("Log watch actor exiting");
    }

    fn fetch_metadata(
        &self,
        done: &mpsc::UnboundedSender<Result<CapturedLogMetadata, SourceError>>,
    ) {
        let source = Arc::clone(&self.source);
        let log_key = self.log_key.clone();
        let done = done.clone();
        tokio::spawn(
            async move {
                let result = source.fetch_log_metadata(&log_key).await;
                let _ = done.send(result);
            }
            .in_current_span(),
        );
    }

    fn on_metadata(&self, result: Result<CapturedLogMetadata, SourceError>) {
        match result {
            Ok(metadata) => {
                debug!(log_key = %self.log_key, "Log metadata received");
                self.state
                    .send_modify(|aggregator| aggregator.on_metadata(&metadata));
            }
            Err(err) => {
                warn!(log_key = %self.log_key, "{}", WatchError::Metadata(err));
            }
        }
    }

    fn on_chunk(&self, chunk: LogChunk) {
        self.state.send_modify(|aggregator| aggregator.on_chunk(chunk));
    }
}

/// Open the chunk subscription and forward it to the actor. Returning drops the
/// sender, which the actor reads as the end of the stream.
async fn forward_chunks<L: LogSource>(
    source: Arc<L>,
    log_key: LogKey,
    start_cursor: Option<LogCursor>,
    chunks: mpsc::Sender<Result<LogChunk, SourceError>>,
) {
    let mut subscription = match source
        .subscribe_log_chunks(&log_key, start_cursor.as_ref())
        .await
    {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(log_key = %log_key, "{}", WatchError::Transport(err));
            return;
        }
    };
    while let Some(item) = subscription.next().await {
        if chunks.send(item).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = LocwatchConfig::default();
        config.logs.max_bytes = 1024;
        config.logs.server_root = "http://localhost:3000".to_string();
        let options = LogWatchOptions::from_config(&config)
            .with_start_cursor(Some(LogCursor::new("42")));
        assert_eq!(options.max_bytes, 1024);
        assert_eq!(options.server_root, "http://localhost:3000");
        assert_eq!(options.start_cursor, Some(LogCursor::new("42")));
    }

    #[test]
    fn test_default_options_match_default_config() {
        let from_config = LogWatchOptions::from_config(&LocwatchConfig::default());
        assert_eq!(LogWatchOptions::default().max_bytes, from_config.max_bytes);
        assert_eq!(LogWatchOptions::default().max_bytes, DEFAULT_MAX_LOG_BYTES);
    }
}
