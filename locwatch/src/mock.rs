//! Deterministic in-memory sources for tests and the replay CLI.
//!
//! Results are scripted FIFO. When a script runs dry the sources fall back to a sticky
//! value (the last successful snapshot, default metadata) instead of failing.

use crate::source::{
    DEFAULT_SUBSCRIPTION_BUFFER, LogSource, Subscription, SubscriptionSender, WorkspaceSource,
};
use locwatch_common::{
    CapturedLogMetadata, LocationSnapshot, LogChunk, LogCursor, LogKey, SourceError,
    WorkspaceReload,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted [`WorkspaceSource`].
pub struct ScriptedWorkspaceSource {
    polls: Mutex<VecDeque<Result<LocationSnapshot, SourceError>>>,
    current: Mutex<LocationSnapshot>,
    reloads: Mutex<VecDeque<Result<WorkspaceReload, SourceError>>>,
    fetch_delay: Option<Duration>,
    refetch_delay: Option<Duration>,
    push_unavailable: bool,
    push_sender: Mutex<Option<SubscriptionSender<LocationSnapshot>>>,
    push_subscription: Mutex<Option<Subscription<LocationSnapshot>>>,
    fetch_started: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    refetch_calls: AtomicUsize,
}

impl Default for ScriptedWorkspaceSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedWorkspaceSource {
    pub fn new() -> Self {
        let (sender, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        Self {
            polls: Mutex::new(VecDeque::new()),
            current: Mutex::new(Vec::new()),
            reloads: Mutex::new(VecDeque::new()),
            fetch_delay: None,
            refetch_delay: None,
            push_unavailable: false,
            push_sender: Mutex::new(Some(sender)),
            push_subscription: Mutex::new(Some(subscription)),
            fetch_started: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            refetch_calls: AtomicUsize::new(0),
        }
    }

    /// Results returned by successive `fetch_location_entries` calls.
    pub fn with_polls(self, polls: Vec<Result<LocationSnapshot, SourceError>>) -> Self {
        *lock(&self.polls) = polls.into();
        self
    }

    /// Results returned by successive `refetch_workspace` calls.
    pub fn with_reloads(self, reloads: Vec<Result<WorkspaceReload, SourceError>>) -> Self {
        *lock(&self.reloads) = reloads.into();
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub fn with_refetch_delay(mut self, delay: Duration) -> Self {
        self.refetch_delay = Some(delay);
        self
    }

    /// Make `subscribe_location_entries` fail with `PushUnavailable`.
    pub fn without_push(mut self) -> Self {
        self.push_unavailable = true;
        self
    }

    /// Replace the sticky snapshot used by polls and default reloads.
    pub fn set_current(&self, snapshot: LocationSnapshot) {
        *lock(&self.current) = snapshot;
    }

    /// Queue a reload result.
    pub fn push_reload(&self, reload: Result<WorkspaceReload, SourceError>) {
        lock(&self.reloads).push_back(reload);
    }

    /// Deliver a snapshot on the push subscription.
    pub async fn push(&self, snapshot: LocationSnapshot) -> bool {
        self.send_push(Ok(snapshot)).await
    }

    /// Deliver a failure on the push subscription.
    pub async fn push_error(&self, err: SourceError) -> bool {
        self.send_push(Err(err)).await
    }

    async fn send_push(&self, item: Result<LocationSnapshot, SourceError>) -> bool {
        let sender = lock(&self.push_sender).clone();
        match sender {
            Some(sender) => sender.send(item).await.is_ok(),
            None => false,
        }
    }

    /// End the push subscription.
    pub fn close_push(&self) {
        lock(&self.push_sender).take();
    }

    /// Instants at which each poll request started.
    pub fn fetch_started(&self) -> Vec<Instant> {
        lock(&self.fetch_started).clone()
    }

    pub fn fetch_calls(&self) -> usize {
        lock(&self.fetch_started).len()
    }

    /// Highest number of poll requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn refetch_calls(&self) -> usize {
        self.refetch_calls.load(Ordering::SeqCst)
    }
}

impl WorkspaceSource for ScriptedWorkspaceSource {
    async fn fetch_location_entries(&self) -> Result<LocationSnapshot, SourceError> {
        lock(&self.fetch_started).push(Instant::now());
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.polls).pop_front();
        let result = match scripted {
            Some(Ok(snapshot)) => {
                *lock(&self.current) = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(err)) => Err(err),
            None => Ok(lock(&self.current).clone()),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn subscribe_location_entries(
        &self,
    ) -> Result<Subscription<LocationSnapshot>, SourceError> {
        if self.push_unavailable {
            return Err(SourceError::PushUnavailable);
        }
        lock(&self.push_subscription)
            .take()
            .ok_or_else(|| SourceError::SubscriptionClosed("already subscribed".to_string()))
    }

    async fn refetch_workspace(&self) -> Result<WorkspaceReload, SourceError> {
        self.refetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.refetch_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = lock(&self.reloads).pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(WorkspaceReload::from_entries(lock(&self.current).clone())),
        }
    }
}

/// Scripted [`LogSource`] serving a single chunk stream.
pub struct ScriptedLogSource {
    metadata: Mutex<VecDeque<Result<CapturedLogMetadata, SourceError>>>,
    chunk_sender: Mutex<Option<SubscriptionSender<LogChunk>>>,
    chunk_subscription: Mutex<Option<Subscription<LogChunk>>>,
    subscribed: Mutex<Vec<(LogKey, Option<LogCursor>)>>,
    metadata_calls: AtomicUsize,
}

impl Default for ScriptedLogSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLogSource {
    pub fn new() -> Self {
        let (sender, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        Self {
            metadata: Mutex::new(VecDeque::new()),
            chunk_sender: Mutex::new(Some(sender)),
            chunk_subscription: Mutex::new(Some(subscription)),
            subscribed: Mutex::new(Vec::new()),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    /// Results returned by successive `fetch_log_metadata` calls.
    pub fn with_metadata(self, metadata: Vec<Result<CapturedLogMetadata, SourceError>>) -> Self {
        *lock(&self.metadata) = metadata.into();
        self
    }

    pub fn push_metadata(&self, metadata: Result<CapturedLogMetadata, SourceError>) {
        lock(&self.metadata).push_back(metadata);
    }

    /// Deliver a chunk on the log subscription.
    pub async fn push_chunk(&self, chunk: LogChunk) -> bool {
        self.send_chunk(Ok(chunk)).await
    }

    pub async fn push_chunk_error(&self, err: SourceError) -> bool {
        self.send_chunk(Err(err)).await
    }

    async fn send_chunk(&self, item: Result<LogChunk, SourceError>) -> bool {
        let sender = lock(&self.chunk_sender).clone();
        match sender {
            Some(sender) => sender.send(item).await.is_ok(),
            None => false,
        }
    }

    /// End the chunk stream.
    pub fn end_stream(&self) {
        lock(&self.chunk_sender).take();
    }

    /// Keys and cursors passed to `subscribe_log_chunks`, in call order.
    pub fn subscriptions(&self) -> Vec<(LogKey, Option<LogCursor>)> {
        lock(&self.subscribed).clone()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

impl LogSource for ScriptedLogSource {
    async fn fetch_log_metadata(
        &self,
        _log_key: &LogKey,
    ) -> Result<CapturedLogMetadata, SourceError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = lock(&self.metadata).pop_front();
        scripted.unwrap_or_else(|| Ok(CapturedLogMetadata::default()))
    }

    async fn subscribe_log_chunks(
        &self,
        log_key: &LogKey,
        cursor: Option<&LogCursor>,
    ) -> Result<Subscription<LogChunk>, SourceError> {
        lock(&self.subscribed).push((log_key.clone(), cursor.cloned()));
        lock(&self.chunk_subscription)
            .take()
            .ok_or_else(|| SourceError::SubscriptionClosed("already subscribed".to_string()))
    }
}
