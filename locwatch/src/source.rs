//! Contracts for the remote services a watch session talks to.
//!
//! Implementations own the wire format. The engine only sees decoded snapshots,
//! chunks and metadata.

use locwatch_common::{
    CapturedLogMetadata, LocationSnapshot, LogChunk, LogCursor, LogKey, SourceError,
    WorkspaceReload,
};
use std::future::Future;
use tokio::sync::mpsc;

/// Default buffer for subscription channels.
pub const DEFAULT_SUBSCRIPTION_BUFFER: usize = 64;

/// Ordered stream of items delivered by a long-lived subscription.
///
/// The stream ends when the producing side is dropped.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::Receiver<Result<T, SourceError>>,
}

/// Producing half of a [`Subscription`].
pub type SubscriptionSender<T> = mpsc::Sender<Result<T, SourceError>>;

impl<T> Subscription<T> {
    pub fn new(receiver: mpsc::Receiver<Result<T, SourceError>>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender/subscription pair.
    pub fn channel(buffer: usize) -> (SubscriptionSender<T>, Self) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (sender, Self::new(receiver))
    }

    /// Next delivered item, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<T, SourceError>> {
        self.receiver.recv().await
    }
}

/// Source of code-location status and dependent workspace data.
pub trait WorkspaceSource: Send + Sync + 'static {
    /// One-shot request for the current snapshot (poll transport).
    fn fetch_location_entries(
        &self,
    ) -> impl Future<Output = Result<LocationSnapshot, SourceError>> + Send;

    /// Long-lived subscription delivering a full snapshot per message (push transport).
    fn subscribe_location_entries(
        &self,
    ) -> impl Future<Output = Result<Subscription<LocationSnapshot>, SourceError>> + Send;

    /// Reload workspace data that depends on the code locations.
    fn refetch_workspace(
        &self,
    ) -> impl Future<Output = Result<WorkspaceReload, SourceError>> + Send;
}

/// Source of captured process logs.
pub trait LogSource: Send + Sync + 'static {
    fn fetch_log_metadata(
        &self,
        log_key: &LogKey,
    ) -> impl Future<Output = Result<CapturedLogMetadata, SourceError>> + Send;

    /// Subscribe to chunks after `cursor`, or from the beginning when `None`.
    fn subscribe_log_chunks(
        &self,
        log_key: &LogKey,
        cursor: Option<&LogCursor>,
    ) -> impl Future<Output = Result<Subscription<LogChunk>, SourceError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_delivers_in_order_then_ends() {
        let (tx, mut sub) = Subscription::<u32>::channel(4);
        tx.send(Ok(1)).await.unwrap();
        tx.send(Err(SourceError::Timeout(5))).await.unwrap();
        tx.send(Ok(2)).await.unwrap();
        drop(tx);

        assert_eq!(sub.next().await, Some(Ok(1)));
        assert_eq!(sub.next().await, Some(Err(SourceError::Timeout(5))));
        assert_eq!(sub.next().await, Some(Ok(2)));
        assert_eq!(sub.next().await, None);
    }

    #[test]
    fn test_zero_buffer_is_clamped() {
        // tokio panics on a zero-capacity channel.
        let (_tx, _sub) = Subscription::<()>::channel(0);
    }
}
