//! Snapshot delivery strategies: push subscription or interval polling.
//!
//! A transport only delivers observations, in order, to its session. It never diffs or
//! merges. The strategy is picked once per session by [`Transport::select`].

use crate::source::WorkspaceSource;
use locwatch_common::{LocationSnapshot, SourceError, TransportConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Whether the server advertised a working push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushAvailability {
    Available,
    Unavailable,
    /// Not advertised either way; push is attempted.
    #[default]
    Unknown,
}

/// Which strategy a session runs, for views and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Push,
    Poll,
    /// Session started disabled; nothing is observed.
    Disabled,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Poll => write!(f, "poll"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// One delivery from a transport to its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Snapshot(LocationSnapshot),
    Failed(SourceError),
    /// The transport stopped delivering (subscription ended or failed to open).
    Closed,
}

/// Selected delivery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Push,
    Poll { interval: Duration },
}

impl Transport {
    /// Push unless the server reported it unavailable or configuration disables it.
    pub fn select(availability: PushAvailability, config: &TransportConfig) -> Self {
        if config.disable_push || availability == PushAvailability::Unavailable {
            Self::Poll {
                interval: config.poll_interval(),
            }
        } else {
            Self::Push
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Push => TransportKind::Push,
            Self::Poll { .. } => TransportKind::Poll,
        }
    }

    /// Deliver observations into `events` until the receiver goes away or the transport
    /// closes.
    pub async fn run<S: WorkspaceSource>(
        self,
        source: Arc<S>,
        events: mpsc::Sender<TransportEvent>,
    ) {
        match self {
            Self::Push => run_push(source, events).await,
            Self::Poll { interval } => run_poll(source, interval, events).await,
        }
    }
}

async fn run_push<S: WorkspaceSource>(source: Arc<S>, events: mpsc::Sender<TransportEvent>) {
    let mut subscription = match source.subscribe_location_entries().await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!("Failed to open location subscription: {}", err);
            let _ = events.send(TransportEvent::Failed(err)).await;
            let _ = events.send(TransportEvent::Closed).await;
            return;
        }
    };
    info!("Location subscription opened");

    while let Some(item) = subscription.next().await {
        let event = match item {
            Ok(snapshot) => {
                debug!(entries = snapshot.len(), "Pushed snapshot received");
                TransportEvent::Snapshot(snapshot)
            }
            Err(err) => TransportEvent::Failed(err),
        };
        if events.send(event).await.is_err() {
            debug!("Session gone, dropping location subscription");
            return;
        }
    }

    info!("Location subscription ended");
    let _ = events.send(TransportEvent::Closed).await;
}

async fn run_poll<S: WorkspaceSource>(
    source: Arc<S>,
    period: Duration,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Polling location status (interval: {:?})", period);

    loop {
        ticker.tick().await;

        // The request is awaited inline, so ticks never overlap it.
        let result = source.fetch_location_entries().await;
        // Full period from the moment the request resolved.
        ticker.reset();

        let event = match result {
            Ok(snapshot) => {
                debug!(entries = snapshot.len(), "Polled snapshot received");
                TransportEvent::Snapshot(snapshot)
            }
            Err(err) => TransportEvent::Failed(err),
        };
        if events.send(event).await.is_err() {
            debug!("Session gone, stopping poll loop");
            return;
        }
    }
}
