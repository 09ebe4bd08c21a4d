//! Status watch session: one actor task owning a [`StatusReconciler`].
//!
//! The transport runs in its own task and feeds the actor through a channel. Refetches
//! are spawned and report back through a second channel, so observations keep flowing
//! while a refetch is outstanding. The latest [`StatusView`] is published on a
//! `tokio::sync::watch` channel.

use crate::notify::NotificationSink;
use crate::reconciler::{LocationStatus, RefetchMode, StatusReconciler};
use crate::source::{DEFAULT_SUBSCRIPTION_BUFFER, WorkspaceSource};
use crate::transport::{PushAvailability, Transport, TransportEvent, TransportKind};
use locwatch_common::{
    LocationSnapshot, LocwatchConfig, SourceError, TransportConfig, WorkspaceReload,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Session start parameters.
#[derive(Debug, Clone, Default)]
pub struct StatusWatchOptions {
    /// Push availability as advertised by the server, read once.
    pub availability: PushAvailability,
    pub transport: TransportConfig,
}

impl StatusWatchOptions {
    pub fn from_config(config: &LocwatchConfig, availability: PushAvailability) -> Self {
        Self {
            availability,
            transport: config.transport.clone(),
        }
    }
}

/// Latest state published by a status session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
    pub entries: LocationSnapshot,
    pub summary: Option<LocationStatus>,
    pub transport: TransportKind,
}

impl StatusView {
    fn idle(transport: TransportKind) -> Self {
        Self {
            entries: Vec::new(),
            summary: None,
            transport,
        }
    }
}

type RefetchDone = (RefetchMode, Result<WorkspaceReload, SourceError>);

/// Handle to a running status watch session.
pub struct StatusWatch {
    session_id: Uuid,
    kind: TransportKind,
    view: watch::Receiver<StatusView>,
    shutdown: Option<oneshot::Sender<()>>,
    actor: Option<JoinHandle<()>>,
    transport: Option<JoinHandle<()>>,
}

impl StatusWatch {
    /// Start a session. Must be called from within a tokio runtime.
    pub fn start<S, N>(source: Arc<S>, sink: Arc<N>, options: StatusWatchOptions) -> Self
    where
        S: WorkspaceSource,
        N: NotificationSink + 'static,
    {
        let session_id = Uuid::new_v4();
        let transport = Transport::select(options.availability, &options.transport);
        let kind = transport.kind();
        let (view_tx, view) = watch::channel(StatusView::idle(kind));
        let (events_tx, events_rx) = mpsc::channel(DEFAULT_SUBSCRIPTION_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(
            session = %session_id,
            transport = %kind,
            availability = ?options.availability,
            "Status watch started"
        );

        let span = info_span!("status_watch", session = %session_id);
        let transport_task = tokio::spawn(
            transport
                .run(Arc::clone(&source), events_tx)
                .instrument(span.clone()),
        );
        let actor = Actor {
            kind,
            source,
            sink,
            reconciler: StatusReconciler::new(),
            view: view_tx,
        };
        let actor_task = tokio::spawn(actor.run(events_rx, shutdown_rx).instrument(span));

        Self {
            session_id,
            kind,
            view,
            shutdown: Some(shutdown_tx),
            actor: Some(actor_task),
            transport: Some(transport_task),
        }
    }

    /// A session that observes nothing and stays idle.
    pub fn disabled() -> Self {
        let (_view_tx, view) = watch::channel(StatusView::idle(TransportKind::Disabled));
        Self {
            session_id: Uuid::new_v4(),
            kind: TransportKind::Disabled,
            view,
            shutdown: None,
            actor: None,
            transport: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    /// Receiver for the published view.
    pub fn view(&self) -> watch::Receiver<StatusView> {
        self.view.clone()
    }

    pub fn current(&self) -> StatusView {
        self.view.borrow().clone()
    }

    /// Stop the session. Refetches already started run to completion, but nothing
    /// is reported for them.
    pub async fn stop(mut self) {
        if let Some(transport) = self.transport.take() {
            transport.abort();
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(actor) = self.actor.take() {
            if let Err(err) = actor.await {
                if !err.is_cancelled() {
                    warn!(session = %self.session_id, "Status watch actor failed: {}", err);
                }
            }
        }
        info!(session = %self.session_id, "Status watch stopped");
    }
}

impl Drop for StatusWatch {
    fn drop(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.abort();
        }
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
    }
}

struct Actor<S, N> {
    kind: TransportKind,
    source: Arc<S>,
    sink: Arc<N>,
    reconciler: StatusReconciler,
    view: watch::Sender<StatusView>,
}

impl<S, N> Actor<S, N>
where
    S: WorkspaceSource,
    N: NotificationSink + 'static,
{
    async fn run(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let (refetch_tx, mut refetch_rx) = mpsc::unbounded_channel::<RefetchDone>();
        let mut transport_open = true;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                Some((mode, result)) = refetch_rx.recv() => {
                    if let Some(notification) = self.reconciler.complete_refetch(mode, result) {
                        self.sink.notify(notification);
                    }
                    self.publish();
                }
                event = events.recv(), if transport_open => match event {
                    Some(TransportEvent::Snapshot(snapshot)) => {
                        self.on_snapshot(snapshot, &refetch_tx);
                    }
                    Some(TransportEvent::Failed(err)) => {
                        if let Some(notification) = self.reconciler.observe_failure(&err) {
                            self.sink.notify(notification);
                        }
                    }
                    Some(TransportEvent::Closed) | None => {
                        info!(transport = %self.kind, "Transport closed, keeping last view");
                        transport_open = false;
                    }
                },
            }
        }
        debug!("Status watch actor exiting");
    }

    fn on_snapshot(
        &mut self,
        snapshot: LocationSnapshot,
        refetch_tx: &mpsc::UnboundedSender<RefetchDone>,
    ) {
        let reaction = self.reconciler.observe(snapshot);
        for notification in reaction.notifications {
            self.sink.notify(notification);
        }
        if let Some(mode) = reaction.refetch {
            let source = Arc::clone(&self.source);
            let done = refetch_tx.clone();
            debug!(mode = ?mode, "Starting workspace refetch");
            tokio::spawn(
                async move {
                    let result = source.refetch_workspace().await;
                    // Receiver is gone once the session stopped.
                    let _ = done.send((mode, result));
                }
                .in_current_span(),
            );
        }
        self.publish();
    }

    fn publish(&self) {
        self.view.send_replace(StatusView {
            entries: self.reconciler.entries().to_vec(),
            summary: self.reconciler.summarize(),
            transport: self.kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_session_is_idle() {
        let watch = StatusWatch::disabled();
        assert_eq!(watch.transport_kind(), TransportKind::Disabled);
        let view = watch.current();
        assert!(view.entries.is_empty());
        assert_eq!(view.summary, None);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = LocwatchConfig::default();
        config.transport.disable_push = true;
        let options = StatusWatchOptions::from_config(&config, PushAvailability::Available);
        assert!(options.transport.disable_push);
        assert_eq!(options.availability, PushAvailability::Available);
    }
}
