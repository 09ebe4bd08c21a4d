mod common;

use common::{drain, init_test_logging, next_notification, wait_until};
use locwatch::mock::ScriptedWorkspaceSource;
use locwatch::{
    ChannelSink, NotificationBus, NotificationKind, PushAvailability, StatusWatch,
    StatusWatchOptions, TransportKind,
};
use locwatch_common::{CodeLocationEntry as Entry, SourceError, TransportConfig, WorkspaceReload};
use std::sync::Arc;
use std::time::Duration;

fn push_options() -> StatusWatchOptions {
    StatusWatchOptions::default()
}

fn poll_options(poll_interval_ms: u64) -> StatusWatchOptions {
    StatusWatchOptions {
        availability: PushAvailability::Unavailable,
        transport: TransportConfig {
            disable_push: false,
            poll_interval_ms,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_grown_announces_added_then_reloaded() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());
    assert_eq!(watch.transport_kind(), TransportKind::Push);

    source.push(vec![Entry::loaded("A")]).await;
    source
        .push(vec![Entry::loaded("A"), Entry::loaded("B")])
        .await;

    let added = next_notification(&mut rx).await;
    assert_eq!(added.kind, NotificationKind::Added);
    assert_eq!(added.message, "Code location B added");
    let reloaded = next_notification(&mut rx).await;
    assert_eq!(reloaded.kind, NotificationKind::Reloaded);
    assert_eq!(reloaded.message, "Definitions reloaded");

    let mut view = watch.view();
    wait_until(&mut view, "idle view with two entries", |v| {
        v.entries.len() == 2 && v.summary.is_none()
    })
    .await;
    assert_eq!(source.refetch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_new_loading_entry_is_updating_not_added() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source.push(vec![Entry::loaded("A")]).await;
    source
        .push(vec![Entry::loaded("A"), Entry::loading("B")])
        .await;

    let updating = next_notification(&mut rx).await;
    assert_eq!(updating.kind, NotificationKind::Updating);
    assert_eq!(updating.message, "Updating B");

    let mut view = watch.view();
    wait_until(&mut view, "busy view", |v| {
        v.summary.is_some_and(|status| status.busy)
    })
    .await;
    assert_eq!(source.refetch_calls(), 0);

    source
        .push(vec![Entry::loaded("A"), Entry::loaded("B")])
        .await;
    let reloaded = next_notification(&mut rx).await;
    assert_eq!(reloaded.kind, NotificationKind::Reloaded);
    wait_until(&mut view, "idle view", |v| v.summary.is_none()).await;
    assert_eq!(source.refetch_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_push_shrunk_refetches_silently() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source
        .push(vec![Entry::loaded("A"), Entry::loaded("B"), Entry::loaded("C")])
        .await;
    source
        .push(vec![Entry::loaded("A"), Entry::loaded("D")])
        .await;

    let mut view = watch.view();
    wait_until(&mut view, "shrunk snapshot with refetch done", |v| {
        v.entries.len() == 2 && v.summary.is_none()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(source.refetch_calls(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refetch_failure_is_reported_as_error() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new().with_reloads(vec![Err(
        SourceError::Request("502 Bad Gateway".to_string()),
    )]));
    let (sink, mut rx) = ChannelSink::new();
    let _watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source.push(vec![Entry::loading("A")]).await;
    source.push(vec![Entry::loaded("A")]).await;

    let failed = next_notification(&mut rx).await;
    assert_eq!(failed.kind, NotificationKind::Error);
    assert!(failed.message.contains("502 Bad Gateway"));
}

#[tokio::test(start_paused = true)]
async fn test_loaded_with_errors_warns_and_summarizes() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new().with_reloads(vec![Ok(
        WorkspaceReload::from_entries(vec![Entry::loaded("A").with_error()]),
    )]));
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source.push(vec![Entry::loading("A")]).await;
    source.push(vec![Entry::loaded("A").with_error()]).await;

    let warning = next_notification(&mut rx).await;
    assert_eq!(warning.kind, NotificationKind::Warning);
    assert!(warning.message.starts_with("Workspace loaded with errors"));

    let mut view = watch.view();
    wait_until(&mut view, "error summary", |v| {
        v.summary
            .is_some_and(|status| !status.busy && status.error_count == 1)
    })
    .await;
    let summary = watch.current().summary.unwrap();
    assert_eq!(summary.message(), "1 code location failed to load");
}

#[tokio::test(start_paused = true)]
async fn test_push_subscription_end_keeps_last_view() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let (sink, _rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source.push(vec![Entry::loaded("A")]).await;
    source.close_push();

    let mut view = watch.view();
    wait_until(&mut view, "first snapshot", |v| v.entries.len() == 1).await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(watch.current().entries, vec![Entry::loaded("A")]);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_push_selects_poll() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new().with_polls(vec![
        Ok(vec![Entry::loaded("A")]),
        Ok(vec![Entry::loaded("A"), Entry::loaded("B")]),
    ]));
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), poll_options(3000));
    assert_eq!(watch.transport_kind(), TransportKind::Poll);

    let added = next_notification(&mut rx).await;
    assert_eq!(added.kind, NotificationKind::Added);
    assert_eq!(added.message, "Code location B added");
}

#[tokio::test(start_paused = true)]
async fn test_disable_push_selects_poll_even_when_available() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let (sink, _rx) = ChannelSink::new();
    let options = StatusWatchOptions {
        availability: PushAvailability::Available,
        transport: TransportConfig {
            disable_push: true,
            poll_interval_ms: 3000,
        },
    };
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), options);
    assert_eq!(watch.transport_kind(), TransportKind::Poll);

    tokio::time::sleep(Duration::from_millis(6500)).await;
    assert_eq!(source.fetch_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_slow_poll_skips_tick_and_restarts_timer_after_resolve() {
    init_test_logging();
    let source = Arc::new(
        ScriptedWorkspaceSource::new()
            .with_polls(vec![Ok(vec![Entry::loaded("A")])])
            .with_fetch_delay(Duration::from_millis(5000)),
    );
    let (sink, _rx) = ChannelSink::new();
    let _watch = StatusWatch::start(source.clone(), Arc::new(sink), poll_options(3000));

    tokio::time::sleep(Duration::from_millis(20_000)).await;

    assert_eq!(source.max_in_flight(), 1);
    let started = source.fetch_started();
    // Requests start at 0s, 8s and 16s: each waits a full interval after the
    // previous one resolved.
    assert_eq!(started.len(), 3);
    for pair in started.windows(2) {
        let gap = pair[1] - pair[0];
        assert!(
            gap >= Duration::from_millis(8000) && gap < Duration::from_millis(8100),
            "unexpected gap between polls: {gap:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_poll_failures_warn_once() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new().with_polls(vec![
        Ok(vec![Entry::loaded("A")]),
        Err(SourceError::Timeout(3000)),
        Err(SourceError::Timeout(3000)),
        Ok(vec![Entry::loaded("A")]),
        Err(SourceError::Request("connection refused".to_string())),
    ]));
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), poll_options(1000));

    tokio::time::sleep(Duration::from_millis(10_500)).await;

    let notifications = drain(&mut rx);
    let kinds: Vec<_> = notifications.iter().map(|n| n.kind).collect();
    assert_eq!(kinds, vec![NotificationKind::Warning, NotificationKind::Warning]);
    assert!(notifications[1].message.contains("connection refused"));
    // Failures never touch the stored snapshot.
    assert_eq!(watch.current().entries, vec![Entry::loaded("A")]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_suppresses_outstanding_refetch() {
    init_test_logging();
    let source = Arc::new(
        ScriptedWorkspaceSource::new().with_refetch_delay(Duration::from_secs(10)),
    );
    let (sink, mut rx) = ChannelSink::new();
    let watch = StatusWatch::start(source.clone(), Arc::new(sink), push_options());

    source.push(vec![Entry::loaded("A")]).await;
    source
        .push(vec![Entry::loaded("A"), Entry::loaded("B")])
        .await;
    assert_eq!(
        next_notification(&mut rx).await.kind,
        NotificationKind::Added
    );

    watch.stop().await;
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(source.refetch_calls(), 1);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notification_bus_as_sink() {
    init_test_logging();
    let source = Arc::new(ScriptedWorkspaceSource::new());
    let bus = NotificationBus::default();
    let mut events = bus.subscribe();
    let _watch = StatusWatch::start(source.clone(), Arc::new(bus), push_options());

    source.push(vec![Entry::loaded("A")]).await;
    source
        .push(vec![Entry::loaded("A"), Entry::loaded("B")])
        .await;

    let line = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for bus event")
        .expect("bus closed");
    let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(parsed["event"], "notification");
    assert_eq!(parsed["data"]["kind"], "added");
}

#[test]
fn test_disabled_watch_publishes_idle_view() {
    let watch = StatusWatch::disabled();
    assert_eq!(watch.transport_kind(), TransportKind::Disabled);
    let view = watch.current();
    assert!(view.entries.is_empty());
    assert!(view.summary.is_none());
}
