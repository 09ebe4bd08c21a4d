use locwatch::Notification;
use std::sync::Once;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

const WAIT: Duration = Duration::from_secs(60);

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .json(),
            )
            .with(filter)
            .init();
    });
}

/// Next notification, failing the test if none arrives.
#[allow(dead_code)]
pub async fn next_notification(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Notification {
    match tokio::time::timeout(WAIT, rx.recv()).await {
        Ok(Some(notification)) => notification,
        Ok(None) => panic!("notification sink closed"),
        Err(_) => panic!("timed out waiting for a notification"),
    }
}

/// All notifications delivered so far.
#[allow(dead_code)]
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}

/// Wait until the published value satisfies `predicate`.
#[allow(dead_code)]
pub async fn wait_until<T>(
    rx: &mut watch::Receiver<T>,
    what: &str,
    predicate: impl FnMut(&T) -> bool,
) {
    match tokio::time::timeout(WAIT, rx.wait_for(predicate)).await {
        Ok(Ok(_)) => {}
        Ok(Err(_)) => panic!("session closed while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}
