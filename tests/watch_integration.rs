//! Tests running an engine against a live filesystem watcher.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{append, oracle_block, stale_engine, RecordingNotifier};
use node_alerts::alert::SuppressionPolicy;
use node_alerts::watcher::FileSystemWatcher;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Poll `check` until it holds or `timeout` elapses.
async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

/// Writes into a new hourly bucket are picked up and alerted.
#[tokio::test]
async fn test_live_watch_alerts_on_new_file() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(1000),
        notifier.clone(),
    );

    let (watcher, events) =
        FileSystemWatcher::start(dir.path().to_path_buf()).expect("Failed to start watcher");
    engine.scan().expect("scan failed");

    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let stats = engine.run(events, cancel).await;
            drop(watcher);
            stats
        }
    });

    let path = dir.path().join("oracle");
    append(&path, &format!("{}\n", oracle_block(500, 45)));

    let delivered = eventually(Duration::from_secs(5), || notifier.count() >= 1).await;

    cancel.cancel();
    let stats = handle.await.expect("engine task panicked");

    assert!(delivered, "no alert within timeout");
    assert_eq!(notifier.count(), 1);
    assert!(stats.fs_events >= 1);
    assert_eq!(stats.alerts_sent, 1);
}

/// Cancelling stops the engine even while the watcher is idle.
#[tokio::test]
async fn test_cancel_stops_idle_engine() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::None,
        Arc::new(RecordingNotifier::default()),
    );

    let (_watcher, events) =
        FileSystemWatcher::start(dir.path().to_path_buf()).expect("Failed to start watcher");
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { engine.run(events, cancel).await }
    });

    cancel.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine did not stop")
        .expect("engine task panicked");
    assert_eq!(stats.alerts_sent, 0);
}
