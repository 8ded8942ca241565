//! End-to-end tests driving the tail engine with filesystem events.

mod common;

use std::sync::Arc;

use common::{
    append, liquidation_engine, liquidation_engine_with, oracle_block, stale_engine,
    RecordingNotifier,
};
use node_alerts::alert::SuppressionPolicy;
use node_alerts::engine::EngineOptions;
use node_alerts::watcher::FsEvent;
use tempfile::TempDir;

const BACKSTOP: &str =
    r#"{"liquidatedUser":"0xabc","method":"backstop","coin":"BTC","px":"100","sz":"1"}"#;
const MARKET: &str =
    r#"{"liquidatedUser":"0xabc","method":"market","coin":"BTC","px":"30000","sz":"0.1"}"#;

/// A backstop liquidation for an allow-listed coin is dispatched once.
#[tokio::test]
async fn test_backstop_liquidation_dispatches_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 1_000_000, &["BTC"], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(path.clone())).await;
    engine.handle(FsEvent::Modified(path.clone())).await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("Liquidation alert: backstop"));
    assert!(messages[0].contains("user: 0xabc"));
    assert_eq!(engine.stats().alerts_sent, 1);
}

/// A market liquidation alerts only when notional exceeds the threshold.
#[tokio::test]
async fn test_market_liquidation_threshold() {
    for (threshold, expected) in [(2500, 1), (5000, 0)] {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let notifier = Arc::new(RecordingNotifier::default());
        let mut engine = liquidation_engine(dir.path(), threshold, &["BTC"], notifier.clone());

        let path = dir.path().join("fills");
        append(&path, &format!("{MARKET}\n"));
        engine.handle(FsEvent::Created(path)).await;

        assert_eq!(notifier.count(), expected, "threshold {threshold}");
    }
}

/// The market alert text carries the formatted notional and threshold.
#[tokio::test]
async fn test_market_alert_message() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 2500, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{MARKET}\n"));
    engine.handle(FsEvent::Created(path)).await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("notional: $3,000.00 (threshold $2,500.00)"));
}

/// A coin outside the allow-list never reaches the dispatcher.
#[tokio::test]
async fn test_allow_list_blocks_other_coins() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &["ETH"], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 0);
    assert_eq!(engine.stats().alerts_filtered, 1);
}

/// Liquidations embedded in a fills block are extracted and alerted.
#[tokio::test]
async fn test_fills_block_liquidation() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 2500, &[], notifier.clone());

    let block = r#"{"block_number":812,"block_time":"2025-06-01T12:00:00","events":[["0xu1",{"coin":"ETH","px":"2500","sz":"1","hash":"0x01"}],["0xu2",{"coin":"BTC","px":"100000","sz":"2","hash":"0x02","liquidation":{"method":"backstop","liquidatedUser":"0xdead"}}]]}"#;
    let path = dir.path().join("fills");
    append(&path, &format!("{block}\n"));
    engine.handle(FsEvent::Created(path)).await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("hash: 0x02"));
    assert!(messages[0].contains("block: 812"));
}

/// A stale feed alerts once per block; the same block never re-alerts.
#[tokio::test]
async fn test_stale_block_alerts_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(1000),
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    append(&path, &format!("{}\n", oracle_block(77, 40)));
    engine.handle(FsEvent::Created(path.clone())).await;

    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Total Stale Markets: 1"));
    assert!(messages[0].contains("1. xyz:TSLA - Skew: 40.000s"));
    assert!(!messages[0].contains("xyz:NVDA"));

    append(&path, &format!("{}\n", oracle_block(77, 40)));
    engine.handle(FsEvent::Modified(path)).await;
    assert_eq!(notifier.count(), 1);
    assert_eq!(engine.stats().alerts_suppressed, 1);
}

/// A block whose feeds are all fresh stays quiet.
#[tokio::test]
async fn test_fresh_oracle_block_is_quiet() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(1000),
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    append(&path, &format!("{}\n", oracle_block(78, 10)));
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 0);
    assert_eq!(engine.stats().events, 1);
}

/// A failed send leaves the key out of the gate, so the block alerts again.
#[tokio::test]
async fn test_failed_send_is_not_remembered() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::failing());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(1000),
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    append(&path, &format!("{}\n", oracle_block(90, 40)));
    engine.handle(FsEvent::Created(path.clone())).await;
    append(&path, &format!("{}\n", oracle_block(90, 40)));
    engine.handle(FsEvent::Modified(path)).await;

    assert_eq!(notifier.count(), 2);
    assert_eq!(engine.stats().send_failures, 2);
    assert_eq!(engine.stats().alerts_sent, 0);
}

/// Evicted keys alert again once they reoccur.
#[tokio::test]
async fn test_dedup_capacity_evicts_oldest() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(2),
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    std::fs::write(&path, "").expect("Failed to create file");
    engine.handle(FsEvent::Created(path.clone())).await;

    for block in [1, 2, 3] {
        append(&path, &format!("{}\n", oracle_block(block, 40)));
    }
    engine.handle(FsEvent::Modified(path.clone())).await;
    assert_eq!(notifier.count(), 3);

    // 2 and 3 are resident, 1 was evicted.
    append(&path, &format!("{}\n", oracle_block(3, 40)));
    engine.handle(FsEvent::Modified(path.clone())).await;
    assert_eq!(notifier.count(), 3);

    append(&path, &format!("{}\n", oracle_block(1, 40)));
    engine.handle(FsEvent::Modified(path)).await;
    assert_eq!(notifier.count(), 4);
}

/// A rate-limited category admits its quota and then holds back.
#[tokio::test]
async fn test_rate_limited_category() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::RateLimit {
            max_alerts: 2,
            window_secs: 3600,
        },
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    for block in 1..=4 {
        append(&path, &format!("{}\n", oracle_block(block, 40)));
    }
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 2);
    assert_eq!(engine.stats().alerts_suppressed, 2);
}

/// Re-delivering a modification with no new bytes yields nothing.
#[tokio::test]
async fn test_repeated_modified_event_is_idempotent() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(path.clone())).await;
    let lines = engine.stats().lines;

    for _ in 0..3 {
        engine.handle(FsEvent::Modified(path.clone())).await;
    }
    assert_eq!(engine.stats().lines, lines);
    assert_eq!(notifier.count(), 1);
}

/// After truncation, reading restarts at 0 and new lines still flow.
#[tokio::test]
async fn test_rotation_resets_offset() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = stale_engine(
        dir.path(),
        30.0,
        SuppressionPolicy::identity(1000),
        notifier.clone(),
    );

    let path = dir.path().join("oracle");
    append(&path, &format!("{}\n{}\n", oracle_block(1, 40), oracle_block(2, 40)));
    engine.handle(FsEvent::Created(path.clone())).await;
    assert_eq!(notifier.count(), 2);

    let short = format!("{}\n", oracle_block(3, 40));
    std::fs::write(&path, &short).expect("Failed to truncate file");
    engine.handle(FsEvent::Modified(path.clone())).await;

    assert_eq!(notifier.count(), 3);
    assert_eq!(engine.stats().truncations, 1);
    assert_eq!(
        engine.table().get(&path).expect("file tracked").offset,
        short.len() as u64
    );
}

/// Renaming a file carries its offset and partial line to the new path.
#[tokio::test]
async fn test_rename_preserves_state() {
    let (head, tail) = BACKSTOP.split_at(30);

    // Renamed mid-line.
    let renamed_dir = TempDir::new().expect("Failed to create temp dir");
    let renamed = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(renamed_dir.path(), 0, &[], renamed.clone());

    let a = renamed_dir.path().join("a");
    let b = renamed_dir.path().join("b");
    append(&a, head);
    engine.handle(FsEvent::Created(a.clone())).await;
    std::fs::rename(&a, &b).expect("Failed to rename");
    engine.handle(FsEvent::MovedTo(a.clone(), b.clone())).await;
    append(&b, &format!("{tail}\n"));
    engine.handle(FsEvent::Modified(b.clone())).await;

    assert!(!engine.table().contains(&a));
    assert!(engine.table().contains(&b));

    // Never renamed.
    let plain_dir = TempDir::new().expect("Failed to create temp dir");
    let plain = Arc::new(RecordingNotifier::default());
    let mut reference = liquidation_engine(plain_dir.path(), 0, &[], plain.clone());

    let p = plain_dir.path().join("a");
    append(&p, head);
    reference.handle(FsEvent::Created(p.clone())).await;
    append(&p, &format!("{tail}\n"));
    reference.handle(FsEvent::Modified(p)).await;

    assert_eq!(renamed.count(), 1);
    assert_eq!(renamed.messages(), plain.messages());
    assert_eq!(engine.stats().lines, reference.stats().lines);
}

/// Renaming a bucket directory rebases every tracked file below it.
#[tokio::test]
async fn test_directory_rename_rebases_children() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let old_bucket = dir.path().join("20250601").join("12");
    std::fs::create_dir_all(&old_bucket).expect("Failed to create bucket");
    let old_file = old_bucket.join("fills");
    append(&old_file, &format!("{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(old_file.clone())).await;
    assert_eq!(notifier.count(), 1);

    let new_bucket = dir.path().join("20250601").join("12.done");
    std::fs::rename(&old_bucket, &new_bucket).expect("Failed to rename bucket");
    engine
        .handle(FsEvent::MovedTo(old_bucket.clone(), new_bucket.clone()))
        .await;

    let new_file = new_bucket.join("fills");
    assert!(engine.table().contains(&new_file));
    assert_eq!(
        engine.table().get(&new_file).expect("file tracked").offset,
        BACKSTOP.len() as u64 + 1
    );
}

/// A JSON value spread over several lines is assembled before extraction.
#[tokio::test]
async fn test_multiline_record() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(
        &path,
        "{\"liquidatedUser\": \"0xabc\",\n  \"method\": \"backstop\",\n  \"coin\": \"BTC\"}\n",
    );
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 1);
    assert_eq!(engine.stats().records, 1);
    assert_eq!(engine.stats().lines, 3);
}

/// Noise, malformed JSON and unknown shapes are skipped without stopping
/// the following records.
#[tokio::test]
async fn test_garbage_does_not_block_later_records() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(
        &path,
        &format!("node booting\n{{\"broken\": \n{{\"unrelated\": true}}\n\r\n{BACKSTOP}\r\n"),
    );
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 1);
}

/// Existing files are registered at EOF by default, so catch-up reads
/// nothing.
#[tokio::test]
async fn test_scan_tails_existing_files_from_end() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bucket = dir.path().join("20250601").join("12");
    std::fs::create_dir_all(&bucket).expect("Failed to create bucket");
    append(&bucket.join("fills"), &format!("{BACKSTOP}\n"));

    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());
    assert_eq!(engine.scan().expect("scan failed"), 1);

    // Tailing from the end: nothing to catch up.
    engine.catch_up().await;
    assert_eq!(notifier.count(), 0);
}

/// With read-existing-at-start, catch-up evaluates content already on disk.
#[tokio::test]
async fn test_catch_up_reads_existing_content() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let bucket = dir.path().join("20250601").join("12");
    std::fs::create_dir_all(&bucket).expect("Failed to create bucket");
    append(&bucket.join("fills"), &format!("{BACKSTOP}\n"));

    let mut options = EngineOptions::new("liquidations", dir.path());
    options.read_existing_at_start = true;
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine_with(options, 0, &[], notifier.clone());

    assert_eq!(engine.scan().expect("scan failed"), 1);
    engine.catch_up().await;
    assert_eq!(notifier.count(), 1);
    assert!(notifier.messages()[0].starts_with("Liquidation alert: backstop"));

    // Already consumed; a second pass sends nothing.
    engine.catch_up().await;
    assert_eq!(notifier.count(), 1);
}

/// A file created while tailing from the end only yields later appends.
#[tokio::test]
async fn test_created_file_tails_from_end() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut options = EngineOptions::new("liquidations", dir.path());
    options.read_new_files_from_start = false;
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine_with(options, 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(path.clone())).await;
    assert_eq!(notifier.count(), 0);

    append(&path, &format!("{MARKET}\n"));
    engine.handle(FsEvent::Modified(path)).await;
    let messages = notifier.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("method: market"));
}

/// Fills without a hash alert separately when they differ in coin or time.
#[tokio::test]
async fn test_distinct_hashless_liquidations_both_alert() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(
        &path,
        concat!(
            r#"{"time":1,"liquidatedUser":"0xabc","method":"backstop","coin":"BTC","px":"100","sz":"1"}"#,
            "\n",
            r#"{"time":2,"liquidatedUser":"0xabc","method":"backstop","coin":"ETH","px":"10","sz":"2"}"#,
            "\n",
        ),
    );
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 2);
    assert_eq!(engine.stats().alerts_suppressed, 0);
}

/// An exact repeat of a hashless fill is suppressed.
#[tokio::test]
async fn test_repeated_hashless_liquidation_alerts_once() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let notifier = Arc::new(RecordingNotifier::default());
    let mut engine = liquidation_engine(dir.path(), 0, &[], notifier.clone());

    let path = dir.path().join("fills");
    append(&path, &format!("{BACKSTOP}\n{BACKSTOP}\n"));
    engine.handle(FsEvent::Created(path)).await;

    assert_eq!(notifier.count(), 1);
    assert_eq!(engine.stats().alerts_suppressed, 1);
}
