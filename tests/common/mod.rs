//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use node_alerts::alert::{
    AlertCategory, AlertDispatcher, AlertGate, AlertPredicate, LiquidationRules, Notifier,
    NotifyError, StaleRules, SuppressionPolicy,
};
use node_alerts::engine::{EngineOptions, TailEngine};
use rust_decimal::Decimal;

/// Notifier that keeps every message it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose sends always fail (messages are still recorded).
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().expect("notifier lock poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("notifier lock poisoned").len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier lock poisoned")
            .push(text.to_string());
        if self.fail {
            return Err(NotifyError::Status {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(())
    }
}

/// Liquidation engine over `root` reading new files from the start.
pub fn liquidation_engine(
    root: &Path,
    threshold: u32,
    coins: &[&str],
    notifier: Arc<RecordingNotifier>,
) -> TailEngine {
    liquidation_engine_with(
        EngineOptions::new("liquidations", root),
        threshold,
        coins,
        notifier,
    )
}

/// Liquidation engine with explicit start positions.
pub fn liquidation_engine_with(
    options: EngineOptions,
    threshold: u32,
    coins: &[&str],
    notifier: Arc<RecordingNotifier>,
) -> TailEngine {
    let predicate = AlertPredicate::new().with_liquidation_rules(LiquidationRules {
        usd_threshold: Decimal::from(threshold),
        allowed_coins: coins.iter().map(|c| (*c).to_string()).collect(),
    });
    let gate = AlertGate::new()
        .with_policy(AlertCategory::Backstop, SuppressionPolicy::identity(20_000))
        .with_policy(AlertCategory::Market, SuppressionPolicy::identity(20_000));
    TailEngine::new(
        options,
        predicate,
        gate,
        AlertDispatcher::new("market", notifier),
    )
}

/// Stale oracle engine over `root` with the given suppression.
pub fn stale_engine(
    root: &Path,
    threshold_secs: f64,
    suppression: SuppressionPolicy,
    notifier: Arc<RecordingNotifier>,
) -> TailEngine {
    let predicate = AlertPredicate::new().with_stale_rules(StaleRules {
        threshold_secs,
        markets: HashSet::new(),
    });
    let gate = AlertGate::new().with_policy(AlertCategory::Stale, suppression);
    TailEngine::new(
        EngineOptions::new("stale_oracle", root),
        predicate,
        gate,
        AlertDispatcher::new("market", notifier),
    )
}

/// Append `text` to `path`, creating it if needed.
pub fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open file for append");
    file.write_all(text.as_bytes())
        .expect("Failed to append to file");
}

/// Oracle block with one symbol lagging `lag_secs` behind block time and
/// one fresh symbol.
pub fn oracle_block(block: u64, lag_secs: u32) -> String {
    format!(
        concat!(
            r#"{{"block_number":{},"block_time":"2025-06-01T12:01:00","#,
            r#""events":[{{"oracle_pxs":{{"coin_to_mark_px":["#,
            r#"["xyz:TSLA",{{"last_update_time":"2025-06-01T12:{:02}:{:02}"}}],"#,
            r#"["xyz:NVDA",{{"last_update_time":"2025-06-01T12:00:59"}}]"#,
            r#"]}}}}]}}"#
        ),
        block,
        (60 - lag_secs) / 60,
        (60 - lag_secs) % 60,
    )
}
