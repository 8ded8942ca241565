//! Alert predicates.
//!
//! Maps a [`DomainEvent`] to an alert decision. Evaluation is pure: the
//! same event and rules always give the same verdict.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::records::{DomainEvent, LiquidationEvent, OracleUpdatesEvent};

/// Maximum offenders listed in a stale-oracle alert.
pub const MAX_LISTED_OFFENDERS: usize = 20;

/// Kind of alert, used to pick the suppression strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Backstop liquidation (the liquidation vault took over the position).
    Backstop,
    /// Market liquidation above the notional threshold.
    Market,
    /// Oracle feeds lagging behind block time.
    Stale,
}

impl AlertCategory {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backstop => "backstop",
            Self::Market => "market",
            Self::Stale => "stale",
        }
    }
}

impl std::fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication identity of an alert within its category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey(String);

impl AlertKey {
    /// Build a key from any text.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a liquidation: transaction hash plus method.
    ///
    /// Fills without a hash are keyed on every field that tells two fills
    /// apart, so only an exact repeat of the same fill collides.
    #[must_use]
    pub fn for_liquidation(event: &LiquidationEvent) -> Self {
        let method = event.method.as_deref().unwrap_or("").to_ascii_lowercase();
        if let Some(hash) = event.hash.as_deref() {
            return Self(format!("{hash}:{method}"));
        }

        let field = |value: &Option<String>| value.as_deref().unwrap_or("?").to_string();
        let parts = [
            field(&event.block_number),
            field(&event.time),
            field(&event.liquidated_user),
            field(&event.coin),
            field(&event.side),
            field(&event.px),
            field(&event.sz),
            method,
        ];
        Self(parts.join(":"))
    }

    /// The key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One symbol whose feed lags block time beyond the threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Offender {
    pub symbol: String,
    pub skew_secs: f64,
    pub last_update: String,
}

/// Alert payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDetail {
    Liquidation {
        event: LiquidationEvent,
        notional: Option<Decimal>,
        threshold: Decimal,
    },
    Stale {
        block_number: Option<String>,
        block_time: String,
        threshold_secs: f64,
        /// Sorted by descending skew.
        offenders: Vec<Offender>,
    },
}

/// An alert that passed its predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub category: AlertCategory,
    pub key: AlertKey,
    pub detail: AlertDetail,
}

/// Outcome of evaluating one event.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Raise the alert.
    Fire(Alert),
    /// The predicate fired but the symbol is outside the allow-list.
    Filtered {
        category: AlertCategory,
        symbol: Option<String>,
    },
    /// Nothing to report.
    Quiet,
}

/// Rules for liquidation events.
#[derive(Debug, Clone)]
pub struct LiquidationRules {
    /// Market liquidations alert when notional strictly exceeds this.
    pub usd_threshold: Decimal,
    /// Coins allowed to alert. Empty allows every coin.
    pub allowed_coins: HashSet<String>,
}

/// Rules for oracle update events.
#[derive(Debug, Clone)]
pub struct StaleRules {
    /// Skew above which a feed is stale.
    pub threshold_secs: f64,
    /// Symbols considered. Empty considers every symbol.
    pub markets: HashSet<String>,
}

/// Evaluates domain events against the configured rules.
///
/// Events for which no rules are configured never alert.
#[derive(Debug, Clone, Default)]
pub struct AlertPredicate {
    liquidation: Option<LiquidationRules>,
    stale: Option<StaleRules>,
}

impl AlertPredicate {
    /// Create a predicate that never fires.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable liquidation alerts (builder pattern).
    #[must_use]
    pub fn with_liquidation_rules(mut self, rules: LiquidationRules) -> Self {
        self.liquidation = Some(rules);
        self
    }

    /// Enable stale oracle alerts (builder pattern).
    #[must_use]
    pub fn with_stale_rules(mut self, rules: StaleRules) -> Self {
        self.stale = Some(rules);
        self
    }

    /// Evaluate one event.
    #[must_use]
    pub fn evaluate(&self, event: &DomainEvent) -> Verdict {
        match (event, &self.liquidation, &self.stale) {
            (DomainEvent::Liquidation(liq), Some(rules), _) => evaluate_liquidation(liq, rules),
            (DomainEvent::OracleUpdates(oracle), _, Some(rules)) => evaluate_stale(oracle, rules),
            _ => Verdict::Quiet,
        }
    }
}

/// Parse a decimal from text, accepting scientific notation.
#[must_use]
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Notional value `px * sz`, if both parse.
#[must_use]
pub fn notional(event: &LiquidationEvent) -> Option<Decimal> {
    let px = parse_decimal(event.px.as_deref()?)?;
    let sz = parse_decimal(event.sz.as_deref()?)?;
    px.checked_mul(sz)
}

/// Category a liquidation falls in, if it should alert at all.
#[must_use]
pub fn classify_liquidation(event: &LiquidationEvent, usd_threshold: Decimal) -> Option<AlertCategory> {
    let method = event.method.as_deref().unwrap_or("");

    if method.eq_ignore_ascii_case("backstop") {
        return Some(AlertCategory::Backstop);
    }

    if method.eq_ignore_ascii_case("market") {
        let Some(value) = notional(event) else {
            tracing::debug!(px = ?event.px, sz = ?event.sz, "Unparseable px/sz, no alert");
            return None;
        };
        let exceeded = value > usd_threshold;
        tracing::debug!(
            notional = %value,
            threshold = %usd_threshold,
            exceeded,
            "Market liquidation notional check"
        );
        return exceeded.then_some(AlertCategory::Market);
    }

    tracing::debug!(method, "Unknown liquidation method, no alert");
    None
}

fn evaluate_liquidation(event: &LiquidationEvent, rules: &LiquidationRules) -> Verdict {
    let Some(category) = classify_liquidation(event, rules.usd_threshold) else {
        return Verdict::Quiet;
    };

    if !rules.allowed_coins.is_empty() {
        let allowed = event
            .coin
            .as_ref()
            .is_some_and(|coin| rules.allowed_coins.contains(coin));
        if !allowed {
            return Verdict::Filtered {
                category,
                symbol: event.coin.clone(),
            };
        }
    }

    Verdict::Fire(Alert {
        category,
        key: AlertKey::for_liquidation(event),
        detail: AlertDetail::Liquidation {
            event: event.clone(),
            notional: notional(event),
            threshold: rules.usd_threshold,
        },
    })
}

/// Parse an ISO 8601 timestamp. Naive timestamps are taken as UTC.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Absolute difference between two instants, in seconds.
#[allow(clippy::cast_precision_loss)]
fn skew_secs(a: DateTime<Utc>, b: DateTime<Utc>) -> Option<f64> {
    let micros = a.signed_duration_since(b).num_microseconds()?;
    Some(micros.unsigned_abs() as f64 / 1_000_000.0)
}

/// Feeds in `event` lagging block time by more than `threshold_secs`,
/// sorted by descending skew.
#[must_use]
pub fn stale_offenders(
    event: &OracleUpdatesEvent,
    threshold_secs: f64,
    markets: &HashSet<String>,
) -> Vec<Offender> {
    let Some(block_time) = parse_timestamp(&event.block_time) else {
        tracing::debug!(block_time = %event.block_time, "Unparseable block time");
        return Vec::new();
    };

    let mut offenders: Vec<Offender> = event
        .updates
        .iter()
        .filter(|u| markets.is_empty() || markets.contains(&u.symbol))
        .filter_map(|u| {
            let updated = parse_timestamp(&u.last_update_time)?;
            let skew = skew_secs(block_time, updated)?;
            (skew > threshold_secs).then(|| Offender {
                symbol: u.symbol.clone(),
                skew_secs: skew,
                last_update: u.last_update_time.clone(),
            })
        })
        .collect();

    offenders.sort_by(|a, b| b.skew_secs.total_cmp(&a.skew_secs));
    offenders
}

fn evaluate_stale(event: &OracleUpdatesEvent, rules: &StaleRules) -> Verdict {
    let offenders = stale_offenders(event, rules.threshold_secs, &rules.markets);
    if offenders.is_empty() {
        return Verdict::Quiet;
    }

    let block_number = event.block_number.clone();
    let key = AlertKey::new(block_number.clone().unwrap_or_else(|| "unknown".to_string()));

    Verdict::Fire(Alert {
        category: AlertCategory::Stale,
        key,
        detail: AlertDetail::Stale {
            block_number,
            block_time: event.block_time.clone(),
            threshold_secs: rules.threshold_secs,
            offenders,
        },
    })
}
