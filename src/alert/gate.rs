//! Alert suppression.
//!
//! Each category gets one strategy: remember recently delivered keys
//! ([`DedupGate`]), cap alerts per trailing window ([`RateWindow`]), or
//! nothing at all.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::predicate::{Alert, AlertCategory, AlertKey};

/// Default identity capacity for liquidation categories.
pub const DEFAULT_LIQUIDATION_CAPACITY: usize = 20_000;

/// Default identity capacity for the stale category.
pub const DEFAULT_STALE_CAPACITY: usize = 1_000;

/// Bounded, insertion-ordered set of alert keys.
///
/// When full, inserting a new key evicts the oldest one.
#[derive(Debug, Clone)]
pub struct DedupGate {
    capacity: usize,
    order: VecDeque<AlertKey>,
    members: HashSet<AlertKey>,
}

impl DedupGate {
    /// Create a gate holding at most `capacity` keys.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            members: HashSet::with_capacity(capacity.min(1024)),
        }
    }

    /// Whether `key` is resident.
    #[must_use]
    pub fn contains(&self, key: &AlertKey) -> bool {
        self.members.contains(key)
    }

    /// Remember `key`. Returns the evicted key, if any.
    ///
    /// Inserting a resident key is a no-op.
    pub fn insert(&mut self, key: AlertKey) -> Option<AlertKey> {
        if self.capacity == 0 || self.members.contains(&key) {
            return None;
        }

        let evicted = if self.order.len() >= self.capacity {
            self.order.pop_front().inspect(|old| {
                self.members.remove(old);
            })
        } else {
            None
        };

        self.members.insert(key.clone());
        self.order.push_back(key);
        evicted
    }

    /// Number of resident keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no key is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Maximum number of resident keys.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateWindow {
    max: usize,
    window: Duration,
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    /// Allow at most `max` admissions in any trailing `window`.
    #[must_use]
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            admitted: VecDeque::with_capacity(max),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admit one attempt at `now` if the window has room, recording it.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.admitted.len() >= self.max {
            return false;
        }
        self.admitted.push_back(now);
        true
    }

    /// Admissions inside the window ending at `now`.
    pub fn count(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.admitted.len()
    }
}

/// Suppression strategy for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SuppressionPolicy {
    /// Never re-alert a delivered key while it is resident.
    Identity { capacity: usize },
    /// At most `max_alerts` per trailing `window_secs`.
    RateLimit { max_alerts: usize, window_secs: u64 },
    /// Send everything.
    None,
}

impl SuppressionPolicy {
    /// Identity dedup with the given capacity.
    #[must_use]
    pub fn identity(capacity: usize) -> Self {
        Self::Identity { capacity }
    }
}

#[derive(Debug, Clone)]
enum Strategy {
    Identity(DedupGate),
    Rate(RateWindow),
    Pass,
}

impl From<SuppressionPolicy> for Strategy {
    fn from(policy: SuppressionPolicy) -> Self {
        match policy {
            SuppressionPolicy::Identity { capacity } => Self::Identity(DedupGate::new(capacity)),
            SuppressionPolicy::RateLimit {
                max_alerts,
                window_secs,
            } => Self::Rate(RateWindow::new(max_alerts, Duration::from_secs(window_secs))),
            SuppressionPolicy::None => Self::Pass,
        }
    }
}

/// Per-category suppression state for one engine.
///
/// Categories without a configured policy are never suppressed.
#[derive(Debug, Clone, Default)]
pub struct AlertGate {
    strategies: HashMap<AlertCategory, Strategy>,
}

impl AlertGate {
    /// Create a gate that suppresses nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for `category` (builder pattern).
    #[must_use]
    pub fn with_policy(mut self, category: AlertCategory, policy: SuppressionPolicy) -> Self {
        self.strategies.insert(category, policy.into());
        self
    }

    /// Decide whether `alert` may be sent at `now`.
    ///
    /// Rate-limited categories consume a slot here, whether or not the send
    /// later succeeds.
    pub fn admit(&mut self, alert: &Alert, now: Instant) -> bool {
        match self.strategies.get_mut(&alert.category) {
            Some(Strategy::Identity(gate)) => !gate.contains(&alert.key),
            Some(Strategy::Rate(window)) => {
                let admitted = window.try_acquire(now);
                if !admitted {
                    tracing::debug!(
                        category = %alert.category,
                        in_window = window.count(now),
                        "Rate limit reached"
                    );
                }
                admitted
            }
            Some(Strategy::Pass) | None => true,
        }
    }

    /// Record that `alert` was delivered.
    pub fn record_delivery(&mut self, alert: &Alert) {
        if let Some(Strategy::Identity(gate)) = self.strategies.get_mut(&alert.category) {
            if let Some(evicted) = gate.insert(alert.key.clone()) {
                tracing::trace!(category = %alert.category, key = %evicted, "Evicted dedup key");
            }
        }
    }
}
