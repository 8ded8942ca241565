//! Configuration types.

use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::alert::{
    SuppressionPolicy, DEFAULT_LIQUIDATION_CAPACITY, DEFAULT_SEND_TIMEOUT, DEFAULT_STALE_CAPACITY,
    TELEGRAM_API_BASE,
};
use crate::records::{FragmentLimits, DEFAULT_MAX_FRAGMENT_BYTES, DEFAULT_MAX_FRAGMENT_LINES};

/// Which notification channel a [`ChannelConfig`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Alerts for users.
    Market,
    /// Daemon lifecycle messages for operators.
    Operational,
}

impl ChannelKind {
    fn default_token_env(self) -> &'static str {
        match self {
            Self::Market => "TELEGRAM_BOT_TOKEN",
            Self::Operational => "DEVELOPER_TELEGRAM_BOT_TOKEN",
        }
    }

    fn default_chat_env(self) -> &'static str {
        match self {
            Self::Market => "TELEGRAM_CHAT_ID",
            Self::Operational => "DEVELOPER_TELEGRAM_CHAT_ID",
        }
    }

    /// Label used in log output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Operational => "operational",
        }
    }
}

/// Bot token and chat id resolved from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// One Telegram destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Environment variable holding the bot token.
    pub bot_token_env: Option<String>,
    /// Environment variable holding the chat id.
    pub chat_id_env: Option<String>,
    /// Bot API base URL.
    pub api_base: String,
    /// Per-send timeout.
    pub timeout_secs: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bot_token_env: None,
            chat_id_env: None,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout_secs: DEFAULT_SEND_TIMEOUT.as_secs(),
        }
    }
}

impl ChannelConfig {
    /// Name of the token variable for a channel of `kind`.
    #[must_use]
    pub fn token_env(&self, kind: ChannelKind) -> &str {
        self.bot_token_env
            .as_deref()
            .unwrap_or_else(|| kind.default_token_env())
    }

    /// Name of the chat id variable for a channel of `kind`.
    #[must_use]
    pub fn chat_env(&self, kind: ChannelKind) -> &str {
        self.chat_id_env
            .as_deref()
            .unwrap_or_else(|| kind.default_chat_env())
    }

    /// Read credentials from the environment. Empty values count as unset.
    #[must_use]
    pub fn credentials(&self, kind: ChannelKind) -> Option<Credentials> {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Credentials {
            token: read(self.token_env(kind))?,
            chat_id: read(self.chat_env(kind))?,
        })
    }

    /// Per-send timeout.
    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

/// Liquidation pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidationsConfig {
    pub enabled: bool,
    /// Root of the hourly fills tree. `~` expands to the home directory.
    pub root: PathBuf,
    pub read_existing_at_start: bool,
    pub read_new_files_from_start: bool,
    /// Notional in USD a market liquidation must exceed. Decimal string.
    pub usd_threshold: String,
    /// Coins allowed to alert. Empty allows every coin; list coins
    /// explicitly to restrict alerts, there is no deny-all setting.
    pub allowed_coins: Vec<String>,
    pub max_fragment_bytes: usize,
    pub max_fragment_lines: usize,
    /// Applies to both backstop and market alerts.
    pub suppression: SuppressionPolicy,
}

impl Default for LiquidationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("~/hl/data/node_fills_by_block/hourly"),
            read_existing_at_start: false,
            read_new_files_from_start: true,
            usd_threshold: "100000".to_string(),
            allowed_coins: Vec::new(),
            max_fragment_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
            max_fragment_lines: DEFAULT_MAX_FRAGMENT_LINES,
            suppression: SuppressionPolicy::identity(DEFAULT_LIQUIDATION_CAPACITY),
        }
    }
}

impl LiquidationsConfig {
    /// Parsed notional threshold.
    #[must_use]
    pub fn threshold(&self) -> Option<Decimal> {
        Decimal::from_str(self.usd_threshold.trim())
            .ok()
            .filter(|d| !d.is_sign_negative())
    }

    /// Allow-list as a set.
    #[must_use]
    pub fn allowed_coins(&self) -> HashSet<String> {
        self.allowed_coins.iter().cloned().collect()
    }

    /// Fragment bounds.
    #[must_use]
    pub fn fragment_limits(&self) -> FragmentLimits {
        FragmentLimits {
            max_bytes: self.max_fragment_bytes,
            max_lines: self.max_fragment_lines,
        }
    }
}

/// Stale oracle pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaleOracleConfig {
    pub enabled: bool,
    /// Root of the hourly oracle updates tree.
    pub root: PathBuf,
    pub read_existing_at_start: bool,
    pub read_new_files_from_start: bool,
    /// Skew beyond which a feed is stale.
    pub threshold_seconds: f64,
    /// Symbols checked. Empty checks every symbol rather than none.
    pub markets: Vec<String>,
    pub max_fragment_bytes: usize,
    pub max_fragment_lines: usize,
    pub suppression: SuppressionPolicy,
}

impl Default for StaleOracleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("~/hl/data/hip3_oracle_updates_by_block/hourly"),
            read_existing_at_start: false,
            read_new_files_from_start: true,
            threshold_seconds: 30.0,
            markets: Vec::new(),
            max_fragment_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
            max_fragment_lines: DEFAULT_MAX_FRAGMENT_LINES,
            suppression: SuppressionPolicy::identity(DEFAULT_STALE_CAPACITY),
        }
    }
}

impl StaleOracleConfig {
    /// Market filter as a set.
    #[must_use]
    pub fn markets(&self) -> HashSet<String> {
        self.markets.iter().cloned().collect()
    }

    /// Fragment bounds.
    #[must_use]
    pub fn fragment_limits(&self) -> FragmentLimits {
        FragmentLimits {
            max_bytes: self.max_fragment_bytes,
            max_lines: self.max_fragment_lines,
        }
    }
}

/// Settings for the scheduled pollers that share the dispatch layer.
///
/// Only validated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollersConfig {
    pub check_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub depth_threshold_percent: f64,
    pub depth_max_alerts_per_hour: usize,
}

impl Default for PollersConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: 60,
            heartbeat_interval_seconds: 3600,
            depth_threshold_percent: 10.0,
            depth_max_alerts_per_hour: 2,
        }
    }
}

/// Whole daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub market_channel: ChannelConfig,
    pub operational_channel: ChannelConfig,
    pub liquidations: LiquidationsConfig,
    pub stale_oracle: StaleOracleConfig,
    pub pollers: PollersConfig,
}
