//! Configuration file loader.

use std::path::{Path, PathBuf};

use crate::alert::SuppressionPolicy;

use super::types::{AppConfig, ChannelConfig, ChannelKind};

/// Environment variable overriding the liquidation root.
pub const FILLS_ROOT_ENV: &str = "HIP_FILLS_ROOT";

/// Environment variable overriding the stale oracle root.
pub const ORACLE_ROOT_ENV: &str = "HIP3_HOURLY_ROOT";

/// Environment variable overriding the stale oracle market list
/// (comma-separated).
pub const MARKETS_ENV: &str = "MARKETS";

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
    /// The single search path was given explicitly and must exist.
    required: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: node-alerts.toml
        search_paths.push(PathBuf::from("node-alerts.toml"));

        // 2. User config directory: ~/.config/node-alerts/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("node-alerts").join("config.toml"));
        }

        Self {
            search_paths,
            required: false,
        }
    }

    /// Create a config loader for one explicit file, which must exist.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
            required: true,
        }
    }

    /// Load configuration from the first available file, or return
    /// defaults. Environment overrides and `~` expansion are applied, then
    /// the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed, if an explicit file is missing, or if validation fails.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading config file");
                Self::load_from_path(&path)?
            }
            None if self.required => {
                return Err(ConfigError::NotFound(self.search_paths[0].clone()));
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<AppConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a leading `~` to the home directory.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

impl AppConfig {
    /// Apply environment overrides, looking variables up with `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = non_empty(FILLS_ROOT_ENV) {
            self.liquidations.root = PathBuf::from(root);
        }
        if let Some(root) = non_empty(ORACLE_ROOT_ENV) {
            self.stale_oracle.root = PathBuf::from(root);
        }
        if let Some(markets) = non_empty(MARKETS_ENV) {
            self.stale_oracle.markets = markets
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    /// Expand `~` in the pipeline roots.
    pub fn expand_paths(&mut self) {
        self.liquidations.root = expand_tilde(&self.liquidations.root);
        self.stale_oracle.root = expand_tilde(&self.stale_oracle.root);
    }

    /// Check values that do not depend on the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.liquidations.enabled && !self.stale_oracle.enabled {
            return Err(invalid("pipelines", "no pipeline is enabled"));
        }

        validate_channel("market_channel", &self.market_channel)?;
        validate_channel("operational_channel", &self.operational_channel)?;

        if self.liquidations.threshold().is_none() {
            return Err(invalid(
                "liquidations.usd_threshold",
                format!("not a non-negative decimal: {:?}", self.liquidations.usd_threshold),
            ));
        }
        validate_fragment_bounds(
            "liquidations",
            self.liquidations.max_fragment_bytes,
            self.liquidations.max_fragment_lines,
        )?;
        validate_suppression("liquidations.suppression", self.liquidations.suppression)?;

        let secs = self.stale_oracle.threshold_seconds;
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid(
                "stale_oracle.threshold_seconds",
                format!("must be a non-negative number, got {secs}"),
            ));
        }
        validate_fragment_bounds(
            "stale_oracle",
            self.stale_oracle.max_fragment_bytes,
            self.stale_oracle.max_fragment_lines,
        )?;
        validate_suppression("stale_oracle.suppression", self.stale_oracle.suppression)?;

        let pct = self.pollers.depth_threshold_percent;
        if !pct.is_finite() || pct <= 0.0 {
            return Err(invalid(
                "pollers.depth_threshold_percent",
                format!("must be positive, got {pct}"),
            ));
        }
        if self.pollers.check_interval_seconds == 0 {
            return Err(invalid("pollers.check_interval_seconds", "must be positive"));
        }
        if self.pollers.heartbeat_interval_seconds == 0 {
            return Err(invalid("pollers.heartbeat_interval_seconds", "must be positive"));
        }

        Ok(())
    }

    /// Check what must hold on this host before starting: market channel
    /// credentials and the roots of enabled pipelines.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSetting`] or [`ConfigError::MissingRoot`].
    pub fn check_environment(&self) -> Result<(), ConfigError> {
        if self.market_channel.credentials(ChannelKind::Market).is_none() {
            let token = self.market_channel.token_env(ChannelKind::Market);
            let chat = self.market_channel.chat_env(ChannelKind::Market);
            return Err(ConfigError::MissingSetting(format!("{token} / {chat}")));
        }

        let roots = [
            (self.liquidations.enabled, &self.liquidations.root),
            (self.stale_oracle.enabled, &self.stale_oracle.root),
        ];
        for (enabled, root) in roots {
            if enabled && !root.is_dir() {
                return Err(ConfigError::MissingRoot(root.clone()));
            }
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_channel(section: &str, channel: &ChannelConfig) -> Result<(), ConfigError> {
    match url::Url::parse(&channel.api_base) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => {
            return Err(invalid(
                &format!("{section}.api_base"),
                format!("unsupported scheme {:?}", url.scheme()),
            ));
        }
        Err(e) => return Err(invalid(&format!("{section}.api_base"), e.to_string())),
    }
    if channel.timeout_secs == 0 {
        return Err(invalid(&format!("{section}.timeout_secs"), "must be positive"));
    }
    Ok(())
}

fn validate_fragment_bounds(section: &str, bytes: usize, lines: usize) -> Result<(), ConfigError> {
    if bytes == 0 {
        return Err(invalid(&format!("{section}.max_fragment_bytes"), "must be positive"));
    }
    if lines == 0 {
        return Err(invalid(&format!("{section}.max_fragment_lines"), "must be positive"));
    }
    Ok(())
}

fn validate_suppression(key: &str, policy: SuppressionPolicy) -> Result<(), ConfigError> {
    match policy {
        SuppressionPolicy::Identity { capacity: 0 } => Err(invalid(key, "capacity must be positive")),
        SuppressionPolicy::RateLimit { max_alerts: 0, .. } => {
            Err(invalid(key, "max_alerts must be positive"))
        }
        SuppressionPolicy::RateLimit { window_secs: 0, .. } => {
            Err(invalid(key, "window_secs must be positive"))
        }
        _ => Ok(()),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("Missing required environment setting: {0}")]
    MissingSetting(String),

    #[error("Watched root does not exist or is not a directory: {0}")]
    MissingRoot(PathBuf),
}
