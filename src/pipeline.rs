//! Wiring from configuration to running engines.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::alert::{
    AlertCategory, AlertDispatcher, AlertGate, AlertPredicate, DisabledNotifier, LiquidationRules,
    Notifier, NotifyError, StaleRules, TelegramNotifier,
};
use crate::config::{
    AppConfig, ChannelConfig, ChannelKind, ConfigError, LiquidationsConfig, StaleOracleConfig,
};
use crate::engine::{EngineOptions, EngineStats, TailEngine};
use crate::watcher::{FileSystemWatcher, WatcherError};

/// Errors raised while starting the daemon.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to start {engine} engine: {source}")]
    Watcher {
        engine: String,
        source: WatcherError,
    },

    #[error("Failed to set up {channel} channel: {source}")]
    Channel {
        channel: &'static str,
        source: NotifyError,
    },
}

/// Build the dispatcher for one channel.
///
/// The market channel requires credentials. The operational channel falls
/// back to a disabled notifier when they are absent.
///
/// # Errors
///
/// Returns an error if market credentials are missing or the HTTP client
/// cannot be built.
pub fn dispatcher_for(
    kind: ChannelKind,
    channel: &ChannelConfig,
) -> Result<AlertDispatcher, StartupError> {
    let notifier: Arc<dyn Notifier> = match (channel.credentials(kind), kind) {
        (Some(creds), _) => Arc::new(
            TelegramNotifier::new(&channel.api_base, &creds.token, creds.chat_id, channel.timeout())
                .map_err(|source| StartupError::Channel {
                    channel: kind.label(),
                    source,
                })?,
        ),
        (None, ChannelKind::Market) => {
            return Err(ConfigError::MissingSetting(format!(
                "{} / {}",
                channel.token_env(kind),
                channel.chat_env(kind)
            ))
            .into());
        }
        (None, ChannelKind::Operational) => {
            tracing::info!("Operational channel credentials not set, lifecycle messages disabled");
            Arc::new(DisabledNotifier)
        }
    };

    Ok(AlertDispatcher::new(kind.label(), notifier).with_timeout(channel.timeout()))
}

/// Build the liquidation engine.
///
/// # Errors
///
/// Returns an error if the notional threshold does not parse.
pub fn liquidation_engine(
    config: &LiquidationsConfig,
    dispatcher: AlertDispatcher,
) -> Result<TailEngine, ConfigError> {
    let usd_threshold = config.threshold().ok_or_else(|| ConfigError::Invalid {
        key: "liquidations.usd_threshold".to_string(),
        reason: format!("not a non-negative decimal: {:?}", config.usd_threshold),
    })?;

    let predicate = AlertPredicate::new().with_liquidation_rules(LiquidationRules {
        usd_threshold,
        allowed_coins: config.allowed_coins(),
    });
    let gate = AlertGate::new()
        .with_policy(AlertCategory::Backstop, config.suppression)
        .with_policy(AlertCategory::Market, config.suppression);

    let options = EngineOptions {
        name: "liquidations".to_string(),
        root: config.root.clone(),
        read_existing_at_start: config.read_existing_at_start,
        read_new_files_from_start: config.read_new_files_from_start,
        fragment_limits: config.fragment_limits(),
    };

    Ok(TailEngine::new(options, predicate, gate, dispatcher))
}

/// Build the stale oracle engine.
#[must_use]
pub fn stale_oracle_engine(config: &StaleOracleConfig, dispatcher: AlertDispatcher) -> TailEngine {
    let predicate = AlertPredicate::new().with_stale_rules(StaleRules {
        threshold_secs: config.threshold_seconds,
        markets: config.markets(),
    });
    let gate = AlertGate::new().with_policy(AlertCategory::Stale, config.suppression);

    let options = EngineOptions {
        name: "stale_oracle".to_string(),
        root: config.root.clone(),
        read_existing_at_start: config.read_existing_at_start,
        read_new_files_from_start: config.read_new_files_from_start,
        fragment_limits: config.fragment_limits(),
    };

    TailEngine::new(options, predicate, gate, dispatcher)
}

/// Build one engine per enabled pipeline, all sending to `market`.
///
/// # Errors
///
/// Returns an error if a pipeline's settings are invalid.
pub fn build_engines(
    config: &AppConfig,
    market: &AlertDispatcher,
) -> Result<Vec<TailEngine>, ConfigError> {
    let mut engines = Vec::new();
    if config.liquidations.enabled {
        engines.push(liquidation_engine(&config.liquidations, market.clone())?);
    }
    if config.stale_oracle.enabled {
        engines.push(stale_oracle_engine(&config.stale_oracle, market.clone()));
    }
    Ok(engines)
}

/// Result of one engine task.
#[derive(Debug)]
pub struct EngineExit {
    pub name: String,
    pub stats: EngineStats,
}

/// Start watching, scan the tree and spawn the engine's event loop.
///
/// The watcher is started before the scan so no write between the two is
/// missed. It lives inside the task and stops with it.
///
/// # Errors
///
/// Returns an error if the root cannot be watched or scanned.
pub fn spawn_engine(
    mut engine: TailEngine,
    cancel: CancellationToken,
    tasks: &mut JoinSet<EngineExit>,
) -> Result<(), StartupError> {
    let name = engine.name().to_string();
    let watcher_error = |source| StartupError::Watcher {
        engine: name.clone(),
        source,
    };

    let (watcher, events) =
        FileSystemWatcher::start(engine.root().to_path_buf()).map_err(watcher_error)?;
    engine.scan().map_err(watcher_error)?;

    tasks.spawn(async move {
        let _watcher = watcher;
        engine.catch_up().await;
        let stats = engine.run(events, cancel).await;
        EngineExit {
            name: engine.name().to_string(),
            stats,
        }
    });
    Ok(())
}
