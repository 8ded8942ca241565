//! Node Alerts - tails hourly node output and raises liquidation and
//! stale-oracle alerts.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use node_alerts::alert::AlertDispatcher;
use node_alerts::config::{AppConfig, ChannelKind, ConfigLoader};
use node_alerts::engine::EngineStats;
use node_alerts::pipeline::{build_engines, dispatcher_for, spawn_engine, EngineExit};

const APP: &str = "node-alerts";

#[derive(Parser)]
#[command(
    name = "node-alerts",
    about = "Tail node output directories and dispatch liquidation and stale-oracle alerts",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Watch the configured trees and dispatch alerts (default).
    Run,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn init_tracing(verbosity: u8, json: bool) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for Ctrl-C or SIGTERM and name the signal.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "interrupt",
                    _ = terminate.recv() => "terminate",
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                let _ = tokio::signal::ctrl_c().await;
                "interrupt"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "interrupt"
    }
}

fn check_config(config: &AppConfig) -> ExitCode {
    if let Err(e) = config.check_environment() {
        eprintln!("{APP}: {e}");
        return ExitCode::FAILURE;
    }

    let ops = config
        .operational_channel
        .credentials(ChannelKind::Operational)
        .map_or("disabled", |_| "enabled");
    println!("{APP}: configuration OK");
    if config.liquidations.enabled {
        println!(
            "  liquidations: {} (threshold ${})",
            config.liquidations.root.display(),
            config.liquidations.usd_threshold
        );
    }
    if config.stale_oracle.enabled {
        println!(
            "  stale_oracle: {} (threshold {:.3}s)",
            config.stale_oracle.root.display(),
            config.stale_oracle.threshold_seconds
        );
    }
    println!("  operational channel: {ops}");
    ExitCode::SUCCESS
}

fn record_exit(result: Result<EngineExit, JoinError>, total: &mut EngineStats) -> Option<String> {
    match result {
        Ok(exit) => {
            tracing::info!(engine = %exit.name, stats = ?exit.stats, "Engine stopped");
            total.merge(&exit.stats);
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Engine task failed");
            Some(e.to_string())
        }
    }
}

async fn run(config: AppConfig) -> ExitCode {
    let ops = match dispatcher_for(ChannelKind::Operational, &config.operational_channel) {
        Ok(ops) => ops,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = config.check_environment() {
        return startup_failed(&ops, &e).await;
    }
    let market = match dispatcher_for(ChannelKind::Market, &config.market_channel) {
        Ok(market) => market,
        Err(e) => return startup_failed(&ops, &e).await,
    };
    let engines = match build_engines(&config, &market) {
        Ok(engines) => engines,
        Err(e) => return startup_failed(&ops, &e).await,
    };

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let names: Vec<String> = engines.iter().map(|e| e.name().to_string()).collect();
    for engine in engines {
        if let Err(e) = spawn_engine(engine, cancel.clone(), &mut tasks) {
            cancel.cancel();
            while tasks.join_next().await.is_some() {}
            return startup_failed(&ops, &e).await;
        }
    }

    tracing::info!(pipelines = ?names, "Started");
    ops.send_text(&format!("{APP}: Started ({})", names.join(", "))).await;

    let mut total = EngineStats::default();
    let mut crash = None;
    tokio::select! {
        signal = shutdown_signal() => {
            tracing::info!(signal, "Shutting down");
        }
        Some(result) = tasks.join_next() => {
            crash = Some(record_exit(result, &mut total).unwrap_or_else(|| "engine stopped unexpectedly".to_string()));
        }
    }

    cancel.cancel();
    while let Some(result) = tasks.join_next().await {
        if let Some(e) = record_exit(result, &mut total) {
            crash.get_or_insert(e);
        }
    }
    tracing::info!(stats = ?total, "All engines stopped");

    match crash {
        Some(reason) => {
            tracing::error!(reason = %reason, "Crashed");
            ops.send_text(&format!("{APP}: Crashed with error: {reason}")).await;
            ExitCode::FAILURE
        }
        None => {
            ops.send_text(&format!("{APP}: Stopped by signal")).await;
            ExitCode::SUCCESS
        }
    }
}

async fn startup_failed(ops: &AlertDispatcher, error: &dyn std::error::Error) -> ExitCode {
    tracing::error!(error = %error, "Startup failed");
    ops.send_text(&format!("{APP}: Failed to start: {error}")).await;
    ExitCode::FAILURE
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }

    let loader = cli.config.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    let config = match loader.load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("{APP}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::CheckConfig => check_config(&config),
    }
}
