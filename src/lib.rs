//! Node Alerts - tails hourly node output and raises liquidation and
//! stale-oracle alerts.

pub mod alert;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod records;
pub mod watcher;
