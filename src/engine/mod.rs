//! Event-driven tail engine.

mod stats;
mod tail;

pub use stats::EngineStats;
pub use tail::{EngineOptions, TailEngine};
