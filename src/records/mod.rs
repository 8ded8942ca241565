//! Record extraction from line-delimited JSON.
//!
//! Lines are assembled into JSON values, classified into one of the known
//! record shapes and turned into [`DomainEvent`]s. Anything malformed or
//! unrecognized yields no events.

mod event;
mod fragment;
mod shapes;

pub use event::{DomainEvent, LiquidationEvent, OracleUpdate, OracleUpdatesEvent};
pub use fragment::{
    Assembly, FragmentAssembler, FragmentLimits, DEFAULT_MAX_FRAGMENT_BYTES,
    DEFAULT_MAX_FRAGMENT_LINES,
};
pub use shapes::{BlockRecord, FlatLiquidation, Record};

/// Extract every domain event carried by a parsed JSON value.
#[must_use]
pub fn extract_events(value: serde_json::Value) -> Vec<DomainEvent> {
    Record::classify(value)
        .map(Record::into_events)
        .unwrap_or_default()
}
