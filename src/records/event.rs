//! Normalized domain events.

/// A liquidation fill, from either a flat record or a raw block record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiquidationEvent {
    pub time: Option<String>,
    pub local_time: Option<String>,
    pub block_time: Option<String>,
    pub block_number: Option<String>,
    pub hash: Option<String>,
    pub coin: Option<String>,
    pub px: Option<String>,
    pub sz: Option<String>,
    pub side: Option<String>,
    /// Liquidation method, e.g. `market` or `backstop`.
    pub method: Option<String>,
    pub liquidated_user: Option<String>,
}

/// Last update time reported for one symbol's price feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleUpdate {
    pub symbol: String,
    pub last_update_time: String,
}

/// Every price-feed update time attached to one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleUpdatesEvent {
    pub block_time: String,
    pub block_number: Option<String>,
    pub updates: Vec<OracleUpdate>,
}

/// Event extracted from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Liquidation(LiquidationEvent),
    OracleUpdates(OracleUpdatesEvent),
}

impl DomainEvent {
    /// Block number the event belongs to, if known.
    #[must_use]
    pub fn block_number(&self) -> Option<&str> {
        match self {
            Self::Liquidation(l) => l.block_number.as_deref(),
            Self::OracleUpdates(o) => o.block_number.as_deref(),
        }
    }
}
