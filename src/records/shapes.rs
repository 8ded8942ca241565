//! Typed record shapes found in node output files.
//!
//! Three shapes are recognized:
//!
//! - **Flat liquidation**: an object carrying `liquidatedUser` and `method`
//!   next to the fill fields.
//! - **Fills block**: `{"events": [[user, {fill..., "liquidation": {...}}], ...]}`
//!   with block-level `block_time` and `block_number`.
//! - **Oracle block**: `{"events": [{"oracle_pxs": {"coin_to_mark_px":
//!   [[symbol, {"last_update_time": ...}], ...]}}]}`.
//!
//! Numeric fields show up both as JSON strings and JSON numbers depending on
//! the writer, so scalar fields are normalized to text.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::event::{DomainEvent, LiquidationEvent, OracleUpdate, OracleUpdatesEvent};

/// Oracle price tables whose entries carry update timestamps.
const ORACLE_TABLES: [&str; 3] = [
    "coin_to_mark_px",
    "coin_to_oracle_px",
    "coin_to_external_perp_px",
];

/// Deserialize a string, number or bool as text; anything else as `None`.
fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

/// Shape A: liquidation already flattened by an upstream writer.
#[derive(Debug, Clone, Deserialize)]
pub struct FlatLiquidation {
    #[serde(rename = "liquidatedUser", default, deserialize_with = "scalar_text")]
    pub liquidated_user: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub local_time: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub block_time: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub block_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub hash: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub px: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub sz: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub side: Option<String>,
}

/// Block-level fields shared by shapes B and C.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockRecord {
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub block_time: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub block_number: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    pub local_time: Option<String>,
}

/// Fill payload inside a shape B event tuple.
#[derive(Debug, Clone, Deserialize)]
struct Fill {
    #[serde(default, deserialize_with = "scalar_text")]
    time: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    hash: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    coin: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    px: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    sz: Option<String>,
    #[serde(default, deserialize_with = "scalar_text")]
    side: Option<String>,
    #[serde(default)]
    liquidation: Option<LiquidationInfo>,
}

#[derive(Debug, Clone, Deserialize)]
struct LiquidationInfo {
    #[serde(default, deserialize_with = "scalar_text")]
    method: Option<String>,
    #[serde(rename = "liquidatedUser", default, deserialize_with = "scalar_text")]
    liquidated_user: Option<String>,
}

/// A parsed line, classified by shape.
#[derive(Debug, Clone)]
pub enum Record {
    /// Shape A.
    FlatLiquidation(FlatLiquidation),
    /// Shape B.
    FillsBlock(BlockRecord),
    /// Shape C.
    OracleBlock(BlockRecord),
}

impl Record {
    /// Classify a parsed JSON value. Returns `None` for unrecognized shapes.
    #[must_use]
    pub fn classify(value: Value) -> Option<Self> {
        let obj = value.as_object()?;

        if obj.contains_key("liquidatedUser") && obj.contains_key("method") {
            return serde_json::from_value(value).ok().map(Self::FlatLiquidation);
        }

        let is_oracle = obj
            .get("events")
            .and_then(|events| events.get(0))
            .and_then(|first| first.get("oracle_pxs"))
            .is_some();

        let block: BlockRecord = serde_json::from_value(value).ok()?;
        Some(if is_oracle {
            Self::OracleBlock(block)
        } else {
            Self::FillsBlock(block)
        })
    }

    /// Extract the domain events this record carries.
    #[must_use]
    pub fn into_events(self) -> Vec<DomainEvent> {
        match self {
            Self::FlatLiquidation(flat) => vec![DomainEvent::Liquidation(LiquidationEvent {
                time: flat.time,
                local_time: flat.local_time,
                block_time: flat.block_time,
                block_number: flat.block_number,
                hash: flat.hash,
                coin: flat.coin,
                px: flat.px,
                sz: flat.sz,
                side: flat.side,
                method: flat.method,
                liquidated_user: flat.liquidated_user,
            })],
            Self::FillsBlock(block) => fills_liquidations(block),
            Self::OracleBlock(block) => oracle_updates(block).into_iter().collect(),
        }
    }
}

fn fills_liquidations(block: BlockRecord) -> Vec<DomainEvent> {
    let mut out = Vec::new();

    for event in block.events {
        let Value::Array(mut items) = event else {
            continue;
        };
        if items.len() < 2 {
            continue;
        }
        let Ok(fill) = serde_json::from_value::<Fill>(items.swap_remove(1)) else {
            continue;
        };
        let Some(liquidation) = fill.liquidation else {
            continue;
        };

        out.push(DomainEvent::Liquidation(LiquidationEvent {
            time: fill.time,
            local_time: block.local_time.clone(),
            block_time: block.block_time.clone(),
            block_number: block.block_number.clone(),
            hash: fill.hash,
            coin: fill.coin,
            px: fill.px,
            sz: fill.sz,
            side: fill.side,
            method: liquidation.method,
            liquidated_user: liquidation.liquidated_user,
        }));
    }

    out
}

fn oracle_updates(block: BlockRecord) -> Option<DomainEvent> {
    let block_time = block.block_time?;
    let oracle = block.events.first()?.get("oracle_pxs")?;

    let updates = ORACLE_TABLES
        .iter()
        .filter_map(|table| oracle.get(table)?.as_array())
        .flatten()
        .filter_map(oracle_entry)
        .collect();

    Some(DomainEvent::OracleUpdates(OracleUpdatesEvent {
        block_time,
        block_number: block.block_number,
        updates,
    }))
}

/// Parse one `[symbol, {last_update_time | last_updated_time}]` entry.
fn oracle_entry(entry: &Value) -> Option<OracleUpdate> {
    let symbol = entry.get(0)?.as_str()?;
    let info = entry.get(1)?;
    let ts = info
        .get("last_update_time")
        .or_else(|| info.get("last_updated_time"))?
        .as_str()?;

    // Only ISO timestamps can be compared against block time.
    if !ts.contains('T') {
        return None;
    }

    Some(OracleUpdate {
        symbol: symbol.to_string(),
        last_update_time: ts.to_string(),
    })
}
