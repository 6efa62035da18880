use serde::{Deserialize, Serialize};

use super::{Asset, Pair};

/// A point-in-time ticker snapshot as reported by an exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TickerPrice {
    pub exchange: String,
    pub pair: Pair,
    pub asset: Asset,
    pub last: f64,
    pub ask: f64,
    pub bid: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}
