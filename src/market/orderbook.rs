use serde::{Deserialize, Serialize};

use super::{Asset, Pair};

/// One price level of an order book side.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OrderbookLevel {
    pub price: f64,
    pub amount: f64,
}

/// A full order book snapshot as reported by an exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub exchange: String,
    pub pair: Pair,
    pub asset: Asset,
    pub bids: Vec<OrderbookLevel>,
    pub asks: Vec<OrderbookLevel>,
}

impl OrderbookSnapshot {
    /// Returns the total base amount and quote value on the bid side.
    pub fn total_bids(&self) -> (f64, f64) {
        Self::side_totals(&self.bids)
    }

    /// Returns the total base amount and quote value on the ask side.
    pub fn total_asks(&self) -> (f64, f64) {
        Self::side_totals(&self.asks)
    }

    fn side_totals(levels: &[OrderbookLevel]) -> (f64, f64) {
        levels.iter().fold((0.0, 0.0), |(amount, value), level| {
            (amount + level.amount, value + level.amount * level.price)
        })
    }
}
