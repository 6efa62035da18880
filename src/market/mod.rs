use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod currency;
mod orderbook;
mod ticker;

pub use currency::{Code, Pair, PairFormat, PairParseError};
pub use orderbook::{OrderbookLevel, OrderbookSnapshot};
pub use ticker::TickerPrice;

/// Asset class of a currency pair on an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Asset {
    Spot,
    Margin,
    Futures,
    Options,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Margin => "margin",
            Self::Futures => "futures",
            Self::Options => "options",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConversionError {
    #[error("no conversion rate available for {from}/{to}")]
    RateUnavailable { from: Code, to: Code },

    #[error("no symbol mapping for {0}")]
    SymbolUnavailable(Code),
}

/// Fiat conversion and symbol lookup service consumed for display output.
pub trait CurrencyConverter: Send + Sync {
    /// Converts `amount` from one fiat currency into another.
    fn convert_fiat(&self, amount: f64, from: &Code, to: &Code) -> Result<f64, ConversionError>;

    /// Returns the display symbol for a currency code, e.g. `$` for `USD`.
    fn symbol(&self, code: &Code) -> Result<String, ConversionError>;
}
