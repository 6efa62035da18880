use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Currency codes classified as fiat for display and conversion purposes.
const FIAT_CODES: &[&str] = &[
    "AUD", "BRL", "CAD", "CHF", "CNY", "DKK", "EUR", "GBP", "HKD", "INR", "JPY", "KRW", "MXN",
    "NOK", "NZD", "PLN", "RUB", "SEK", "SGD", "TRY", "USD", "ZAR",
];

/// An upper-cased currency code, e.g. `BTC` or `USD`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code(String);

impl Code {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if this code names a recognised fiat currency.
    pub fn is_fiat(&self) -> bool {
        FIAT_CODES.contains(&self.0.as_str())
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Code {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A base/quote currency pair, e.g. `BTC-USD`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    base: Code,
    quote: Code,
}

impl Pair {
    pub fn new(base: impl Into<Code>, quote: impl Into<Code>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    pub fn base(&self) -> &Code {
        &self.base
    }

    pub fn quote(&self) -> &Code {
        &self.quote
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

#[derive(Error, Debug)]
#[error("invalid currency pair: {0}")]
pub struct PairParseError(String);

impl FromStr for Pair {
    type Err = PairParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once(['-', '/', '_'])
            .ok_or_else(|| PairParseError(s.to_string()))?;
        if base.trim().is_empty() || quote.trim().is_empty() {
            return Err(PairParseError(s.to_string()));
        }
        Ok(Self::new(base, quote))
    }
}

/// Display preferences applied when a pair is rendered in log output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairFormat {
    delimiter: String,
    uppercase: bool,
}

impl Default for PairFormat {
    fn default() -> Self {
        Self {
            delimiter: "-".to_string(),
            uppercase: true,
        }
    }
}

impl PairFormat {
    pub fn new(delimiter: impl Into<String>, uppercase: bool) -> Self {
        Self {
            delimiter: delimiter.into(),
            uppercase,
        }
    }

    pub fn format(&self, pair: &Pair) -> String {
        let joined = format!("{}{}{}", pair.base(), self.delimiter, pair.quote());
        if self.uppercase {
            joined
        } else {
            joined.to_lowercase()
        }
    }
}
