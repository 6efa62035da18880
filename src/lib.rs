#![doc = include_str!("../README.md")]

/// Exports the [`Exchange`], [`ExchangeManager`] and [`ExchangeWebsocket`]
/// traits describing the consumed exchange connectivity layer.
///
/// [`Exchange`]: crate::exchange::Exchange
/// [`ExchangeManager`]: crate::exchange::ExchangeManager
/// [`ExchangeWebsocket`]: crate::exchange::ExchangeWebsocket
pub mod exchange;
/// Exports the market data model: [`Pair`], [`Asset`], [`TickerPrice`],
/// [`OrderbookSnapshot`] and the [`CurrencyConverter`] trait.
///
/// [`Pair`]: crate::market::Pair
/// [`Asset`]: crate::market::Asset
/// [`TickerPrice`]: crate::market::TickerPrice
/// [`OrderbookSnapshot`]: crate::market::OrderbookSnapshot
/// [`CurrencyConverter`]: crate::market::CurrencyConverter
pub mod market;
/// Exports [`SyncManager`] and other types related to currency pair
/// synchronization.
///
/// [`SyncManager`]: crate::sync::SyncManager
pub mod sync;
mod util;

/// Error types returned by `pairsync`.
pub mod error {
    pub use super::exchange::ExchangeError;
    pub use super::market::{ConversionError, PairParseError};
    pub use super::sync::{RelayError, StatsError, SyncError};
}
