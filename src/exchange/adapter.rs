use std::sync::Arc;

use async_trait::async_trait;

use crate::market::{Asset, OrderbookSnapshot, Pair, TickerPrice};

use super::error::ExchangeError;

/// Registry of loaded exchanges, owned by the surrounding system.
pub trait ExchangeManager: Send + Sync {
    /// Snapshots the currently loaded exchanges.
    fn exchanges(&self) -> Result<Vec<Arc<dyn Exchange>>, ExchangeError>;
}

/// Handle onto an exchange's websocket connection state.
pub trait ExchangeWebsocket: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Capability set the sync core requires from one exchange.
///
/// Capability introspection is synchronous and in-memory; the `update_*` and
/// `fetch_*` operations perform network I/O and are expected to honour the
/// transport-level timeouts configured on the client itself.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> &str;

    fn supports_rest(&self) -> bool;

    fn supports_websocket(&self) -> bool;

    /// Returns `true` if the websocket transport is enabled in the exchange
    /// configuration (independent of the current connection state).
    fn is_websocket_enabled(&self) -> bool;

    /// Returns `true` if the exchange exposes a single REST endpoint
    /// returning all tickers of an asset class in one call.
    fn supports_rest_ticker_batch_updates(&self) -> bool;

    fn asset_types(&self, enabled_only: bool) -> Vec<Asset>;

    fn is_asset_enabled(&self, asset: Asset) -> bool;

    fn is_asset_websocket_supported(&self, asset: Asset) -> bool;

    fn enabled_pairs(&self, asset: Asset) -> Result<Vec<Pair>, ExchangeError>;

    fn websocket(&self) -> Result<Arc<dyn ExchangeWebsocket>, ExchangeError>;

    /// Requests a fresh ticker for one pair.
    async fn update_ticker(&self, pair: &Pair, asset: Asset)
    -> Result<TickerPrice, ExchangeError>;

    /// Requests fresh tickers for every enabled pair of an asset class in
    /// one batched call.
    async fn update_tickers(&self, asset: Asset) -> Result<(), ExchangeError>;

    /// Reads a ticker from the exchange's local cache, falling back to a
    /// request if the cache is cold.
    async fn fetch_ticker(&self, pair: &Pair, asset: Asset) -> Result<TickerPrice, ExchangeError>;

    /// Requests a fresh order book snapshot for one pair.
    async fn update_orderbook(
        &self,
        pair: &Pair,
        asset: Asset,
    ) -> Result<OrderbookSnapshot, ExchangeError>;
}
