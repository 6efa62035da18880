use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::market::{Asset, Pair};

/// Event handed to the websocket RPC relay when a stream produces new data.
#[derive(Clone, Debug, Serialize)]
pub struct WebsocketEvent {
    pub data: Value,
    pub event: String,
    pub asset_type: Asset,
    pub exchange: String,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    /// The RPC service is not running. Not a failure; broadcasts are simply
    /// dropped until it comes up.
    #[error("websocket RPC service is not running")]
    ServiceNotRunning,

    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// Broadcast surface of the websocket RPC service.
pub trait EventRelay: Send + Sync {
    fn broadcast(&self, event: WebsocketEvent) -> Result<(), RelayError>;
}

#[derive(Error, Debug)]
#[error("stat rejected: {0}")]
pub struct StatsError(pub String);

/// Sink for per-pair last price and volume statistics.
pub trait StatsSink: Send + Sync {
    fn add(
        &self,
        exchange: &str,
        pair: &Pair,
        asset: Asset,
        last: f64,
        volume: f64,
    ) -> Result<(), StatsError>;
}
