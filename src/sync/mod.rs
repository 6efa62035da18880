mod arbiter;
mod config;
mod engine;
pub(crate) mod error;
mod process;
mod registry;
pub(crate) mod sinks;
mod state;
mod summary;

pub use config::{
    DEFAULT_NUM_WORKERS, DEFAULT_TIMEOUT_REST, DEFAULT_TIMEOUT_WEBSOCKET, SyncConfig,
};
pub use engine::SyncManager;
pub use error::SyncError;
pub use registry::{SyncAgent, SyncBase, SyncCounts, SyncItem, Transport};
pub use sinks::{EventRelay, RelayError, StatsError, StatsSink, WebsocketEvent};

#[cfg(test)]
mod tests;
