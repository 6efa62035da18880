use std::time::Duration;

use crate::market::{Code, PairFormat};

/// Worker count used when the configured value is zero.
pub const DEFAULT_NUM_WORKERS: usize = 15;

/// Staleness bound for REST-driven streams when the configured value is zero.
pub const DEFAULT_TIMEOUT_REST: Duration = Duration::from_secs(15);

/// Staleness bound for websocket-driven streams when the configured value is
/// zero. Also the grace period a fresh websocket stream gets to deliver its
/// first frame before being demoted to REST.
pub const DEFAULT_TIMEOUT_WEBSOCKET: Duration = Duration::from_secs(60);

/// Configuration for the currency pair sync manager. Immutable after start.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    synchronize_ticker: bool,
    synchronize_orderbook: bool,
    synchronize_trades: bool,
    synchronize_continuously: bool,
    verbose: bool,
    num_workers: usize,
    timeout_rest: Duration,
    timeout_websocket: Duration,
    fiat_display_currency: Code,
    pair_format: PairFormat,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            synchronize_ticker: true,
            synchronize_orderbook: true,
            synchronize_trades: true,
            synchronize_continuously: true,
            verbose: false,
            num_workers: DEFAULT_NUM_WORKERS,
            timeout_rest: DEFAULT_TIMEOUT_REST,
            timeout_websocket: DEFAULT_TIMEOUT_WEBSOCKET,
            fiat_display_currency: Code::new("USD"),
            pair_format: PairFormat::default(),
        }
    }
}

impl SyncConfig {
    /// Returns whether ticker streams are synchronized.
    pub fn synchronize_ticker(&self) -> bool {
        self.synchronize_ticker
    }

    /// Returns whether order book streams are synchronized.
    pub fn synchronize_orderbook(&self) -> bool {
        self.synchronize_orderbook
    }

    /// Returns whether trade streams are synchronized.
    pub fn synchronize_trades(&self) -> bool {
        self.synchronize_trades
    }

    /// Returns whether synchronization continues after the initial sync
    /// completes. When `false` the manager stops itself once every enabled
    /// stream has produced its first datum.
    pub fn synchronize_continuously(&self) -> bool {
        self.synchronize_continuously
    }

    /// Returns whether per-item debug logging is enabled.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Returns the number of sync workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Returns the staleness bound for REST-driven streams.
    pub fn timeout_rest(&self) -> Duration {
        self.timeout_rest
    }

    /// Returns the staleness bound for websocket-driven streams.
    pub fn timeout_websocket(&self) -> Duration {
        self.timeout_websocket
    }

    /// Returns the fiat currency used for display conversion.
    pub fn fiat_display_currency(&self) -> &Code {
        &self.fiat_display_currency
    }

    /// Returns the pair display format.
    pub fn pair_format(&self) -> &PairFormat {
        &self.pair_format
    }

    /// Sets whether ticker streams are synchronized.
    ///
    /// Default: `true`
    pub fn with_synchronize_ticker(mut self, enabled: bool) -> Self {
        self.synchronize_ticker = enabled;
        self
    }

    /// Sets whether order book streams are synchronized.
    ///
    /// Default: `true`
    pub fn with_synchronize_orderbook(mut self, enabled: bool) -> Self {
        self.synchronize_orderbook = enabled;
        self
    }

    /// Sets whether trade streams are synchronized.
    ///
    /// Default: `true`
    pub fn with_synchronize_trades(mut self, enabled: bool) -> Self {
        self.synchronize_trades = enabled;
        self
    }

    /// Sets whether synchronization continues after the initial sync.
    ///
    /// Default: `true`
    pub fn with_synchronize_continuously(mut self, enabled: bool) -> Self {
        self.synchronize_continuously = enabled;
        self
    }

    /// Sets whether per-item debug logging is enabled.
    ///
    /// Default: `false`
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets the number of sync workers. Zero falls back to
    /// [`DEFAULT_NUM_WORKERS`].
    ///
    /// Default: `15`
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Sets the staleness bound for REST-driven streams. Zero falls back to
    /// [`DEFAULT_TIMEOUT_REST`].
    ///
    /// Default: `15` seconds
    pub fn with_timeout_rest(mut self, timeout: Duration) -> Self {
        self.timeout_rest = timeout;
        self
    }

    /// Sets the staleness bound for REST-driven streams in whole seconds.
    pub fn with_timeout_rest_secs(self, secs: u64) -> Self {
        self.with_timeout_rest(Duration::from_secs(secs))
    }

    /// Sets the staleness bound for websocket-driven streams. Zero falls
    /// back to [`DEFAULT_TIMEOUT_WEBSOCKET`].
    ///
    /// Default: `60` seconds
    pub fn with_timeout_websocket(mut self, timeout: Duration) -> Self {
        self.timeout_websocket = timeout;
        self
    }

    /// Sets the staleness bound for websocket-driven streams in whole
    /// seconds.
    pub fn with_timeout_websocket_secs(self, secs: u64) -> Self {
        self.with_timeout_websocket(Duration::from_secs(secs))
    }

    /// Sets the fiat currency used for display conversion.
    ///
    /// Default: `USD`
    pub fn with_fiat_display_currency(mut self, code: impl Into<Code>) -> Self {
        self.fiat_display_currency = code.into();
        self
    }

    /// Sets the pair display format.
    ///
    /// Default: upper-cased, `-` delimited
    pub fn with_pair_format(mut self, format: PairFormat) -> Self {
        self.pair_format = format;
        self
    }

    /// Returns a copy with zero worker counts and timeouts replaced by their
    /// defaults.
    pub(super) fn normalized(mut self) -> Self {
        if self.num_workers == 0 {
            self.num_workers = DEFAULT_NUM_WORKERS;
        }
        if self.timeout_rest.is_zero() {
            self.timeout_rest = DEFAULT_TIMEOUT_REST;
        }
        if self.timeout_websocket.is_zero() {
            self.timeout_websocket = DEFAULT_TIMEOUT_WEBSOCKET;
        }
        self
    }
}

#[derive(Clone)]
pub(super) struct SyncProcessConfig {
    synchronize_ticker: bool,
    synchronize_orderbook: bool,
    synchronize_trades: bool,
    verbose: bool,
    timeout_rest: Duration,
    timeout_websocket: Duration,
}

impl SyncProcessConfig {
    pub fn synchronize_ticker(&self) -> bool {
        self.synchronize_ticker
    }

    pub fn synchronize_orderbook(&self) -> bool {
        self.synchronize_orderbook
    }

    pub fn synchronize_trades(&self) -> bool {
        self.synchronize_trades
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn timeout_rest(&self) -> Duration {
        self.timeout_rest
    }

    pub fn timeout_websocket(&self) -> Duration {
        self.timeout_websocket
    }
}

impl From<&SyncConfig> for SyncProcessConfig {
    fn from(value: &SyncConfig) -> Self {
        Self {
            synchronize_ticker: value.synchronize_ticker,
            synchronize_orderbook: value.synchronize_orderbook,
            synchronize_trades: value.synchronize_trades,
            verbose: value.verbose,
            timeout_rest: value.timeout_rest,
            timeout_websocket: value.timeout_websocket,
        }
    }
}

#[derive(Clone)]
pub(super) struct RegistryConfig {
    synchronize_ticker: bool,
    synchronize_orderbook: bool,
    synchronize_trades: bool,
    verbose: bool,
    timeout_rest: Duration,
    timeout_websocket: Duration,
    pair_format: PairFormat,
}

impl RegistryConfig {
    pub fn synchronize_ticker(&self) -> bool {
        self.synchronize_ticker
    }

    pub fn synchronize_orderbook(&self) -> bool {
        self.synchronize_orderbook
    }

    pub fn synchronize_trades(&self) -> bool {
        self.synchronize_trades
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn timeout_rest(&self) -> Duration {
        self.timeout_rest
    }

    pub fn timeout_websocket(&self) -> Duration {
        self.timeout_websocket
    }

    pub fn pair_format(&self) -> &PairFormat {
        &self.pair_format
    }
}

impl From<&SyncConfig> for RegistryConfig {
    fn from(value: &SyncConfig) -> Self {
        Self {
            synchronize_ticker: value.synchronize_ticker,
            synchronize_orderbook: value.synchronize_orderbook,
            synchronize_trades: value.synchronize_trades,
            verbose: value.verbose,
            timeout_rest: value.timeout_rest,
            timeout_websocket: value.timeout_websocket,
            pair_format: value.pair_format.clone(),
        }
    }
}
