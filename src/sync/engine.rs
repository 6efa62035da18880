use std::{
    result,
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::{
    exchange::{Exchange, ExchangeError, ExchangeManager},
    market::{Asset, CurrencyConverter, OrderbookSnapshot, Pair, TickerPrice},
    util::AbortOnDropHandle,
};

use super::{
    arbiter,
    config::SyncConfig,
    error::{Result, SyncError},
    process::SyncWorker,
    registry::{AgentRegistry, SyncCounts, SyncItem, Transport},
    sinks::{EventRelay, StatsSink},
    state::InitSyncBarrier,
    summary::SummaryPrinter,
};

/// Keeps a freshness-bounded snapshot of ticker, order book and trade
/// streams for every enabled (exchange, asset, pair) combination.
///
/// Constructed stopped; [`start`](Self::start) enumerates the catalogue,
/// arms the initial-sync barrier and spawns the worker pool. Lifecycle
/// transitions are compare-and-swap: a second `start` or `stop` fails with
/// [`SyncError::AlreadyStarted`] / [`SyncError::NotStarted`].
pub struct SyncManager {
    config: SyncConfig,
    exchange_manager: Arc<dyn ExchangeManager>,
    relay: Option<Arc<dyn EventRelay>>,
    registry: AgentRegistry,
    barrier: Arc<InitSyncBarrier>,
    printer: SummaryPrinter,
    started: AtomicBool,
    init_sync_started: AtomicBool,
    init_sync_completed: AtomicBool,
    started_once_tx: watch::Sender<bool>,
    init_sync_start: Mutex<Option<DateTime<Utc>>>,
    workers: Mutex<Vec<AbortOnDropHandle<()>>>,
    monitor: Mutex<Option<AbortOnDropHandle<()>>>,
    weak_self: Weak<SyncManager>,
}

impl SyncManager {
    /// Validates the configuration and builds a stopped manager.
    ///
    /// At least one `synchronize_*` flag must be set and the fiat display
    /// currency must be a recognised fiat. A zero worker count or zero
    /// timeout falls back to its default. `stats` and `relay` are optional
    /// collaborators; a manager built without them simply skips feeding
    /// them.
    pub fn new(
        config: SyncConfig,
        exchange_manager: Arc<dyn ExchangeManager>,
        converter: Arc<dyn CurrencyConverter>,
        stats: Option<Arc<dyn StatsSink>>,
        relay: Option<Arc<dyn EventRelay>>,
    ) -> Result<Arc<Self>> {
        if !config.synchronize_ticker()
            && !config.synchronize_orderbook()
            && !config.synchronize_trades()
        {
            return Err(SyncError::NoSyncItemsEnabled);
        }
        if config.fiat_display_currency().is_empty() {
            return Err(SyncError::EmptyFiatDisplayCurrency);
        }
        if !config.fiat_display_currency().is_fiat() {
            return Err(SyncError::NotFiatDisplayCurrency(
                config.fiat_display_currency().clone(),
            ));
        }

        let config = config.normalized();
        debug!(
            "exchange currency pair syncer config: continuous: {} ticker: {} orderbook: {} \
             trades: {} workers: {} verbose: {} timeout REST: {:?} timeout websocket: {:?}",
            config.synchronize_continuously(),
            config.synchronize_ticker(),
            config.synchronize_orderbook(),
            config.synchronize_trades(),
            config.num_workers(),
            config.verbose(),
            config.timeout_rest(),
            config.timeout_websocket(),
        );

        let barrier = Arc::new(InitSyncBarrier::new());
        let registry = AgentRegistry::new((&config).into(), barrier.clone());
        let printer = SummaryPrinter::new(
            config.fiat_display_currency().clone(),
            config.pair_format().clone(),
            converter,
            stats,
        );
        let (started_once_tx, _) = watch::channel(false);

        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            exchange_manager,
            relay,
            registry,
            barrier,
            printer,
            started: AtomicBool::new(false),
            init_sync_started: AtomicBool::new(false),
            init_sync_completed: AtomicBool::new(false),
            started_once_tx,
            init_sync_start: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            monitor: Mutex::new(None),
            weak_self: weak_self.clone(),
        }))
    }

    /// Safely checks whether the manager is running.
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Enumerates the catalogue, arms the barrier and spawns the workers.
    ///
    /// If the barrier closes synchronously during enumeration (an empty
    /// catalogue) and continuous synchronization is off, no workers are
    /// spawned and the monitor stops the manager again.
    pub fn start(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::AlreadyStarted);
        }

        let exchanges = match self.exchange_manager.exchanges() {
            Ok(exchanges) => exchanges,
            Err(err) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(err.into());
            }
        };

        // Hold the barrier open while the catalogue is enumerated
        self.barrier.arm(1);

        let _ = self.started_once_tx.send(true);
        debug!("exchange currency pair syncer started");

        for exchange in &exchanges {
            self.register_exchange_pairs(exchange.as_ref());
        }

        if self
            .init_sync_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(
                "exchange currency pair syncer initial sync started, {} items to process",
                self.registry.counts().created,
            );
            *self.lock_init_sync_start() = Some(Utc::now());
        }

        self.spawn_monitor();
        self.barrier.done();

        if self.barrier.is_closed() && !self.config.synchronize_continuously() {
            return Ok(());
        }

        let mut workers = self.lock_workers();
        workers.clear();
        for _ in 0..self.config.num_workers() {
            workers.push(SyncWorker::spawn(&self.config, self.weak_self.clone()));
        }
        Ok(())
    }

    /// Flips the started flag. Workers observe it between pairs and exit;
    /// in-flight external calls are allowed to finish.
    pub fn stop(&self) -> Result<()> {
        if self
            .started
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::NotStarted);
        }
        debug!("exchange currency pair syncer stopped");
        Ok(())
    }

    /// Reports the outcome of one fetch for (exchange, pair, asset, item).
    ///
    /// A successful no-op before the initial sync is armed, or when the
    /// stream kind is not synchronized. Fails with
    /// [`SyncError::CouldNotSyncNewData`] for an unknown key.
    pub fn update(
        &self,
        exchange: &str,
        pair: &Pair,
        asset: Asset,
        item: SyncItem,
        error: Option<&ExchangeError>,
    ) -> Result<()> {
        if !self.is_running() {
            return Err(SyncError::NotStarted);
        }
        if !self.init_sync_started.load(Ordering::SeqCst) {
            return Ok(());
        }

        let enabled = match item {
            SyncItem::Ticker => self.config.synchronize_ticker(),
            SyncItem::Orderbook => self.config.synchronize_orderbook(),
            SyncItem::Trade => self.config.synchronize_trades(),
        };
        if !enabled {
            return Ok(());
        }

        self.registry
            .update(exchange, pair, asset, item, error.is_some())
    }

    /// Blocks until the manager has been started and the initial-sync latch
    /// has closed. Unbounded; no cancellation.
    pub async fn wait_for_initial_sync(&self) -> Result<()> {
        let mut started_rx = self.started_once_tx.subscribe();

        // The sender lives on the manager, so the channel can't close here
        let _ = started_rx.wait_for(|started| *started).await;

        self.barrier.wait().await;
        Ok(())
    }

    /// Outputs a ticker summary line. Best-effort; inert while stopped.
    pub fn print_ticker_summary(
        &self,
        result: &result::Result<TickerPrice, ExchangeError>,
        protocol: &str,
    ) {
        if !self.is_running() {
            return;
        }
        self.printer.print_ticker_summary(result, protocol);
    }

    /// Outputs an order book summary line. Best-effort; inert while stopped.
    pub fn print_orderbook_summary(
        &self,
        result: &result::Result<OrderbookSnapshot, ExchangeError>,
        protocol: &str,
    ) {
        if !self.is_running() {
            return;
        }
        self.printer.print_orderbook_summary(result, protocol);
    }

    /// Formats a pair according to the configured display preferences.
    pub fn format_currency(&self, pair: &Pair) -> String {
        self.printer.format_currency(pair)
    }

    /// Returns the initial-sync progress counters.
    pub fn sync_counts(&self) -> SyncCounts {
        self.registry.counts()
    }

    pub(super) fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub(super) fn exchange_manager(&self) -> &Arc<dyn ExchangeManager> {
        &self.exchange_manager
    }

    pub(super) fn relay(&self) -> Option<&Arc<dyn EventRelay>> {
        self.relay.as_ref()
    }

    /// Registers every enabled pair of one exchange, with stream transports
    /// derived from the exchange's configured (not live) websocket state.
    fn register_exchange_pairs(&self, exchange: &dyn Exchange) {
        let exchange_name = exchange.name();
        let supports_websocket = exchange.supports_websocket();
        let supports_rest = exchange.supports_rest();

        if !supports_rest && !supports_websocket {
            warn!("loaded exchange {exchange_name} supports neither REST nor websocket");
            return;
        }

        let using_websocket = supports_websocket && exchange.is_websocket_enabled();

        for asset in exchange.asset_types(false) {
            if !exchange.is_asset_enabled(asset) {
                warn!(
                    "{exchange_name} asset type {asset} is disabled, \
                     fetching enabled pairs is paused"
                );
                continue;
            }

            let ws_asset_supported = exchange.is_asset_websocket_supported(asset);
            if !ws_asset_supported {
                warn!(
                    "{exchange_name} asset type {asset} websocket functionality is unsupported, \
                     REST fetching only"
                );
            }

            let pairs = match exchange.enabled_pairs(asset) {
                Ok(pairs) => pairs,
                Err(err) => {
                    error!("{exchange_name} failed to get enabled pairs: {err}");
                    continue;
                }
            };
            for pair in pairs {
                if self.registry.exists(exchange_name, &pair, asset) {
                    continue;
                }
                let transport = if using_websocket && ws_asset_supported {
                    Transport::Websocket
                } else {
                    Transport::Rest
                };
                self.registry.add(exchange_name, pair, asset, transport);
            }
        }
    }

    /// Spawns the one-shot task that logs initial-sync completion and, for
    /// non-continuous runs, triggers the graceful stop.
    fn spawn_monitor(&self) {
        let barrier = self.barrier.clone();
        let manager = self.weak_self.clone();

        let handle = tokio::spawn(async move {
            barrier.wait().await;

            let Some(manager) = manager.upgrade() else {
                return;
            };
            if manager
                .init_sync_completed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }

            let counts = manager.registry.counts();
            let init_sync_start = *manager.lock_init_sync_start();
            let took = init_sync_start
                .map(|start| arbiter::elapsed_since(Utc::now(), start))
                .unwrap_or_default();
            debug!(
                "exchange currency pair syncer initial sync complete, \
                 took {took:?} [{} sync items]",
                counts.created,
            );

            if !manager.config.synchronize_continuously() {
                debug!("exchange currency pair syncer stopping");
                if let Err(err) = manager.stop() {
                    error!("{err}");
                }
            }
        });
        *self.lock_monitor() = Some(handle.into());
    }

    fn lock_init_sync_start(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.init_sync_start
            .lock()
            .expect("`SyncManager` mutex can't be poisoned")
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<AbortOnDropHandle<()>>> {
        self.workers
            .lock()
            .expect("`SyncManager` mutex can't be poisoned")
    }

    fn lock_monitor(&self) -> MutexGuard<'_, Option<AbortOnDropHandle<()>>> {
        self.monitor
            .lock()
            .expect("`SyncManager` mutex can't be poisoned")
    }
}
