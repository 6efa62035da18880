use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::time;

use crate::{
    exchange::{Exchange, ExchangeError, ExchangeManager, ExchangeWebsocket},
    market::{
        Asset, Code, ConversionError, CurrencyConverter, OrderbookLevel, OrderbookSnapshot, Pair,
        TickerPrice,
    },
};

use super::{
    config::SyncConfig,
    engine::SyncManager,
    error::SyncError,
    registry::{AgentRegistry, SyncCounts, SyncItem, Transport},
    state::InitSyncBarrier,
};

struct MockWebsocket {
    connected: AtomicBool,
}

impl ExchangeWebsocket for MockWebsocket {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

struct MockExchange {
    name: &'static str,
    supports_rest: bool,
    supports_websocket: bool,
    websocket_enabled: bool,
    supports_batching: bool,
    orderbook_fails: bool,
    websocket: Arc<MockWebsocket>,
    pairs: Mutex<Vec<Pair>>,
    update_ticker_calls: AtomicUsize,
    update_tickers_calls: AtomicUsize,
    fetch_ticker_calls: AtomicUsize,
    update_orderbook_calls: AtomicUsize,
}

impl MockExchange {
    fn new(name: &'static str, pairs: &[&str]) -> Self {
        Self {
            name,
            supports_rest: true,
            supports_websocket: false,
            websocket_enabled: false,
            supports_batching: false,
            orderbook_fails: false,
            websocket: Arc::new(MockWebsocket {
                connected: AtomicBool::new(false),
            }),
            pairs: Mutex::new(pairs.iter().map(|raw| pair(raw)).collect()),
            update_ticker_calls: AtomicUsize::new(0),
            update_tickers_calls: AtomicUsize::new(0),
            fetch_ticker_calls: AtomicUsize::new(0),
            update_orderbook_calls: AtomicUsize::new(0),
        }
    }

    fn with_websocket(self, connected: bool) -> Self {
        self.websocket.connected.store(connected, Ordering::SeqCst);
        Self {
            supports_websocket: true,
            websocket_enabled: true,
            ..self
        }
    }

    fn with_batching(self) -> Self {
        Self {
            supports_batching: true,
            ..self
        }
    }

    fn with_failing_orderbook(self) -> Self {
        Self {
            orderbook_fails: true,
            ..self
        }
    }

    fn ticker(&self, pair: &Pair) -> TickerPrice {
        TickerPrice {
            exchange: self.name.to_string(),
            pair: pair.clone(),
            asset: Asset::Spot,
            last: 100.0,
            ask: 100.5,
            bid: 99.5,
            high: 110.0,
            low: 90.0,
            volume: 12.0,
        }
    }
}

#[async_trait]
impl Exchange for MockExchange {
    fn name(&self) -> &str {
        self.name
    }

    fn supports_rest(&self) -> bool {
        self.supports_rest
    }

    fn supports_websocket(&self) -> bool {
        self.supports_websocket
    }

    fn is_websocket_enabled(&self) -> bool {
        self.websocket_enabled
    }

    fn supports_rest_ticker_batch_updates(&self) -> bool {
        self.supports_batching
    }

    fn asset_types(&self, _enabled_only: bool) -> Vec<Asset> {
        vec![Asset::Spot]
    }

    fn is_asset_enabled(&self, _asset: Asset) -> bool {
        true
    }

    fn is_asset_websocket_supported(&self, _asset: Asset) -> bool {
        self.supports_websocket
    }

    fn enabled_pairs(&self, _asset: Asset) -> Result<Vec<Pair>, ExchangeError> {
        Ok(self.pairs.lock().expect("mock mutex").clone())
    }

    fn websocket(&self) -> Result<Arc<dyn ExchangeWebsocket>, ExchangeError> {
        if !self.supports_websocket {
            return Err(ExchangeError::WebsocketUnavailable(
                "websocket is not supported".to_string(),
            ));
        }
        Ok(self.websocket.clone())
    }

    async fn update_ticker(
        &self,
        pair: &Pair,
        _asset: Asset,
    ) -> Result<TickerPrice, ExchangeError> {
        self.update_ticker_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ticker(pair))
    }

    async fn update_tickers(&self, _asset: Asset) -> Result<(), ExchangeError> {
        self.update_tickers_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_ticker(&self, pair: &Pair, _asset: Asset) -> Result<TickerPrice, ExchangeError> {
        self.fetch_ticker_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.ticker(pair))
    }

    async fn update_orderbook(
        &self,
        pair: &Pair,
        _asset: Asset,
    ) -> Result<OrderbookSnapshot, ExchangeError> {
        self.update_orderbook_calls.fetch_add(1, Ordering::SeqCst);
        if self.orderbook_fails {
            return Err(ExchangeError::Request("orderbook backend down".to_string()));
        }
        Ok(OrderbookSnapshot {
            exchange: self.name.to_string(),
            pair: pair.clone(),
            asset: Asset::Spot,
            bids: vec![OrderbookLevel {
                price: 99.5,
                amount: 1.0,
            }],
            asks: vec![OrderbookLevel {
                price: 100.5,
                amount: 1.0,
            }],
        })
    }
}

struct MockExchangeManager {
    exchanges: Vec<Arc<dyn Exchange>>,
}

impl MockExchangeManager {
    fn single(exchange: Arc<MockExchange>) -> Self {
        Self {
            exchanges: vec![exchange],
        }
    }
}

impl ExchangeManager for MockExchangeManager {
    fn exchanges(&self) -> Result<Vec<Arc<dyn Exchange>>, ExchangeError> {
        Ok(self.exchanges.clone())
    }
}

struct PassthroughConverter;

impl CurrencyConverter for PassthroughConverter {
    fn convert_fiat(&self, amount: f64, _: &Code, _: &Code) -> Result<f64, ConversionError> {
        Ok(amount)
    }

    fn symbol(&self, _: &Code) -> Result<String, ConversionError> {
        Ok("$".to_string())
    }
}

fn pair(raw: &str) -> Pair {
    raw.parse().expect("valid pair")
}

fn test_config() -> SyncConfig {
    SyncConfig::default()
        .with_num_workers(2)
        .with_timeout_rest(Duration::from_millis(100))
        .with_timeout_websocket(Duration::from_millis(200))
        .with_synchronize_continuously(false)
}

fn ticker_only(config: SyncConfig) -> SyncConfig {
    config
        .with_synchronize_ticker(true)
        .with_synchronize_orderbook(false)
        .with_synchronize_trades(false)
}

fn orderbook_only(config: SyncConfig) -> SyncConfig {
    config
        .with_synchronize_ticker(false)
        .with_synchronize_orderbook(true)
        .with_synchronize_trades(false)
}

fn build_manager(config: SyncConfig, exchange: Arc<MockExchange>) -> Arc<SyncManager> {
    SyncManager::new(
        config,
        Arc::new(MockExchangeManager::single(exchange)),
        Arc::new(PassthroughConverter),
        None,
        None,
    )
    .expect("valid config")
}

async fn await_initial_sync(manager: &Arc<SyncManager>) {
    time::timeout(Duration::from_secs(5), manager.wait_for_initial_sync())
        .await
        .expect("initial sync completes in time")
        .expect("wait succeeds");
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(time::Instant::now() < deadline, "timed out waiting: {what}");
        time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn initial_sync_completes_over_rest() {
    let exchange = Arc::new(MockExchange::new("X", &["BTC-USD", "ETH-USD"]));
    let manager = build_manager(test_config(), exchange.clone());

    manager.start().expect("manager starts");
    await_initial_sync(&manager).await;

    // Two pairs times three enabled streams
    let counts = manager.sync_counts();
    assert_eq!(counts.created, 6);
    assert_eq!(counts.completed, 6);

    assert!(exchange.update_ticker_calls.load(Ordering::SeqCst) >= 2);
    assert!(exchange.update_orderbook_calls.load(Ordering::SeqCst) >= 2);

    eventually("manager auto-stops", || !manager.is_running()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn wait_for_initial_sync_blocks_until_started() {
    let exchange = Arc::new(MockExchange::new("X", &["BTC-USD"]));
    let manager = build_manager(test_config(), exchange);

    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.wait_for_initial_sync().await })
    };

    time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished(), "waiter must block before start");

    manager.start().expect("manager starts");
    time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter wakes up")
        .expect("waiter task joins")
        .expect("wait succeeds");
}

#[tokio::test(flavor = "multi_thread")]
async fn stale_websocket_stream_demotes_to_rest() {
    let exchange = Arc::new(MockExchange::new("Y", &["BTC-USD"]).with_websocket(true));
    let config = ticker_only(test_config())
        .with_timeout_websocket(Duration::from_millis(50))
        .with_timeout_rest(Duration::from_millis(200));
    let manager = build_manager(config, exchange.clone());

    manager.start().expect("manager starts");
    await_initial_sync(&manager).await;

    let agent = manager
        .registry()
        .get("Y", &pair("BTC-USD"), Asset::Spot)
        .expect("agent registered");
    assert!(agent.ticker().transport().is_rest());
    assert!(agent.ticker().have_data());
    assert_eq!(
        manager.sync_counts(),
        SyncCounts {
            created: 1,
            completed: 1
        }
    );
    assert!(exchange.update_ticker_calls.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn batched_ticker_issues_single_batch() {
    let exchange =
        Arc::new(MockExchange::new("Z", &["BTC-USD", "ETH-USD", "LTC-USD"]).with_batching());
    let config = ticker_only(test_config()).with_timeout_rest(Duration::from_millis(500));
    let manager = build_manager(config, exchange.clone());

    manager.start().expect("manager starts");
    await_initial_sync(&manager).await;

    // One batched request per pacing window, one cache read per pair
    assert_eq!(exchange.update_tickers_calls.load(Ordering::SeqCst), 1);
    assert_eq!(exchange.fetch_ticker_calls.load(Ordering::SeqCst), 3);
    assert_eq!(exchange.update_ticker_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_fetch_counts_as_first_datum() {
    let exchange = Arc::new(MockExchange::new("E", &["BTC-USD"]).with_failing_orderbook());
    let manager = build_manager(orderbook_only(test_config()), exchange.clone());

    manager.start().expect("manager starts");
    await_initial_sync(&manager).await;

    let agent = manager
        .registry()
        .get("E", &pair("BTC-USD"), Asset::Spot)
        .expect("agent registered");
    assert!(agent.orderbook().have_data());
    assert!(agent.orderbook().num_errors() >= 1);
    assert_eq!(
        manager.sync_counts(),
        SyncCounts {
            created: 1,
            completed: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn errors_accumulate_across_sweeps() {
    let exchange = Arc::new(MockExchange::new("E", &["BTC-USD"]).with_failing_orderbook());
    let config = orderbook_only(test_config())
        .with_timeout_rest(Duration::from_millis(50))
        .with_synchronize_continuously(true);
    let manager = build_manager(config, exchange);

    manager.start().expect("manager starts");
    eventually("errors accumulate", || {
        manager
            .registry()
            .get("E", &pair("BTC-USD"), Asset::Spot)
            .map(|agent| agent.orderbook().num_errors() >= 2)
            .unwrap_or(false)
    })
    .await;

    manager.stop().expect("manager stops");
}

#[tokio::test(flavor = "multi_thread")]
async fn newly_enabled_pair_is_picked_up_mid_run() {
    let exchange = Arc::new(MockExchange::new("X", &["BTC-USD"]));
    let config = ticker_only(test_config())
        .with_timeout_rest(Duration::from_millis(50))
        .with_synchronize_continuously(true);
    let manager = build_manager(config, exchange.clone());

    manager.start().expect("manager starts");
    await_initial_sync(&manager).await;
    assert!(
        !manager
            .registry()
            .exists("X", &pair("LTC-USD"), Asset::Spot)
    );

    exchange
        .pairs
        .lock()
        .expect("mock mutex")
        .push(pair("LTC-USD"));

    eventually("new pair registered", || {
        manager.registry().exists("X", &pair("LTC-USD"), Asset::Spot)
    })
    .await;
    eventually("new pair refreshed", || {
        manager
            .registry()
            .get("X", &pair("LTC-USD"), Asset::Spot)
            .map(|agent| agent.ticker().have_data())
            .unwrap_or(false)
    })
    .await;

    // The barrier had closed; late units no longer move the counters
    assert_eq!(
        manager.sync_counts(),
        SyncCounts {
            created: 1,
            completed: 1
        }
    );

    manager.stop().expect("manager stops");
}

#[tokio::test(flavor = "multi_thread")]
async fn lifecycle_transitions_are_compare_and_swap() {
    let exchange = Arc::new(MockExchange::new("X", &["BTC-USD"]));
    let config = test_config().with_synchronize_continuously(true);
    let manager = build_manager(config, exchange);

    manager.start().expect("first start succeeds");
    assert!(matches!(manager.start(), Err(SyncError::AlreadyStarted)));
    assert!(manager.is_running());

    manager.stop().expect("first stop succeeds");
    assert!(matches!(manager.stop(), Err(SyncError::NotStarted)));
    assert!(!manager.is_running());
}

#[test]
fn rejects_invalid_configs() {
    let exchange = Arc::new(MockExchange::new("X", &[]));
    let build = |config: SyncConfig| {
        SyncManager::new(
            config,
            Arc::new(MockExchangeManager::single(exchange.clone())),
            Arc::new(PassthroughConverter),
            None,
            None,
        )
    };

    let no_items = SyncConfig::default()
        .with_synchronize_ticker(false)
        .with_synchronize_orderbook(false)
        .with_synchronize_trades(false);
    assert!(matches!(
        build(no_items),
        Err(SyncError::NoSyncItemsEnabled)
    ));

    let empty_fiat = SyncConfig::default().with_fiat_display_currency("");
    assert!(matches!(
        build(empty_fiat),
        Err(SyncError::EmptyFiatDisplayCurrency)
    ));

    let crypto_fiat = SyncConfig::default().with_fiat_display_currency("BTC");
    assert!(matches!(
        build(crypto_fiat),
        Err(SyncError::NotFiatDisplayCurrency(code)) if code.as_str() == "BTC"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn update_round_trip_and_gating() {
    let exchange = Arc::new(MockExchange::new("X", &[]));
    let config = ticker_only(test_config())
        .with_num_workers(1)
        .with_synchronize_continuously(true);
    let manager = build_manager(config, exchange);
    let btc_usd = pair("BTC-USD");

    // Reports against a stopped manager are lifecycle errors
    assert!(matches!(
        manager.update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, None),
        Err(SyncError::NotStarted)
    ));

    manager.start().expect("manager starts");

    // Unknown keys cannot accept new data
    assert!(matches!(
        manager.update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, None),
        Err(SyncError::CouldNotSyncNewData { .. })
    ));

    // Reports for streams that are not synchronized are no-ops
    manager
        .update("X", &btc_usd, Asset::Spot, SyncItem::Orderbook, None)
        .expect("disabled stream report is a no-op");

    manager
        .registry()
        .add("X", btc_usd.clone(), Asset::Spot, Transport::Rest);

    let before = Utc::now();
    let error = ExchangeError::Request("boom".to_string());
    manager
        .update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, Some(&error))
        .expect("report accepted");

    let agent = manager
        .registry()
        .get("X", &btc_usd, Asset::Spot)
        .expect("agent registered");
    assert!(agent.ticker().have_data());
    assert!(!agent.ticker().is_processing());
    assert_eq!(agent.ticker().num_errors(), 1);
    assert!(agent.ticker().last_updated().expect("stamped") >= before);

    // Further reports touch the stream, never the barrier counters
    manager
        .update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, None)
        .expect("report accepted");
    let agent = manager
        .registry()
        .get("X", &btc_usd, Asset::Spot)
        .expect("agent registered");
    assert_eq!(agent.ticker().num_errors(), 1);
    assert_eq!(
        manager.sync_counts(),
        SyncCounts {
            created: 0,
            completed: 0
        }
    );

    manager.stop().expect("manager stops");
}

#[test]
fn registry_deduplicates_and_counts() {
    let config = SyncConfig::default();
    let barrier = Arc::new(InitSyncBarrier::new());
    let registry = AgentRegistry::new((&config).into(), barrier.clone());

    // Mirror `start`: hold the barrier open while the catalogue builds
    barrier.arm(1);

    let btc_usd = pair("BTC-USD");
    registry.add("X", btc_usd.clone(), Asset::Spot, Transport::Rest);
    assert_eq!(registry.counts().created, 3);
    assert!(registry.exists("X", &btc_usd, Asset::Spot));

    // Re-adding the same key neither duplicates nor re-arms
    registry.add("X", btc_usd.clone(), Asset::Spot, Transport::Rest);
    assert_eq!(registry.counts().created, 3);

    registry
        .update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, false)
        .expect("report accepted");
    assert_eq!(registry.counts().completed, 1);

    // The barrier releases at most once per (unit, stream)
    registry
        .update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true)
        .expect("report accepted");
    assert_eq!(registry.counts().completed, 1);

    assert!(matches!(
        registry.update("X", &pair("ETH-USD"), Asset::Spot, SyncItem::Ticker, false),
        Err(SyncError::CouldNotSyncNewData { .. })
    ));
    assert!(matches!(
        registry.get("X", &pair("ETH-USD"), Asset::Spot),
        Err(SyncError::PairNotFound { .. })
    ));
}

#[test]
fn try_begin_grants_a_single_claim() {
    let config = ticker_only(SyncConfig::default());
    let barrier = Arc::new(InitSyncBarrier::new());
    let registry = AgentRegistry::new((&config).into(), barrier);

    let btc_usd = pair("BTC-USD");
    registry.add("X", btc_usd.clone(), Asset::Spot, Transport::Rest);

    use super::arbiter::StreamDecision;

    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true),
        Some(StreamDecision::Fetch)
    );
    assert!(registry.is_processing("X", &btc_usd, Asset::Spot, SyncItem::Ticker));
    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true),
        Some(StreamDecision::InFlight)
    );

    // Releasing the flag re-opens the claim for a still-due stream
    registry.set_processing("X", &btc_usd, Asset::Spot, SyncItem::Ticker, false);
    assert!(!registry.is_processing("X", &btc_usd, Asset::Spot, SyncItem::Ticker));
    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true),
        Some(StreamDecision::Fetch)
    );

    registry
        .update("X", &btc_usd, Asset::Spot, SyncItem::Ticker, false)
        .expect("report accepted");
    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true),
        Some(StreamDecision::Fresh)
    );

    assert_eq!(
        registry.try_begin("X", &pair("ETH-USD"), Asset::Spot, SyncItem::Ticker, true),
        None
    );
}

#[test]
fn try_begin_demotes_stale_websocket_stream() {
    let config = ticker_only(SyncConfig::default())
        .with_timeout_rest(Duration::from_millis(1))
        .with_timeout_websocket(Duration::from_millis(1));
    let barrier = Arc::new(InitSyncBarrier::new());
    let registry = AgentRegistry::new((&config).into(), barrier);

    let btc_usd = pair("BTC-USD");
    registry.add("X", btc_usd.clone(), Asset::Spot, Transport::Websocket);
    std::thread::sleep(Duration::from_millis(10));

    use super::arbiter::StreamDecision;

    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, true),
        Some(StreamDecision::Demote)
    );
    let agent = registry
        .get("X", &btc_usd, Asset::Spot)
        .expect("agent registered");
    assert!(agent.ticker().transport().is_rest());
    assert!(agent.ticker().is_processing());
}

#[test]
fn try_begin_holds_websocket_without_rest_fallback() {
    let config = ticker_only(SyncConfig::default())
        .with_timeout_rest(Duration::from_millis(1))
        .with_timeout_websocket(Duration::from_millis(1));
    let barrier = Arc::new(InitSyncBarrier::new());
    let registry = AgentRegistry::new((&config).into(), barrier);

    let btc_usd = pair("BTC-USD");
    registry.add("X", btc_usd.clone(), Asset::Spot, Transport::Websocket);
    std::thread::sleep(Duration::from_millis(10));

    use super::arbiter::StreamDecision;

    assert_eq!(
        registry.try_begin("X", &btc_usd, Asset::Spot, SyncItem::Ticker, false),
        Some(StreamDecision::HoldWebsocket)
    );
    let agent = registry
        .get("X", &btc_usd, Asset::Spot)
        .expect("agent registered");
    assert!(agent.ticker().transport().is_websocket());
    assert!(!agent.ticker().is_processing());
}

#[test]
fn ticker_batch_claims_are_paced() {
    let config = SyncConfig::default();
    let barrier = Arc::new(InitSyncBarrier::new());
    let registry = AgentRegistry::new((&config).into(), barrier);
    let timeout = Duration::from_millis(50);

    assert!(registry.try_claim_ticker_batch("Z", timeout));
    assert!(!registry.try_claim_ticker_batch("Z", timeout));

    // Independent exchanges pace independently
    assert!(registry.try_claim_ticker_batch("W", timeout));

    std::thread::sleep(Duration::from_millis(60));
    assert!(registry.try_claim_ticker_batch("Z", timeout));
}

#[test]
fn sync_item_wire_values_round_trip() {
    for item in [SyncItem::Ticker, SyncItem::Orderbook, SyncItem::Trade] {
        let wire = u8::from(item);
        assert_eq!(SyncItem::try_from(wire).expect("known item"), item);
    }
    assert_eq!(u8::from(SyncItem::Ticker), 0);
    assert_eq!(u8::from(SyncItem::Orderbook), 1);
    assert_eq!(u8::from(SyncItem::Trade), 2);

    assert!(matches!(
        SyncItem::try_from(3),
        Err(SyncError::UnknownSyncItem(3))
    ));
}
