use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::time;
use tracing::{debug, error, warn};

use crate::{
    exchange::{Exchange, ExchangeError},
    util::AbortOnDropHandle,
};

use super::{
    arbiter::StreamDecision,
    config::{SyncConfig, SyncProcessConfig},
    engine::SyncManager,
    registry::{SyncAgent, SyncItem, Transport},
    sinks::{RelayError, WebsocketEvent},
};

/// Backoff applied when a stream is within its freshness bound, keeping a
/// worker from spinning while nothing is due.
const IDLE_BACKOFF: time::Duration = time::Duration::from_millis(50);

/// One worker of the sync pool. All workers are symmetric: each sweeps the
/// full catalogue and competes for per-stream in-flight claims; there is no
/// shared job queue.
///
/// Workers hold the manager weakly so an abandoned manager winds its pool
/// down on its own.
pub(super) struct SyncWorker {
    config: SyncProcessConfig,
    manager: Weak<SyncManager>,
}

impl SyncWorker {
    pub fn spawn(config: &SyncConfig, manager: Weak<SyncManager>) -> AbortOnDropHandle<()> {
        let worker = Self {
            config: config.into(),
            manager,
        };

        tokio::spawn(worker.run()).into()
    }

    async fn run(self) {
        loop {
            let Some(manager) = self.manager.upgrade() else {
                break;
            };
            if !manager.is_running() {
                break;
            }
            self.sweep(&manager).await;

            // A sweep over an empty catalogue has no suspension point
            tokio::task::yield_now().await;
        }
        debug!("exchange currency pair syncer worker shutting down");
    }

    /// One pass over every exchange, asset and enabled pair.
    async fn sweep(&self, manager: &Arc<SyncManager>) {
        let exchanges = match manager.exchange_manager().exchanges() {
            Ok(exchanges) => exchanges,
            Err(err) => {
                error!("sync manager cannot get exchanges: {err}");
                return;
            }
        };

        for exchange in exchanges {
            if !manager.is_running() {
                return;
            }

            let exchange_name = exchange.name().to_string();
            let supports_rest = exchange.supports_rest();
            let supports_batching = exchange.supports_rest_ticker_batch_updates();

            let using_websocket = exchange.supports_websocket()
                && exchange.is_websocket_enabled()
                && match exchange.websocket() {
                    Ok(websocket) => websocket.is_connected(),
                    Err(err) => {
                        error!("{exchange_name} unable to get websocket handle: {err}");
                        false
                    }
                };
            let using_rest = !using_websocket && supports_rest;
            if !using_websocket && !using_rest {
                warn!("{exchange_name} has no usable transport, skipping");
                continue;
            }

            let mut switched_to_rest = false;

            for asset in exchange.asset_types(true) {
                let ws_asset_supported = exchange.is_asset_websocket_supported(asset);
                let pairs = match exchange.enabled_pairs(asset) {
                    Ok(pairs) => pairs,
                    Err(err) => {
                        error!("{exchange_name} failed to get enabled pairs: {err}");
                        continue;
                    }
                };

                for pair in pairs {
                    if !manager.is_running() {
                        return;
                    }

                    let agent = match manager.registry().get(&exchange_name, &pair, asset) {
                        Ok(agent) => agent,
                        Err(_) => {
                            let transport = if using_websocket && ws_asset_supported {
                                Transport::Websocket
                            } else {
                                Transport::Rest
                            };
                            manager
                                .registry()
                                .add(&exchange_name, pair.clone(), asset, transport)
                        }
                    };

                    if switched_to_rest && using_websocket {
                        warn!(
                            "{exchange_name} {}: websocket re-enabled, \
                             switching from rest to websocket",
                            manager.format_currency(&pair),
                        );
                        switched_to_rest = false;
                    }

                    if self.config.synchronize_orderbook() {
                        self.sync_orderbook(
                            manager,
                            exchange.as_ref(),
                            &agent,
                            supports_rest,
                            &mut switched_to_rest,
                        )
                        .await;
                    }
                    if self.config.synchronize_ticker() {
                        self.sync_ticker(
                            manager,
                            exchange.as_ref(),
                            &agent,
                            supports_rest,
                            supports_batching,
                            &mut switched_to_rest,
                        )
                        .await;
                    }
                    if self.config.synchronize_trades() {
                        self.sync_trade(manager, &agent).await;
                    }
                }
            }
        }
    }

    async fn sync_orderbook(
        &self,
        manager: &Arc<SyncManager>,
        exchange: &dyn Exchange,
        agent: &SyncAgent,
        supports_rest: bool,
        switched_to_rest: &mut bool,
    ) {
        let decision = manager.registry().try_begin(
            agent.exchange(),
            agent.pair(),
            agent.asset(),
            SyncItem::Orderbook,
            supports_rest,
        );
        match decision {
            Some(StreamDecision::Fresh) | Some(StreamDecision::HoldWebsocket) => {
                time::sleep(IDLE_BACKOFF).await;
            }
            Some(StreamDecision::Demote) => {
                self.warn_demoted(manager, agent, SyncItem::Orderbook);
                *switched_to_rest = true;
                self.fetch_orderbook(manager, exchange, agent).await;
            }
            Some(StreamDecision::Fetch) => self.fetch_orderbook(manager, exchange, agent).await,
            Some(StreamDecision::InFlight) | None => {}
        }
    }

    async fn fetch_orderbook(
        &self,
        manager: &Arc<SyncManager>,
        exchange: &dyn Exchange,
        agent: &SyncAgent,
    ) {
        let result = exchange.update_orderbook(agent.pair(), agent.asset()).await;

        manager.print_orderbook_summary(&result, Transport::Rest.label());
        if let Ok(book) = &result {
            self.relay_event(manager, book, "orderbook_update", agent);
        }
        self.report(manager, agent, SyncItem::Orderbook, result.err());
    }

    async fn sync_ticker(
        &self,
        manager: &Arc<SyncManager>,
        exchange: &dyn Exchange,
        agent: &SyncAgent,
        supports_rest: bool,
        supports_batching: bool,
        switched_to_rest: &mut bool,
    ) {
        let decision = manager.registry().try_begin(
            agent.exchange(),
            agent.pair(),
            agent.asset(),
            SyncItem::Ticker,
            supports_rest,
        );
        match decision {
            Some(StreamDecision::Fresh) | Some(StreamDecision::HoldWebsocket) => {
                time::sleep(IDLE_BACKOFF).await;
            }
            Some(StreamDecision::Demote) => {
                self.warn_demoted(manager, agent, SyncItem::Ticker);
                *switched_to_rest = true;
                self.fetch_ticker_rest(manager, exchange, agent, supports_batching)
                    .await;
            }
            Some(StreamDecision::Fetch) => {
                self.fetch_ticker_rest(manager, exchange, agent, supports_batching)
                    .await;
            }
            Some(StreamDecision::InFlight) | None => {}
        }
    }

    async fn fetch_ticker_rest(
        &self,
        manager: &Arc<SyncManager>,
        exchange: &dyn Exchange,
        agent: &SyncAgent,
        supports_batching: bool,
    ) {
        let exchange_name = agent.exchange();

        let result = if supports_batching {
            if manager
                .registry()
                .try_claim_ticker_batch(exchange_name, self.config.timeout_rest())
            {
                if self.config.verbose() {
                    debug!("initialising {exchange_name} REST ticker batching");
                }
                match exchange.update_tickers(agent.asset()).await {
                    Ok(()) => exchange.fetch_ticker(agent.pair(), agent.asset()).await,
                    Err(err) => Err(err),
                }
            } else {
                if self.config.verbose() {
                    debug!("{exchange_name} using recent ticker batch cache");
                }
                exchange.fetch_ticker(agent.pair(), agent.asset()).await
            }
        } else {
            exchange.update_ticker(agent.pair(), agent.asset()).await
        };

        manager.print_ticker_summary(&result, Transport::Rest.label());
        if let Ok(ticker) = &result {
            self.relay_event(manager, ticker, "ticker_update", agent);
        }
        self.report(manager, agent, SyncItem::Ticker, result.err());
    }

    /// Trade fetching happens elsewhere; the core only arms the cadence by
    /// reporting an empty outcome whenever the stream comes due.
    async fn sync_trade(&self, manager: &Arc<SyncManager>, agent: &SyncAgent) {
        let decision = manager.registry().try_begin(
            agent.exchange(),
            agent.pair(),
            agent.asset(),
            SyncItem::Trade,
            true,
        );
        match decision {
            Some(StreamDecision::Fresh) => time::sleep(IDLE_BACKOFF).await,
            Some(StreamDecision::Fetch) => self.report(manager, agent, SyncItem::Trade, None),
            _ => {}
        }
    }

    fn warn_demoted(&self, manager: &Arc<SyncManager>, agent: &SyncAgent, item: SyncItem) {
        warn!(
            "{} {} {}: no {item} update after {:?}, switching from websocket to rest",
            agent.exchange(),
            manager.format_currency(agent.pair()),
            agent.asset().as_str().to_uppercase(),
            self.config.timeout_websocket(),
        );
    }

    fn report(
        &self,
        manager: &Arc<SyncManager>,
        agent: &SyncAgent,
        item: SyncItem,
        error: Option<ExchangeError>,
    ) {
        if let Err(update_err) = manager.update(
            agent.exchange(),
            agent.pair(),
            agent.asset(),
            item,
            error.as_ref(),
        ) {
            error!("{update_err}");
        }
    }

    fn relay_event<T: Serialize>(
        &self,
        manager: &Arc<SyncManager>,
        payload: &T,
        event: &str,
        agent: &SyncAgent,
    ) {
        let Some(relay) = manager.relay() else {
            return;
        };

        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(err) => {
                error!("failed to encode {event} relay payload: {err}");
                return;
            }
        };

        let websocket_event = WebsocketEvent {
            data,
            event: event.to_string(),
            asset_type: agent.asset(),
            exchange: agent.exchange().to_string(),
        };
        match relay.broadcast(websocket_event) {
            Ok(()) | Err(RelayError::ServiceNotRunning) => {}
            Err(err) => error!("failed to broadcast websocket event {event}: {err}"),
        }
    }
}
