use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::market::{Asset, Pair};

use super::{
    arbiter::{self, StreamDecision},
    config::RegistryConfig,
    error::{Result, SyncError},
    state::InitSyncBarrier,
};

/// One of the three market-data streams tracked per sync agent.
///
/// The discriminants form the stable wire values `Ticker=0, Orderbook=1,
/// Trade=2`; anything else fails conversion with
/// [`SyncError::UnknownSyncItem`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SyncItem {
    Ticker = 0,
    Orderbook = 1,
    Trade = 2,
}

impl SyncItem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticker => "ticker",
            Self::Orderbook => "orderbook",
            Self::Trade => "trade",
        }
    }
}

impl fmt::Display for SyncItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<SyncItem> for u8 {
    fn from(value: SyncItem) -> Self {
        value as u8
    }
}

impl TryFrom<u8> for SyncItem {
    type Error = SyncError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Ticker),
            1 => Ok(Self::Orderbook),
            2 => Ok(Self::Trade),
            unknown => Err(SyncError::UnknownSyncItem(unknown)),
        }
    }
}

/// Transport currently driving updates for one stream. `Disabled` marks
/// streams whose `synchronize_*` flag is off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Transport {
    #[default]
    Disabled,
    Rest,
    Websocket,
}

impl Transport {
    pub fn is_rest(&self) -> bool {
        matches!(self, Self::Rest)
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::Websocket)
    }

    /// Protocol label used in log output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Rest => "REST",
            Self::Websocket => "Websocket",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Per-stream sync state within an agent.
#[derive(Clone, Debug, Default)]
pub struct SyncBase {
    transport: Transport,
    is_processing: bool,
    have_data: bool,
    last_updated: Option<DateTime<Utc>>,
    num_errors: u64,
}

impl SyncBase {
    pub(super) fn with_transport(transport: Transport) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Returns `true` once this stream has produced its first datum
    /// (successful or failed). Monotone.
    pub fn have_data(&self) -> bool {
        self.have_data
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn num_errors(&self) -> u64 {
        self.num_errors
    }

    pub(super) fn set_processing(&mut self, processing: bool) {
        self.is_processing = processing;
    }

    pub(super) fn set_last_updated(&mut self, stamp: DateTime<Utc>) {
        self.last_updated = Some(stamp);
    }
}

/// Scheduling record for one (exchange, asset class, currency pair).
#[derive(Clone, Debug)]
pub struct SyncAgent {
    exchange: String,
    pair: Pair,
    asset: Asset,
    created: DateTime<Utc>,
    ticker: SyncBase,
    orderbook: SyncBase,
    trade: SyncBase,
}

impl SyncAgent {
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn asset(&self) -> Asset {
        self.asset
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn ticker(&self) -> &SyncBase {
        &self.ticker
    }

    pub fn orderbook(&self) -> &SyncBase {
        &self.orderbook
    }

    pub fn trade(&self) -> &SyncBase {
        &self.trade
    }

    pub fn stream(&self, item: SyncItem) -> &SyncBase {
        match item {
            SyncItem::Ticker => &self.ticker,
            SyncItem::Orderbook => &self.orderbook,
            SyncItem::Trade => &self.trade,
        }
    }

    fn stream_mut(&mut self, item: SyncItem) -> &mut SyncBase {
        match item {
            SyncItem::Ticker => &mut self.ticker,
            SyncItem::Orderbook => &mut self.orderbook,
            SyncItem::Trade => &mut self.trade,
        }
    }

    fn matches(&self, exchange: &str, pair: &Pair, asset: Asset) -> bool {
        self.exchange == exchange && self.pair == *pair && self.asset == asset
    }
}

/// Initial-sync progress counters: units armed on the barrier while it was
/// open, and units that have since produced their first datum.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub created: u64,
    pub completed: u64,
}

#[derive(Default)]
struct RegistryInner {
    agents: Vec<SyncAgent>,
    ticker_batch_last: HashMap<String, DateTime<Utc>>,
    counts: SyncCounts,
}

/// The authoritative collection of sync agents. One mutex serialises the
/// agent list, per-stream flags, counters and the batch-time map; it is
/// never held across an external call.
pub(super) struct AgentRegistry {
    config: RegistryConfig,
    barrier: Arc<InitSyncBarrier>,
    inner: Mutex<RegistryInner>,
}

impl AgentRegistry {
    pub fn new(config: RegistryConfig, barrier: Arc<InitSyncBarrier>) -> Self {
        Self {
            config,
            barrier,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner
            .lock()
            .expect("`AgentRegistry` mutex can't be poisoned")
    }

    pub fn exists(&self, exchange: &str, pair: &Pair, asset: Asset) -> bool {
        self.lock_inner()
            .agents
            .iter()
            .any(|agent| agent.matches(exchange, pair, asset))
    }

    /// Returns a snapshot of one agent.
    pub fn get(&self, exchange: &str, pair: &Pair, asset: Asset) -> Result<SyncAgent> {
        self.lock_inner()
            .agents
            .iter()
            .find(|agent| agent.matches(exchange, pair, asset))
            .cloned()
            .ok_or_else(|| SyncError::PairNotFound {
                exchange: exchange.to_string(),
                asset,
                pair: pair.clone(),
            })
    }

    /// Inserts a new agent with `transport` on every enabled stream, arming
    /// the barrier once per enabled stream while it remains open. Returns a
    /// snapshot of the stored agent; an already-registered key is returned
    /// as-is, keeping the collection free of duplicates.
    pub fn add(&self, exchange: &str, pair: Pair, asset: Asset, transport: Transport) -> SyncAgent {
        let mut inner = self.lock_inner();

        if let Some(existing) = inner
            .agents
            .iter()
            .find(|agent| agent.matches(exchange, &pair, asset))
        {
            return existing.clone();
        }

        let mut agent = SyncAgent {
            exchange: exchange.to_string(),
            pair,
            asset,
            created: Utc::now(),
            ticker: SyncBase::default(),
            orderbook: SyncBase::default(),
            trade: SyncBase::default(),
        };

        let enabled = [
            (SyncItem::Ticker, self.config.synchronize_ticker()),
            (SyncItem::Orderbook, self.config.synchronize_orderbook()),
            (SyncItem::Trade, self.config.synchronize_trades()),
        ];
        for (item, item_enabled) in enabled {
            if !item_enabled {
                continue;
            }
            *agent.stream_mut(item) = SyncBase::with_transport(transport);
            if self.config.verbose() {
                debug!(
                    "{}: added {item} sync item {}: using {transport}",
                    agent.exchange,
                    self.config.pair_format().format(&agent.pair),
                );
            }
            if self.barrier.arm(1) {
                inner.counts.created += 1;
            }
        }

        let snapshot = agent.clone();
        inner.agents.push(agent);
        snapshot
    }

    pub fn is_processing(&self, exchange: &str, pair: &Pair, asset: Asset, item: SyncItem) -> bool {
        self.lock_inner()
            .agents
            .iter()
            .find(|agent| agent.matches(exchange, pair, asset))
            .map(|agent| agent.stream(item).is_processing())
            .unwrap_or(false)
    }

    pub fn set_processing(
        &self,
        exchange: &str,
        pair: &Pair,
        asset: Asset,
        item: SyncItem,
        processing: bool,
    ) {
        let mut inner = self.lock_inner();
        if let Some(agent) = inner
            .agents
            .iter_mut()
            .find(|agent| agent.matches(exchange, pair, asset))
        {
            agent.stream_mut(item).set_processing(processing);
        }
    }

    /// Runs the protocol arbiter for one stream and, in one critical
    /// section, claims the in-flight flag (and applies any websocket→REST
    /// demotion) when the decision is to fetch. Of the workers racing over
    /// the same stream only one observes [`StreamDecision::Fetch`] or
    /// [`StreamDecision::Demote`]; the rest see
    /// [`StreamDecision::InFlight`]. Unknown agents yield `None`.
    pub fn try_begin(
        &self,
        exchange: &str,
        pair: &Pair,
        asset: Asset,
        item: SyncItem,
        supports_rest: bool,
    ) -> Option<StreamDecision> {
        let mut inner = self.lock_inner();
        let agent = inner
            .agents
            .iter_mut()
            .find(|agent| agent.matches(exchange, pair, asset))?;
        let created = agent.created;
        let now = Utc::now();

        let stream = agent.stream_mut(item);
        let decision = match item {
            SyncItem::Trade => arbiter::decide_trade(stream, self.config.timeout_rest(), now),
            _ => arbiter::decide(
                stream,
                created,
                supports_rest,
                self.config.timeout_rest(),
                self.config.timeout_websocket(),
                now,
            ),
        };

        match decision {
            StreamDecision::Fetch => stream.set_processing(true),
            StreamDecision::Demote => {
                stream.transport = Transport::Rest;
                stream.set_processing(true);
            }
            StreamDecision::InFlight | StreamDecision::Fresh | StreamDecision::HoldWebsocket => {}
        }

        Some(decision)
    }

    /// Atomic finalisation of one fetch: stamps `last_updated`, counts the
    /// error, forces `have_data`, clears the in-flight flag, and on the
    /// first datum releases one barrier unit and advances the completion
    /// counter.
    pub fn update(
        &self,
        exchange: &str,
        pair: &Pair,
        asset: Asset,
        item: SyncItem,
        had_error: bool,
    ) -> Result<()> {
        let mut inner = self.lock_inner();
        let Some(agent) = inner
            .agents
            .iter_mut()
            .find(|agent| agent.matches(exchange, pair, asset))
        else {
            return Err(SyncError::CouldNotSyncNewData {
                exchange: exchange.to_string(),
                pair: pair.clone(),
                asset,
            });
        };

        let stream = agent.stream_mut(item);
        let first_data = !stream.have_data;
        stream.set_last_updated(Utc::now());
        if had_error {
            stream.num_errors += 1;
        }
        stream.have_data = true;
        stream.set_processing(false);

        if first_data && self.barrier.done() {
            inner.counts.completed += 1;
            debug!(
                "{exchange} {item} sync complete {} [{}/{}]",
                self.config.pair_format().format(pair),
                inner.counts.completed,
                inner.counts.created,
            );
        }

        Ok(())
    }

    /// Claims the right to issue one batched ticker request for `exchange`.
    /// Claims are serialised on the registry lock and stamped up front, so
    /// consecutive batches are spaced by at least `timeout` while the
    /// network call itself runs outside the lock.
    pub fn try_claim_ticker_batch(&self, exchange: &str, timeout: Duration) -> bool {
        let mut inner = self.lock_inner();
        let now = Utc::now();

        let due = match inner.ticker_batch_last.get(exchange) {
            None => true,
            Some(last) => arbiter::elapsed_since(now, *last) > timeout,
        };
        if due {
            inner.ticker_batch_last.insert(exchange.to_string(), now);
        }
        due
    }

    pub fn counts(&self) -> SyncCounts {
        self.lock_inner().counts
    }
}
