use std::time::Duration;

use chrono::{DateTime, Utc};

use super::registry::{SyncBase, Transport};

/// Outcome of one stream inspection during a worker sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum StreamDecision {
    /// Another worker owns an in-flight fetch for this stream.
    InFlight,
    /// The stream is within its freshness bound.
    Fresh,
    /// The stream is due on websocket but still inside the grace period, or
    /// the exchange offers no REST fallback.
    HoldWebsocket,
    /// The websocket stream went stale past its grace period; the transport
    /// flips to REST and a fetch follows.
    Demote,
    /// A REST fetch is due.
    Fetch,
}

/// Decides what to do with one ticker or order book stream.
///
/// A stream is due when it has never reported, or when the time since its
/// last report exceeds the timeout of its current transport. Due websocket
/// streams get a grace period of one full websocket timeout from agent
/// creation before demotion is considered.
pub(super) fn decide(
    stream: &SyncBase,
    created: DateTime<Utc>,
    supports_rest: bool,
    timeout_rest: Duration,
    timeout_websocket: Duration,
    now: DateTime<Utc>,
) -> StreamDecision {
    if stream.is_processing() {
        return StreamDecision::InFlight;
    }

    let due = match stream.last_updated() {
        None => true,
        Some(last) => {
            let elapsed = elapsed_since(now, last);
            match stream.transport() {
                Transport::Rest => elapsed > timeout_rest,
                Transport::Websocket => elapsed > timeout_websocket,
                Transport::Disabled => false,
            }
        }
    };
    if !due {
        return StreamDecision::Fresh;
    }

    match stream.transport() {
        Transport::Websocket => {
            if elapsed_since(now, created) < timeout_websocket {
                StreamDecision::HoldWebsocket
            } else if supports_rest {
                StreamDecision::Demote
            } else {
                StreamDecision::HoldWebsocket
            }
        }
        Transport::Rest => StreamDecision::Fetch,
        Transport::Disabled => StreamDecision::Fresh,
    }
}

/// Decides what to do with a trade stream: due when it has never reported or
/// the REST timeout elapsed, regardless of transport.
pub(super) fn decide_trade(
    stream: &SyncBase,
    timeout_rest: Duration,
    now: DateTime<Utc>,
) -> StreamDecision {
    if stream.is_processing() {
        return StreamDecision::InFlight;
    }

    let due = match stream.last_updated() {
        None => true,
        Some(last) => elapsed_since(now, last) > timeout_rest,
    };
    if due {
        StreamDecision::Fetch
    } else {
        StreamDecision::Fresh
    }
}

/// Wall-clock time elapsed between two stamps, clamped at zero.
pub(super) fn elapsed_since(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
