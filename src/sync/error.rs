use std::result;

use thiserror::Error;

use crate::{
    exchange::ExchangeError,
    market::{Asset, Code, Pair},
};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncError {
    #[error("no sync items enabled")]
    NoSyncItemsEnabled,

    #[error("fiat display currency is empty")]
    EmptyFiatDisplayCurrency,

    #[error("{0} is not a recognised fiat currency")]
    NotFiatDisplayCurrency(Code),

    #[error("sync manager already started")]
    AlreadyStarted,

    #[error("sync manager not started")]
    NotStarted,

    #[error("{exchange} {asset} {pair} sync agent not found")]
    PairNotFound {
        exchange: String,
        asset: Asset,
        pair: Pair,
    },

    #[error("could not sync new data for {exchange} {pair} {asset}")]
    CouldNotSyncNewData {
        exchange: String,
        pair: Pair,
        asset: Asset,
    },

    #[error("unknown sync item {0}")]
    UnknownSyncItem(u8),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

pub(crate) type Result<T> = result::Result<T, SyncError>;
