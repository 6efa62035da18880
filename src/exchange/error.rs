use thiserror::Error;

/// Errors surfaced by the exchange connectivity layer.
///
/// The sync core absorbs these at the worker boundary: they are logged and
/// counted, never re-raised. [`NotYetImplemented`](Self::NotYetImplemented)
/// is distinguished so summary printing can downgrade it to a warning.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExchangeError {
    #[error("functionality not yet implemented")]
    NotYetImplemented,

    #[error("exchange manager is not started")]
    ManagerNotStarted,

    #[error("websocket unavailable: {0}")]
    WebsocketUnavailable(String),

    #[error("request failed: {0}")]
    Request(String),
}
