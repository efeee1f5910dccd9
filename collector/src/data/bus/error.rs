//! Event bus error types

use thiserror::Error;

/// Errors raised by the bus adapter.
///
/// `Connect` and `Subscribe` happen at startup and are fatal; `Signal` and
/// `Decode` arrive on the error channel while running and are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Could not connect to the system bus: {0}")]
    Connect(String),

    #[error("Could not subscribe to the bus: {0}")]
    Subscribe(String),

    #[error("Bus signal error: {0}")]
    Signal(String),

    #[error("Malformed bus signal: {0}")]
    Decode(String),

    #[error("Bus subscriber registered before subscribe()")]
    NotSubscribed,
}
