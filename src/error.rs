//! Crate-level error types.
//!
//! The teacher's `parser::raw_request::Error` hand-rolled `Display` and
//! `std::error::Error`; everywhere in this crate that the source material did
//! that, we reach for `thiserror` instead.

use std::io;

use crate::id::ItemId;

/// The reason a connection was unregistered and its handler's
/// `on_disconnected` was invoked.
#[derive(Debug, thiserror::Error)]
pub enum DisconnectCause {
    /// The handler or an external caller explicitly requested closure.
    #[error("connection disconnected by request")]
    Disconnect,
    /// The remote end closed the connection (read returned EOF).
    #[error("connection closed by peer")]
    Closed,
    /// The connection's idle sweep found it past `max_idle_time`.
    #[error("connection timed out")]
    TimedOut,
    /// The owning server was unregistered and its connections torn down.
    #[error("connection terminated by server shutdown")]
    Terminated,
    /// A handler panicked or otherwise failed in a way the loop could not
    /// classify more precisely.
    #[error("connection closed for an unhandled reason")]
    Unhandled,
    /// A client-initiated connect failed to complete.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] io::Error),
    /// A read or write, or a handler invocation, failed with an I/O error.
    #[error("connection error: {0}")]
    Error(#[source] io::Error),
}

impl DisconnectCause {
    /// The subset of causes that carry an error payload
    /// (`ConnectFailed`, `Error`), per §3 of the spec this crate implements.
    pub fn is_disconnect_error(&self) -> bool {
        matches!(self, Self::ConnectFailed(_) | Self::Error(_))
    }
}

/// Errors surfaced by the worker's public operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// `bind` was called with an id that is already bound.
    #[error("item {0:?} is already bound")]
    DoubleBind(ItemId),
    /// `unbind`/`replace` referenced an id with no bound item.
    #[error("no item bound with id {0:?}")]
    UnknownItem(ItemId),
    /// `Connect` was sent to an item lacking client-handler capability.
    #[error("item {0:?} cannot initiate client connections")]
    NotClientCapable(ItemId),
    /// Registering with the OS selector failed.
    #[error("selector registration failed: {0}")]
    Selector(#[source] io::Error),
    /// A server identity referenced by a command is not registered.
    #[error("server is not registered")]
    UnknownServer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_error_variants_are_classified() {
        assert!(
            DisconnectCause::Error(io::Error::new(io::ErrorKind::Other, "x")).is_disconnect_error()
        );
        assert!(DisconnectCause::ConnectFailed(io::Error::new(io::ErrorKind::Other, "x"))
            .is_disconnect_error());
        assert!(!DisconnectCause::Closed.is_disconnect_error());
        assert!(!DisconnectCause::TimedOut.is_disconnect_error());
        assert!(!DisconnectCause::Terminated.is_disconnect_error());
        assert!(!DisconnectCause::Disconnect.is_disconnect_error());
        assert!(!DisconnectCause::Unhandled.is_disconnect_error());
    }
}
