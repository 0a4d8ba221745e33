//! The `Handler` abstraction and the capability probes that replace the
//! source material's mixin traits (§9: "Capability mixins" design note).
//!
//! Rather than a `WatchedHandler`/`ManualUnbindHandler`/`IdleCheck` trait per
//! capability, every `Handler` exposes the capability probes directly; a
//! handler that doesn't care about a capability simply keeps the default.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{buffer::IoBuffer, connection::Connection, error::DisconnectCause, id::ItemId};

/// Liveness token exposed by a `WatchedHandler`. The worker treats token death
/// as a request to close the connection with `DisconnectCause::Disconnect`
/// (§4.9); there is no OS-level readiness event for "my owner died", so this
/// is probed during the idle sweep rather than pushed.
pub trait LivenessToken: Send + Sync {
    fn is_alive(&self) -> bool;
}

/// An `AtomicBool`-backed liveness token suitable for most compositions: the
/// owner flips it to `false` (or drops the last clone) when it goes away.
#[derive(Debug, Clone, Default)]
pub struct AtomicLivenessToken(Arc<AtomicBool>);

impl AtomicLivenessToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Marks the owner as gone. Idempotent.
    pub fn kill(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LivenessToken for AtomicLivenessToken {
    fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Anything a [`Worker`](crate::worker::Worker) can bind by id: a connection
/// handler, or any other stateful item sharing the worker's thread.
///
/// Every method has a default no-op so a handler implements only what it
/// needs; this mirrors how few of the teacher's `Connection` trait methods
/// any one variant actually had interesting bodies for.
pub trait Handler: Send {
    /// The item id this handler was bound with. Used by the registry to
    /// enforce the single-bind/single-unbind lifecycle (§3) and by
    /// `SwapHandler` to confirm the new handler preserves the old id (§4.6).
    fn item_id(&self) -> ItemId;

    /// Invoked exactly once, the moment this handler becomes the bound item
    /// for its id: after `Bind`/`NewConnection` binds it for the first time,
    /// or after `SwapHandler` installs it in place of a prior handler (§3's
    /// `bindHook`, §8's bind/unbind round-trip law).
    fn on_bind(&mut self) {}

    /// Invoked exactly once, the moment this handler stops being the bound
    /// item for its id: on `UnbindItem`, on disconnect-table unbind, or on
    /// the old handler's side of a `SwapHandler` (§3's `unbindHook`).
    fn on_unbind(&mut self) {}

    /// Invoked once a connection has fully established (after accept, or
    /// after a client connect completes).
    fn on_connected(&mut self, _conn: &mut Connection) {}

    /// Invoked with a bounded view of freshly read bytes. The view is valid
    /// only for the duration of the call; the handler must not retain it.
    fn on_bytes(&mut self, conn: &mut Connection, data: &[u8]);

    /// Invoked exactly once when the connection is unregistered, with the
    /// cause that triggered the close.
    fn on_disconnected(&mut self, _cause: &DisconnectCause) {}

    /// Invoked when the connection's key is writable and outbound bytes may
    /// be queued. `out` is the worker's shared output buffer, reset after
    /// the call flushes whatever bytes were written into it.
    fn on_writable(&mut self, _out: &mut IoBuffer) {}

    /// Invoked on every idle sweep, regardless of socket activity, if this
    /// handler opts in via [`Handler::has_idle_check`].
    fn on_idle_check(&mut self, _period: Duration) {}

    /// Invoked when the owning server (or the worker) requests a graceful
    /// shutdown; the handler decides when, if ever, to actually close.
    fn shutdown_request(&mut self) {}

    /// Message delivery entry point for `WorkerCommand::Message` (§4.7).
    /// Returns the payload back on rejection so the worker can report
    /// `MessageDeliveryFailed` with the original payload intact.
    fn on_message(
        &mut self,
        payload: Box<dyn std::any::Any + Send>,
    ) -> Result<(), Box<dyn std::any::Any + Send>> {
        Err(payload)
    }

    /// Whether `on_idle_check` should be invoked during idle sweeps.
    fn has_idle_check(&self) -> bool {
        false
    }

    /// On an error-class disconnect (`DisconnectCause::is_disconnect_error`),
    /// whether this item should remain bound for reconnection rather than
    /// being unbound per the table in §4.8.
    fn wants_manual_unbind(&self) -> bool {
        false
    }

    /// A liveness token this handler is watched by (§4.9), if any.
    fn watched_token(&self) -> Option<Arc<dyn LivenessToken>> {
        None
    }

    /// Whether this handler may be used to initiate a client connection via
    /// `WorkerCommand::Connect` (§4.5). A handler bound only to receive
    /// server-accepted connections should leave this `false`.
    fn is_client_capable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_liveness_token_starts_alive_and_can_be_killed() {
        let token = AtomicLivenessToken::new();
        assert!(token.is_alive());
        let clone = token.clone();
        clone.kill();
        assert!(!token.is_alive());
    }
}
