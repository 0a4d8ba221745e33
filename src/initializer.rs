//! Per-server factories and the server lifecycle (§4.4).
//!
//! The teacher has no direct analogue — its `Listener` only ever drives one
//! fixed HTTP pipeline. This module generalizes the teacher's
//! `ListenerConfig` (`listener.rs`) from "one static TLS config" into "one
//! factory per registered server," keyed the same way the item registry
//! keys connections: a `Slab` plus an index from the externally-meaningful
//! id.

use std::collections::HashMap;

use mio::net::TcpStream;
use slab::Slab;

use crate::{handler::Handler, id::ItemId};

/// Identifies a registered server across the worker's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub usize);

/// A per-server factory: produces a [`Handler`] for each socket the acceptor
/// hands to this server, and is notified of shutdown.
pub trait ServerInitializer: Send {
    /// Builds a handler for a newly accepted socket. Returning `None` means
    /// the server declines the connection; the worker replies with
    /// `ConnectionRefused`.
    fn on_connect(&mut self, item_id: ItemId, socket: &TcpStream) -> Option<Box<dyn Handler>>;

    /// Invoked once, when the server is unregistered or the worker shuts
    /// down.
    fn on_shutdown(&mut self) {}
}

struct Entry {
    server_id: ServerId,
    initializer: Box<dyn ServerInitializer>,
}

/// Registry of active per-server initializers (§4.4).
#[derive(Default)]
pub struct InitializerRegistry {
    entries: Slab<Entry>,
    index: HashMap<ServerId, usize>,
}

impl InitializerRegistry {
    pub fn new() -> Self {
        Self {
            entries: Slab::new(),
            index: HashMap::new(),
        }
    }

    pub fn is_registered(&self, server_id: ServerId) -> bool {
        self.index.contains_key(&server_id)
    }

    /// `RegisterServer(server)`: idempotent — re-registering a server that is
    /// already present is a no-op that still reports success, per §4.4.
    pub fn register(&mut self, server_id: ServerId, initializer: Box<dyn ServerInitializer>) {
        if self.index.contains_key(&server_id) {
            log::warn!("server {:?} already registered, ignoring", server_id);
            return;
        }
        let key = self.entries.insert(Entry {
            server_id,
            initializer,
        });
        self.index.insert(server_id, key);
    }

    /// `UnregisterServer(server)`: removes the initializer and invokes its
    /// shutdown hook. Closing the server's active connections is the caller's
    /// responsibility (the worker does it before calling this, since this
    /// registry has no view of connections).
    pub fn unregister(&mut self, server_id: ServerId) {
        if let Some(key) = self.index.remove(&server_id) {
            let mut entry = self.entries.remove(key);
            entry.initializer.on_shutdown();
        }
    }

    /// Looks up the initializer for `server_id` and asks it to build a
    /// handler for a freshly accepted socket.
    pub fn new_connection(
        &mut self,
        server_id: ServerId,
        item_id: ItemId,
        socket: &TcpStream,
    ) -> Option<Box<dyn Handler>> {
        let key = *self.index.get(&server_id)?;
        self.entries[key].initializer.on_connect(item_id, socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::Connection, error::DisconnectCause};

    struct CountingInitializer {
        accepts: usize,
        shutdowns: usize,
    }

    struct NoopHandler(ItemId);
    impl Handler for NoopHandler {
        fn item_id(&self) -> ItemId {
            self.0
        }
        fn on_bytes(&mut self, _conn: &mut Connection, _data: &[u8]) {}
        fn on_disconnected(&mut self, _cause: &DisconnectCause) {}
    }

    impl ServerInitializer for CountingInitializer {
        fn on_connect(&mut self, item_id: ItemId, _socket: &TcpStream) -> Option<Box<dyn Handler>> {
            self.accepts += 1;
            Some(Box::new(NoopHandler(item_id)))
        }
        fn on_shutdown(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn loopback_pair() -> TcpStream {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        TcpStream::from_std(server)
    }

    #[test]
    fn register_then_new_connection_builds_handler() {
        let mut reg = InitializerRegistry::new();
        reg.register(
            ServerId(1),
            Box::new(CountingInitializer {
                accepts: 0,
                shutdowns: 0,
            }),
        );
        let socket = loopback_pair();
        let handler = reg.new_connection(ServerId(1), ItemId(0), &socket);
        assert!(handler.is_some());
    }

    #[test]
    fn new_connection_on_unregistered_server_returns_none() {
        let mut reg = InitializerRegistry::new();
        let socket = loopback_pair();
        assert!(reg.new_connection(ServerId(7), ItemId(0), &socket).is_none());
    }

    #[test]
    fn reregistering_same_server_is_a_noop() {
        let mut reg = InitializerRegistry::new();
        reg.register(
            ServerId(1),
            Box::new(CountingInitializer {
                accepts: 0,
                shutdowns: 0,
            }),
        );
        reg.register(
            ServerId(1),
            Box::new(CountingInitializer {
                accepts: 0,
                shutdowns: 0,
            }),
        );
        assert!(reg.is_registered(ServerId(1)));
    }

    #[test]
    fn unregister_invokes_shutdown_and_removes_entry() {
        let mut reg = InitializerRegistry::new();
        reg.register(
            ServerId(1),
            Box::new(CountingInitializer {
                accepts: 0,
                shutdowns: 0,
            }),
        );
        reg.unregister(ServerId(1));
        assert!(!reg.is_registered(ServerId(1)));
    }
}
