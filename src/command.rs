//! The command mailbox (§3, §6): tagged commands flowing in from external
//! callers, and the notifications the worker replies with.
//!
//! Adapted from the teacher's `Event<S>` struct and the
//! `crossbeam_channel::{Sender, Receiver}` mailbox pattern in
//! `worker.rs`/`listener.rs`: one payload enum per direction, sent across an
//! MPSC channel, with reply addresses carried inside the variant rather than
//! matched up externally.

use std::{any::Any, net::SocketAddr, time::Duration};

use mio::net::TcpStream;

use crate::{
    connection::Role,
    handler::Handler,
    id::ItemId,
    initializer::{ServerId, ServerInitializer},
};

/// A boxed message payload delivered through [`WorkerCommand::Message`] or
/// [`WorkerNotification::MessageDeliveryFailed`].
pub type Payload = Box<dyn Any + Send>;

/// Commands an external acceptor issues about newly observed sockets,
/// distinct from [`WorkerCommand`] because they originate outside the
/// worker's own item address space (§3: `IOCommand`).
///
/// Named after the accept/server-lifecycle flow §4.4 and §6 actually
/// describe (`RegisterServer`/`UnregisterServer`/`ServerShutdownRequest`/
/// accept-driven binding), not the `BindItem`/`BindAndConnect`/
/// `BindWithContext` names §3's one-line Command summary lists — see
/// DESIGN.md for why the latter is not load-bearing anywhere else in the
/// spec this crate implements.
pub enum IoCommand {
    /// A server was accepted for a registered server; `attempt` is an
    /// acceptor-assigned retry counter echoed back on refusal.
    NewConnection {
        server_id: ServerId,
        socket: TcpStream,
        attempt: u64,
    },
    /// Registers a server's initializer factory with this worker.
    RegisterServer {
        server_id: ServerId,
        initializer: Box<dyn ServerInitializer>,
    },
    /// Unregisters a server: close its connections, drop its initializer.
    UnregisterServer { server_id: ServerId },
    /// Asks every connection under a server to observe a graceful shutdown
    /// request without forcing closure.
    ServerShutdownRequest { server_id: ServerId },
}

/// Commands addressed to an item already bound on this worker (§3:
/// `WorkerCommand`).
pub enum WorkerCommand {
    /// Binds an already-constructed item under its own id.
    Bind { item_id: ItemId, handler: Box<dyn Handler> },
    /// Opens a nonblocking client connection and binds `item_id` as its
    /// handler once `Connecting` completes.
    Connect { item_id: ItemId, addr: SocketAddr },
    /// Unbinds an item outright (no associated connection teardown beyond
    /// what the item itself does on drop).
    UnbindItem { item_id: ItemId },
    /// Forwarded verbatim to the external scheduler (§4.7); the worker never
    /// interprets `delay` itself.
    Schedule {
        item_id: ItemId,
        delay: Duration,
        payload: Payload,
    },
    /// Delivers `payload` to the bound item via `Handler::on_message`.
    Message { item_id: ItemId, payload: Payload },
    /// Requests a graceful close of the connection bound to `item_id`.
    Disconnect { item_id: ItemId },
    /// Forces immediate closure with a caller-supplied error.
    Kill {
        item_id: ItemId,
        error: std::io::Error,
    },
    /// Replaces the handler bound to `item_id`; the new handler must report
    /// the same id (§4.6).
    SwapHandler { handler: Box<dyn Handler> },
    /// Requests a `ConnectionSummary` notification reply (§4.10, §6).
    RequestSummary,
}

/// A point-in-time view of one active connection, reported in
/// [`WorkerNotification::ConnectionSummary`] (§4.10).
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub item_id: ItemId,
    pub role: Role,
    pub address: Option<SocketAddr>,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub age: Duration,
    pub idle_time: Duration,
}

/// Outbound notifications the worker emits to external callers (§6).
pub enum WorkerNotification {
    /// Sent once at startup.
    WorkerReady(crate::id::WorkerId),
    ServerRegistered { server_id: ServerId },
    RegistrationFailed { server_id: ServerId },
    IdleCheckExecuted,
    ConnectionSummary(Vec<ConnectionSnapshot>),
    /// An accepted socket could not be admitted (unregistered server, or the
    /// initializer declined it); the socket is returned so the acceptor may
    /// retry elsewhere.
    ConnectionRefused { socket: TcpStream, attempt: u64 },
    MessageDeliveryFailed { item_id: ItemId, payload: Payload },
}
