//! Per-socket I/O state machine (§4.2).
//!
//! Adapted from the teacher's `PlainConnection` (`connection.rs` in the
//! source material): the interest-op computation, the register/reregister/
//! deregister calls against a `mio::Registry`, and the read-until-WouldBlock
//! loop all carry over directly. The HTTP/TLS branch is gone (out of scope);
//! a `Connecting` state and byte counters were added that the teacher's
//! always-already-accepted connection never needed.
//!
//! Buffer ownership note: a Connection is described as owning its read/write
//! buffers, while the read buffer and the output buffer are each described as
//! owned by one Worker and reused across connections. This crate resolves the
//! tension the same way for both buffers: the Worker owns one scratch
//! [`IoBuffer`](crate::buffer::IoBuffer) per direction, handed to a
//! connection transiently for the duration of one read or one `on_writable`
//! call; what a Connection itself owns across ticks is its outbound queue
//! (`outbound`), since partial writes must survive until the next writable
//! tick and a shared scratch buffer cannot hold that state for more than one
//! connection at a time.

use std::{
    io::{self, ErrorKind, Read, Write},
    time::{Duration, Instant},
};

use mio::{net::TcpStream, Interest, Registry, Token};

use crate::{buffer::IoBuffer, error::DisconnectCause, id::ItemId, initializer::ServerId};

/// Whether a connection was accepted by a registered server, or initiated by
/// this worker on a handler's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Accepted through `NewConnection` on behalf of a registered server.
    Server,
    /// Opened by this worker via `WorkerCommand::Connect`.
    Client,
}

/// States of the connection state machine (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Client connection awaiting `OP_CONNECT` completion.
    Connecting,
    /// Normal read/write operation.
    Open,
    /// A graceful close was requested; outbound bytes remain queued and must
    /// flush before the connection proceeds to `Closed`.
    Closing,
    /// Unregistered; the socket is no longer polled.
    Closed,
}

/// A single nonblocking TCP connection and its interest-op/outbound-queue
/// bookkeeping.
#[derive(Debug)]
pub struct Connection {
    socket: TcpStream,
    token: Token,
    item_id: ItemId,
    role: Role,
    /// The server this connection was accepted for, when `role` is
    /// `Role::Server`. Used by `UnregisterServer` to find every connection
    /// owned by a given server (§4.4).
    server_id: Option<ServerId>,
    state: ConnState,
    /// Set when `begin_closing` transitions this connection to `Closing`;
    /// carried through to the eventual `unregister` once the outbound queue
    /// drains.
    closing_cause: Option<DisconnectCause>,
    /// Bytes queued for write but not yet accepted by the socket. Owned by
    /// the connection (not the worker) because partial writes must persist
    /// across ticks.
    outbound: IoBuffer,
    created_at: Instant,
    last_read: Instant,
    last_write: Instant,
    bytes_read: u64,
    bytes_written: u64,
}

impl Connection {
    /// Wraps a server-accepted socket, already in the `Open` state.
    pub fn accepted(
        token: Token,
        socket: TcpStream,
        item_id: ItemId,
        server_id: ServerId,
        output_buffer_size: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            socket,
            token,
            item_id,
            role: Role::Server,
            server_id: Some(server_id),
            state: ConnState::Open,
            closing_cause: None,
            outbound: IoBuffer::with_max_capacity(4096, Some(output_buffer_size)),
            created_at: now,
            last_read: now,
            last_write: now,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    /// Wraps a client-initiated socket in the `Connecting` state (§4.5).
    pub fn connecting(
        token: Token,
        socket: TcpStream,
        item_id: ItemId,
        output_buffer_size: usize,
    ) -> Self {
        let now = Instant::now();
        Self {
            socket,
            token,
            item_id,
            role: Role::Client,
            server_id: None,
            state: ConnState::Connecting,
            closing_cause: None,
            outbound: IoBuffer::with_max_capacity(4096, Some(output_buffer_size)),
            created_at: now,
            last_read: now,
            last_write: now,
            bytes_read: 0,
            bytes_written: 0,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn server_id(&self) -> Option<ServerId> {
        self.server_id
    }

    /// The address reported for `ConnectionSummary` (§4.10): the remote peer
    /// for a client-initiated connection, the local bind address for a
    /// server-accepted one. `None` if the socket cannot report it (e.g.
    /// already torn down at the OS level).
    pub fn address(&self) -> Option<std::net::SocketAddr> {
        match self.role {
            Role::Client => self.socket.peer_addr().ok(),
            Role::Server => self.socket.local_addr().ok(),
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnState::Closed
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// `now - lastActivity`, where `lastActivity` is the more recent of the
    /// connection's last read and last write.
    pub fn idle_time(&self, now: Instant) -> Duration {
        let last_activity = self.last_read.max(self.last_write);
        now.saturating_duration_since(last_activity)
    }

    /// Whether this connection has gone longer than `max_idle` without
    /// activity. `max_idle` of `None` means no timeout ever applies.
    pub fn is_timed_out(&self, now: Instant, max_idle: Option<Duration>) -> bool {
        match max_idle {
            Some(max) => self.idle_time(now) > max,
            None => false,
        }
    }

    fn interest(&self) -> Interest {
        match self.state {
            ConnState::Connecting => Interest::WRITABLE,
            ConnState::Open | ConnState::Closing if !self.outbound.is_empty() => {
                Interest::READABLE | Interest::WRITABLE
            }
            ConnState::Open | ConnState::Closing => Interest::READABLE,
            ConnState::Closed => Interest::READABLE,
        }
    }

    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        registry.register(&mut self.socket, self.token, self.interest())
    }

    /// Recomputes interest ops from current state and reregisters. Must be
    /// called whenever `outbound` transitions empty/non-empty, so the
    /// selector keeps tracking `OP_WRITE` only while there is something to
    /// write.
    pub fn reregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.reregister(&mut self.socket, self.token, self.interest())
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.socket)
    }

    /// Finishes a nonblocking connect (§4.5): probes `take_error` to tell a
    /// completed handshake from a failed one.
    pub fn finish_connect(&mut self) -> io::Result<()> {
        match self.socket.take_error()? {
            None => {
                self.state = ConnState::Open;
                Ok(())
            }
            Some(err) => Err(err),
        }
    }

    /// Reads as many bytes as are currently available into `scratch`,
    /// looping until `WouldBlock` or `scratch` fills. Returns the number of
    /// bytes read; `Ok(0)` with no prior reads means the remote end closed
    /// the connection (EOF).
    pub fn read_into(&mut self, scratch: &mut IoBuffer) -> io::Result<usize> {
        let mut total = 0;
        loop {
            if scratch.remaining_mut() == 0 {
                break;
            }
            match self.socket.read(&mut *scratch) {
                Ok(0) => {
                    if total == 0 {
                        return Ok(0);
                    }
                    break;
                }
                Ok(n) => {
                    scratch.mark_written(n);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if total > 0 {
            self.bytes_read += total as u64;
            self.last_read = Instant::now();
        }
        Ok(total)
    }

    /// Appends everything currently readable in `scratch` onto this
    /// connection's outbound queue, then resets `scratch` for reuse by the
    /// next connection's `on_writable` call.
    pub fn absorb_outbound(&mut self, scratch: &mut IoBuffer) -> io::Result<()> {
        if !scratch.is_empty() {
            self.outbound.write_all(scratch)?;
        }
        scratch.reset();
        Ok(())
    }

    /// Writes as much of the outbound queue to the socket as the kernel will
    /// currently accept. Partial writes are permitted; unwritten bytes
    /// remain queued.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut total = 0;
        loop {
            if self.outbound.is_empty() {
                break;
            }
            match self.socket.write(&self.outbound) {
                Ok(0) => break,
                Ok(n) => {
                    self.outbound.mark_read(n);
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if total > 0 {
            self.bytes_written += total as u64;
            self.last_write = Instant::now();
        }
        Ok(total)
    }

    pub fn has_pending_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Transitions to `Closing`: no further writes are accepted from the
    /// handler, but any already-queued outbound bytes still need to drain.
    /// `cause` is applied once the drain completes and the connection is
    /// actually unregistered.
    pub fn begin_closing(&mut self, cause: DisconnectCause) {
        if self.state == ConnState::Open {
            self.state = ConnState::Closing;
            self.closing_cause = Some(cause);
        }
    }

    /// The cause queued by `begin_closing`, if this connection is draining
    /// toward close.
    pub fn closing_cause(&self) -> Option<&DisconnectCause> {
        self.closing_cause.as_ref()
    }

    /// Takes the cause queued by `begin_closing`, leaving `None` behind.
    /// Used once the connection is about to be unregistered, since
    /// `DisconnectCause` cannot be cloned (its error variants carry an
    /// `io::Error`).
    pub fn take_closing_cause(&mut self) -> Option<DisconnectCause> {
        self.closing_cause.take()
    }

    /// Marks the connection closed. Does not touch the registry; callers
    /// deregister separately as part of the unregister sequence (§4.8).
    pub fn mark_closed(&mut self) {
        self.state = ConnState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::Poll;
    use std::net::TcpListener as StdTcpListener;

    fn connected_pair() -> (Connection, std::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let conn = Connection::accepted(
            Token(0),
            TcpStream::from_std(server),
            ItemId(0),
            crate::initializer::ServerId(0),
            4096,
        );
        (conn, client)
    }

    #[test]
    fn interest_is_read_only_when_outbound_empty() {
        let (conn, _client) = connected_pair();
        assert_eq!(conn.interest(), Interest::READABLE);
    }

    #[test]
    fn interest_adds_writable_once_outbound_queued() {
        let (mut conn, _client) = connected_pair();
        conn.outbound.write_all(b"hi").unwrap();
        assert_eq!(conn.interest(), Interest::READABLE | Interest::WRITABLE);
    }

    #[test]
    fn read_into_reports_bytes_and_updates_counters() {
        use std::io::Write as _;
        let (mut conn, mut client) = connected_pair();
        client.write_all(b"ping").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let mut scratch = IoBuffer::with_max_capacity(128, Some(128));
        let n = conn.read_into(&mut scratch).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&*scratch, b"ping");
        assert_eq!(conn.bytes_read(), 4);
    }

    #[test]
    fn flush_writes_queued_bytes_and_drains_queue() {
        let (mut conn, mut client) = connected_pair();
        conn.outbound.write_all(b"pong").unwrap();
        let n = conn.flush().unwrap();
        assert_eq!(n, 4);
        assert!(!conn.has_pending_outbound());

        let mut buf = [0u8; 4];
        std::thread::sleep(Duration::from_millis(20));
        use std::io::Read as _;
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[test]
    fn idle_time_respects_infinite_ceiling() {
        let (conn, _client) = connected_pair();
        assert!(!conn.is_timed_out(Instant::now() + Duration::from_secs(10_000), None));
    }

    #[test]
    fn registering_with_poll_succeeds() {
        let (mut conn, _client) = connected_pair();
        let poll = Poll::new().unwrap();
        conn.register(poll.registry()).unwrap();
        conn.deregister(poll.registry()).unwrap();
    }
}
