//! The single-threaded event loop (§4.1): selects, processes readiness,
//! drains the command mailbox, runs callbacks, and periodically sweeps idle
//! connections.
//!
//! Grounded on the teacher's `Worker::run` (`worker.rs`) for the
//! recv-dispatch-inform loop shape, and `Listener::run`/`MultiListener::run`
//! (`listener.rs`, `multilistener.rs`) for the `Poll::poll`/`Events::iter`/
//! per-token dispatch structure. The strict OP_CONNECT -> OP_READ -> OP_WRITE
//! ordering and the command-drain-after-poll ordering are new: the source
//! material's loop does not separate these phases this explicitly.

use std::{
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    time::Instant,
};

use crossbeam_channel::{Receiver, Sender};
use mio::Token;
use slab::Slab;

use crate::{
    command::{ConnectionSnapshot, IoCommand, Payload, WorkerCommand, WorkerNotification},
    config::WorkerConfig,
    connection::{ConnState, Connection, Role},
    error::{DisconnectCause, WorkerError},
    handler::Handler,
    id::{ItemId, ItemIdGenerator, WorkerId},
    initializer::{InitializerRegistry, ServerId},
    registry::ItemRegistry,
    scheduler::Scheduler,
    selector::Selector,
    watched::WatchedBridge,
};

/// Maximum commands drained from each mailbox per tick, so a command storm
/// cannot starve selector processing indefinitely.
const COMMAND_BATCH_CAP: usize = 512;

type Callback = Box<dyn FnOnce(&mut Worker) + Send>;

/// Sender handles bound to one worker's mailboxes. Cloneable so many external
/// callers can address the same worker.
#[derive(Clone)]
pub struct WorkerHandle {
    io_tx: Sender<IoCommand>,
    cmd_tx: Sender<WorkerCommand>,
}

impl WorkerHandle {
    pub fn send_io(&self, command: IoCommand) -> Result<(), crossbeam_channel::SendError<IoCommand>> {
        self.io_tx.send(command)
    }

    pub fn send(&self, command: WorkerCommand) -> Result<(), crossbeam_channel::SendError<WorkerCommand>> {
        self.cmd_tx.send(command)
    }
}

/// A single-threaded owner of a set of nonblocking TCP connections (§2).
pub struct Worker {
    id: WorkerId,
    config: WorkerConfig,
    selector: Selector,
    connections: Slab<Connection>,
    items: ItemRegistry<Box<dyn Handler>>,
    item_ids: ItemIdGenerator,
    initializers: InitializerRegistry,
    watched: WatchedBridge,
    scheduler: Box<dyn Scheduler>,
    io_rx: Receiver<IoCommand>,
    cmd_rx: Receiver<WorkerCommand>,
    notifications: Sender<WorkerNotification>,
    callbacks: VecDeque<(WorkerId, Callback)>,
    read_scratch: crate::buffer::IoBuffer,
    write_scratch: crate::buffer::IoBuffer,
    last_idle_check: Instant,
    shutting_down: bool,
}

impl Worker {
    /// Builds a worker and the handle external callers use to address it.
    /// Sends `WorkerReady` once construction succeeds (§6).
    pub fn new(
        id: WorkerId,
        config: WorkerConfig,
        scheduler: Box<dyn Scheduler>,
        notifications: Sender<WorkerNotification>,
    ) -> io::Result<(Self, WorkerHandle)> {
        config
            .validate()
            .map_err(|msg| io::Error::new(io::ErrorKind::InvalidInput, msg))?;

        let (io_tx, io_rx) = crossbeam_channel::unbounded();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let selector = Selector::new(config.select_timeout)?;
        let read_scratch = crate::buffer::IoBuffer::with_max_capacity(
            config.read_buffer_size,
            Some(config.read_buffer_size),
        );
        let write_scratch =
            crate::buffer::IoBuffer::with_max_capacity(4096, Some(config.output_buffer_size));

        let worker = Self {
            id,
            config,
            selector,
            connections: Slab::new(),
            items: ItemRegistry::new(),
            item_ids: ItemIdGenerator::new(),
            initializers: InitializerRegistry::new(),
            watched: WatchedBridge::new(),
            scheduler,
            io_rx,
            cmd_rx,
            notifications: notifications.clone(),
            callbacks: VecDeque::new(),
            read_scratch,
            write_scratch,
            last_idle_check: Instant::now(),
            shutting_down: false,
        };

        notifications.send(WorkerNotification::WorkerReady(id)).ok();

        Ok((worker, WorkerHandle { io_tx, cmd_tx }))
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Queues a continuation to run on `target`'s callback queue. Rejected
    /// (logged, dropped) if `target` is not this worker, since a worker can
    /// only drain its own queue.
    pub fn schedule_callback(&mut self, target: WorkerId, callback: Callback) {
        if target != self.id {
            log::error!(
                "callback addressed to worker {:?} rejected by worker {:?}",
                target,
                self.id
            );
            return;
        }
        self.callbacks.push_back((target, callback));
    }

    /// One iteration of the loop: selector poll, readiness processing,
    /// command drain, callback drain, and (periodically) an idle sweep.
    /// Strict order per §4.1.
    pub fn step(&mut self) -> io::Result<()> {
        let ready = self.selector.poll()?;
        for (token, writable, readable, error) in ready {
            self.process_ready(token, writable, readable, error);
        }

        self.drain_io_commands();
        self.drain_worker_commands();
        self.drain_callbacks();

        if self.last_idle_check.elapsed() >= self.config.idle_check_frequency {
            self.idle_sweep();
            self.last_idle_check = Instant::now();
        }

        Ok(())
    }

    /// Convenience loop calling `step()` until `should_stop` returns `true`.
    /// `step()` itself remains the unit driven directly by tests.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) -> io::Result<()> {
        while !should_stop() && !self.shutting_down {
            self.step()?;
        }
        Ok(())
    }

    /// Cancels polling and forcibly closes every active connection, per the
    /// shutdown contract in §5.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        let keys: Vec<usize> = self.connections.iter().map(|(k, _)| k).collect();
        for key in keys {
            self.unregister_connection(key, DisconnectCause::Terminated);
        }
    }

    // ---- readiness processing -------------------------------------------

    fn process_ready(&mut self, token: Token, writable: bool, readable: bool, error: bool) {
        let key = token.0;
        if !self.connections.contains(key) {
            log::debug!("ready event for unknown token {:?}, skipping", token);
            return;
        }

        // A pending connect is resolved through `finish_connect`'s `take_error`
        // probe even when the selector also reports an error flag, so a
        // failed connect is classified as `ConnectFailed` rather than the
        // generic socket error below (mio reports failed loopback connects as
        // writable-and-errored on the same event).
        if self.connections[key].state() == ConnState::Connecting {
            if writable || error {
                self.handle_connect_ready(key);
            }
            if !self.connections.contains(key) {
                return;
            }
            if self.connections[key].state() == ConnState::Connecting {
                return;
            }
        }

        if error {
            self.unregister_connection(
                key,
                DisconnectCause::Error(io::Error::new(
                    io::ErrorKind::Other,
                    "selector reported a socket error",
                )),
            );
            return;
        }

        if readable {
            self.handle_read_ready(key);
            if !self.connections.contains(key) {
                return;
            }
        }

        if writable {
            self.handle_write_ready(key);
        }
    }

    fn handle_connect_ready(&mut self, key: usize) {
        match self.connections[key].finish_connect() {
            Ok(()) => {
                if let Err(e) = self.connections[key].reregister(self.selector.registry()) {
                    self.unregister_connection(key, DisconnectCause::Error(e));
                    return;
                }
                self.invoke_on_connected(key);
            }
            Err(e) => {
                self.unregister_connection(key, DisconnectCause::ConnectFailed(e));
            }
        }
    }

    fn invoke_on_connected(&mut self, key: usize) {
        let item_id = self.connections[key].item_id();
        let Some(handler) = self.items.get_mut(item_id) else {
            return;
        };
        let had_outbound_before = self.connections[key].has_pending_outbound();
        let conn = &mut self.connections[key];
        let result = panic::catch_unwind(AssertUnwindSafe(|| handler.on_connected(conn)));
        if result.is_err() {
            log::error!("handler for item {:?} panicked in on_connected", item_id);
            self.unregister_connection(key, DisconnectCause::Unhandled);
            return;
        }
        self.sync_interest(key, had_outbound_before);
    }

    fn handle_read_ready(&mut self, key: usize) {
        self.read_scratch.reset();
        let read_result = self.connections[key].read_into(&mut self.read_scratch);
        match read_result {
            Ok(0) => {
                self.unregister_connection(key, DisconnectCause::Closed);
            }
            Ok(_) => {
                let item_id = self.connections[key].item_id();
                let had_outbound_before = self.connections[key].has_pending_outbound();
                let panicked = match self.items.get_mut(item_id) {
                    Some(handler) => {
                        let data: &[u8] = &self.read_scratch;
                        let conn = &mut self.connections[key];
                        panic::catch_unwind(AssertUnwindSafe(|| handler.on_bytes(conn, data))).is_err()
                    }
                    None => false,
                };
                if panicked {
                    log::error!("handler for item {:?} panicked in on_bytes", item_id);
                    self.unregister_connection(key, DisconnectCause::Unhandled);
                    return;
                }
                self.sync_interest(key, had_outbound_before);
            }
            Err(e) => {
                self.unregister_connection(key, DisconnectCause::Error(e));
            }
        }
    }

    /// Reregisters `key`'s interest ops if queuing outbound bytes during a
    /// handler callback (`on_connected`, `on_bytes`) changed whether the
    /// outbound queue is empty — the only condition `Connection::interest`
    /// depends on beyond connection state (§4.2).
    fn sync_interest(&mut self, key: usize, had_outbound_before: bool) {
        if !self.connections.contains(key) {
            return;
        }
        let has_outbound_now = self.connections[key].has_pending_outbound();
        if had_outbound_before != has_outbound_now {
            if let Err(e) = self.connections[key].reregister(self.selector.registry()) {
                self.unregister_connection(key, DisconnectCause::Error(e));
            }
        }
    }

    fn handle_write_ready(&mut self, key: usize) {
        if !matches!(
            self.connections[key].state(),
            ConnState::Open | ConnState::Closing
        ) {
            return;
        }

        let item_id = self.connections[key].item_id();
        let panicked = match self.items.get_mut(item_id) {
            Some(handler) => {
                self.write_scratch.reset();
                let scratch = &mut self.write_scratch;
                panic::catch_unwind(AssertUnwindSafe(|| handler.on_writable(scratch))).is_err()
            }
            None => false,
        };
        if panicked {
            log::error!("handler for item {:?} panicked in on_writable", item_id);
            self.unregister_connection(key, DisconnectCause::Unhandled);
            return;
        }

        let had_outbound_before = self.connections[key].has_pending_outbound();
        if let Err(e) = self.connections[key].absorb_outbound(&mut self.write_scratch) {
            self.unregister_connection(key, DisconnectCause::Error(e));
            return;
        }

        match self.connections[key].flush() {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.unregister_connection(key, DisconnectCause::Error(e));
                return;
            }
        }

        let closing_and_drained =
            self.connections[key].state() == ConnState::Closing && !self.connections[key].has_pending_outbound();

        self.sync_interest(key, had_outbound_before);
        if !self.connections.contains(key) {
            return;
        }

        if closing_and_drained {
            let cause = self.connections[key]
                .take_closing_cause()
                .unwrap_or(DisconnectCause::Disconnect);
            self.unregister_connection(key, cause);
        }
    }

    // ---- command mailboxes --------------------------------------------------

    fn drain_io_commands(&mut self) {
        for _ in 0..COMMAND_BATCH_CAP {
            let Ok(command) = self.io_rx.try_recv() else {
                break;
            };
            self.apply_io_command(command);
        }
    }

    fn apply_io_command(&mut self, command: IoCommand) {
        match command {
            IoCommand::NewConnection {
                server_id,
                socket,
                attempt,
            } => self.accept_new_connection(server_id, socket, attempt),
            IoCommand::RegisterServer {
                server_id,
                initializer,
            } => {
                self.initializers.register(server_id, initializer);
                self.notifications
                    .send(WorkerNotification::ServerRegistered { server_id })
                    .ok();
            }
            IoCommand::UnregisterServer { server_id } => {
                if let Err(e) = self.unregister_server(server_id) {
                    log::error!("{e}");
                }
            }
            IoCommand::ServerShutdownRequest { server_id } => {
                if let Err(e) = self.server_shutdown_request(server_id) {
                    log::error!("{e}");
                }
            }
        }
    }

    fn unregister_server(&mut self, server_id: ServerId) -> Result<(), WorkerError> {
        if !self.initializers.is_registered(server_id) {
            return Err(WorkerError::UnknownServer);
        }
        let keys: Vec<usize> = self
            .connections
            .iter()
            .filter(|(_, c)| c.server_id() == Some(server_id))
            .map(|(k, _)| k)
            .collect();
        for key in keys {
            self.unregister_connection(key, DisconnectCause::Terminated);
        }
        self.initializers.unregister(server_id);
        Ok(())
    }

    fn server_shutdown_request(&mut self, server_id: ServerId) -> Result<(), WorkerError> {
        if !self.initializers.is_registered(server_id) {
            return Err(WorkerError::UnknownServer);
        }
        let item_ids: Vec<ItemId> = self
            .connections
            .iter()
            .filter(|(_, c)| c.server_id() == Some(server_id))
            .map(|(_, c)| c.item_id())
            .collect();
        for item_id in item_ids {
            if let Some(handler) = self.items.get_mut(item_id) {
                handler.shutdown_request();
            }
        }
        Ok(())
    }

    fn accept_new_connection(
        &mut self,
        server_id: ServerId,
        socket: mio::net::TcpStream,
        attempt: u64,
    ) {
        if !self.initializers.is_registered(server_id) {
            self.notifications
                .send(WorkerNotification::ConnectionRefused { socket, attempt })
                .ok();
            return;
        }

        let item_id = self.item_ids.next();
        let Some(handler) = self.initializers.new_connection(server_id, item_id, &socket) else {
            self.notifications
                .send(WorkerNotification::ConnectionRefused { socket, attempt })
                .ok();
            return;
        };

        let entry = self.connections.vacant_entry();
        let token = Token(entry.key());
        let mut conn = Connection::accepted(
            token,
            socket,
            item_id,
            server_id,
            self.config.output_buffer_size,
        );
        if let Err(e) = conn.register(self.selector.registry()) {
            log::error!("{}", WorkerError::Selector(e));
            return;
        }
        let key = entry.key();
        entry.insert(conn);

        if let Err(e) = self.bind_item(item_id, handler) {
            unreachable!("freshly generated item id cannot already be bound: {e}");
        }

        self.invoke_on_connected(key);
    }

    /// Binds `handler` under `item_id`: registers it with the watched bridge
    /// if it exposes a liveness token, then calls `on_bind` once bound (§3's
    /// `bindHook`). Rejects a double bind.
    fn bind_item(&mut self, item_id: ItemId, handler: Box<dyn Handler>) -> Result<(), WorkerError> {
        let watched = handler.watched_token().is_some();
        self.items
            .bind(item_id, handler)
            .map_err(|_| WorkerError::DoubleBind(item_id))?;
        if watched {
            self.watched.watch(item_id);
        }
        if let Some(handler) = self.items.get_mut(item_id) {
            handler.on_bind();
        }
        Ok(())
    }

    /// Unbinds `item_id`, calling `on_unbind` on the departing handler (§3's
    /// `unbindHook`) if one was bound.
    fn unbind_item(&mut self, item_id: ItemId) -> Result<(), WorkerError> {
        let mut handler = self
            .items
            .unbind(item_id)
            .ok_or(WorkerError::UnknownItem(item_id))?;
        handler.on_unbind();
        self.watched.unwatch(item_id);
        Ok(())
    }

    fn drain_worker_commands(&mut self) {
        for _ in 0..COMMAND_BATCH_CAP {
            let Ok(command) = self.cmd_rx.try_recv() else {
                break;
            };
            self.apply_worker_command(command);
        }
    }

    fn apply_worker_command(&mut self, command: WorkerCommand) {
        match command {
            WorkerCommand::Bind { item_id, handler } => {
                if let Err(e) = self.bind_item(item_id, handler) {
                    log::error!("{e}");
                }
            }
            WorkerCommand::Connect { item_id, addr } => {
                if let Err(e) = self.connect_client(item_id, addr) {
                    log::error!("{e}");
                }
            }
            WorkerCommand::UnbindItem { item_id } => {
                if let Err(e) = self.unbind_item(item_id) {
                    log::error!("{e}");
                }
            }
            WorkerCommand::Schedule {
                item_id,
                delay,
                payload,
            } => self.scheduler.schedule(delay, item_id, payload),
            WorkerCommand::Message { item_id, payload } => self.deliver_message(item_id, payload),
            WorkerCommand::Disconnect { item_id } => self.disconnect_item(item_id),
            WorkerCommand::Kill { item_id, error } => self.kill_item(item_id, error),
            WorkerCommand::SwapHandler { handler } => self.swap_handler(handler),
            WorkerCommand::RequestSummary => {
                let snapshot = self.connection_summary();
                self.notifications
                    .send(WorkerNotification::ConnectionSummary(snapshot))
                    .ok();
            }
        }
    }

    fn connect_client(&mut self, item_id: ItemId, addr: std::net::SocketAddr) -> Result<(), WorkerError> {
        let handler = self
            .items
            .get(item_id)
            .ok_or(WorkerError::UnknownItem(item_id))?;
        if !handler.is_client_capable() {
            return Err(WorkerError::NotClientCapable(item_id));
        }

        match mio::net::TcpStream::connect(addr) {
            Ok(socket) => {
                let entry = self.connections.vacant_entry();
                let token = Token(entry.key());
                let mut conn =
                    Connection::connecting(token, socket, item_id, self.config.output_buffer_size);
                conn.register(self.selector.registry())
                    .map_err(WorkerError::Selector)?;
                entry.insert(conn);
                Ok(())
            }
            Err(e) => {
                if let Some(handler) = self.items.get_mut(item_id) {
                    handler.on_disconnected(&DisconnectCause::ConnectFailed(e));
                }
                self.apply_disconnect_table(item_id, Role::Client, true);
                Ok(())
            }
        }
    }

    fn deliver_message(&mut self, item_id: ItemId, payload: Payload) {
        match self.items.get_mut(item_id) {
            Some(handler) => {
                if let Err(payload) = handler.on_message(payload) {
                    self.notifications
                        .send(WorkerNotification::MessageDeliveryFailed { item_id, payload })
                        .ok();
                }
            }
            None => {
                self.notifications
                    .send(WorkerNotification::MessageDeliveryFailed { item_id, payload })
                    .ok();
            }
        }
    }

    fn disconnect_item(&mut self, item_id: ItemId) {
        let Some(key) = self.find_connection_key(item_id) else {
            log::warn!(
                "disconnect requested for item {:?} with no active connection",
                item_id
            );
            return;
        };
        if self.connections[key].has_pending_outbound() {
            self.connections[key].begin_closing(DisconnectCause::Disconnect);
        } else {
            self.unregister_connection(key, DisconnectCause::Disconnect);
        }
    }

    fn kill_item(&mut self, item_id: ItemId, error: io::Error) {
        if let Some(key) = self.find_connection_key(item_id) {
            self.unregister_connection(key, DisconnectCause::Error(error));
        } else if let Err(e) = self.unbind_item(item_id) {
            log::error!("{e}");
        }
    }

    /// `SwapHandler(newHandler)` (§4.6): unbind-old, bind-new, re-point,
    /// atomic with respect to selector events because the worker is
    /// single-threaded. The old handler observes `on_unbind`, the new one
    /// `on_bind` (§3's `bindHook`/`unbindHook`, §8's swap scenario).
    fn swap_handler(&mut self, new_handler: Box<dyn Handler>) {
        let item_id = new_handler.item_id();
        if self.find_connection_key(item_id).is_none() {
            log::error!("swap handler for item {:?}: no active connection", item_id);
            return;
        }

        match self.items.replace(item_id, new_handler) {
            Ok(mut old_handler) => {
                old_handler.on_unbind();
                if let Some(new_handler) = self.items.get_mut(item_id) {
                    new_handler.on_bind();
                }
                let still_watched = self
                    .items
                    .get(item_id)
                    .map(|h| h.watched_token().is_some())
                    .unwrap_or(false);
                if still_watched {
                    self.watched.watch(item_id);
                } else {
                    self.watched.unwatch(item_id);
                }
            }
            Err(_) => {
                log::error!("swap handler for item {:?}: no existing item bound", item_id);
            }
        }
    }

    fn find_connection_key(&self, item_id: ItemId) -> Option<usize> {
        self.connections
            .iter()
            .find(|(_, c)| c.item_id() == item_id)
            .map(|(k, _)| k)
    }

    // ---- callbacks -----------------------------------------------------------

    fn drain_callbacks(&mut self) {
        let pending: VecDeque<(WorkerId, Callback)> = std::mem::take(&mut self.callbacks);
        for (target, callback) in pending {
            if target != self.id {
                log::error!(
                    "dropping misrouted callback for worker {:?} on worker {:?}",
                    target,
                    self.id
                );
                continue;
            }
            callback(self);
        }
    }

    // ---- idle sweep ------------------------------------------------------------

    fn idle_sweep(&mut self) {
        let period = self.config.idle_check_frequency;
        let ids = self.items.ids();
        for item_id in ids {
            let has_idle_check = self
                .items
                .get(item_id)
                .map(|h| h.has_idle_check())
                .unwrap_or(false);
            if has_idle_check {
                if let Some(handler) = self.items.get_mut(item_id) {
                    handler.on_idle_check(period);
                }
            }
        }

        let now = Instant::now();
        let timed_out: Vec<usize> = self
            .connections
            .iter()
            .filter(|(_, c)| c.is_timed_out(now, self.config.max_idle_time))
            .map(|(k, _)| k)
            .collect();
        for key in timed_out {
            self.unregister_connection(key, DisconnectCause::TimedOut);
        }

        self.sweep_watched();

        self.notifications.send(WorkerNotification::IdleCheckExecuted).ok();
    }

    /// The watched-handler bridge (§4.9): since token death has no OS-level
    /// readiness event, liveness is only checked here, piggybacked on the
    /// idle sweep.
    fn sweep_watched(&mut self) {
        let dead: Vec<ItemId> = {
            let items = &self.items;
            self.watched
                .dead_tokens(|id| items.get(id).and_then(|h| h.watched_token()))
                .collect()
        };
        for item_id in dead {
            self.watched.unwatch(item_id);
            if let Some(key) = self.find_connection_key(item_id) {
                self.unregister_connection(key, DisconnectCause::Disconnect);
            }
        }
    }

    // ---- unregister discipline (§4.8) ------------------------------------------

    fn unregister_connection(&mut self, key: usize, cause: DisconnectCause) {
        if !self.connections.contains(key) {
            return;
        }
        let mut conn = self.connections.remove(key);
        let item_id = conn.item_id();
        let role = conn.role();

        if let Err(e) = conn.deregister(self.selector.registry()) {
            log::debug!("deregistering connection for item {:?} failed: {e}", item_id);
        }
        conn.mark_closed();

        let (manual_unbind, should_unbind) = match self.items.get_mut(item_id) {
            Some(handler) => {
                let _ = panic::catch_unwind(AssertUnwindSafe(|| handler.on_disconnected(&cause)));
                (handler.wants_manual_unbind(), true)
            }
            None => (false, false),
        };

        if should_unbind {
            let unbind = self.should_unbind_on_disconnect(role, manual_unbind, cause.is_disconnect_error());
            if unbind {
                if let Err(e) = self.unbind_item(item_id) {
                    log::error!("{e}");
                }
            }
        }
    }

    /// Implements the disconnect table of §4.8 for the error path taken when
    /// a client connect fails before a `Connection` was ever registered.
    fn apply_disconnect_table(&mut self, item_id: ItemId, role: Role, is_error: bool) {
        let manual_unbind = self
            .items
            .get(item_id)
            .map(|h| h.wants_manual_unbind())
            .unwrap_or(false);
        if self.should_unbind_on_disconnect(role, manual_unbind, is_error) {
            if let Err(e) = self.unbind_item(item_id) {
                log::error!("{e}");
            }
        }
    }

    fn should_unbind_on_disconnect(&self, role: Role, manual_unbind: bool, is_error: bool) -> bool {
        match role {
            Role::Server => true,
            Role::Client => !(manual_unbind && is_error),
        }
    }

    /// Builds a point-in-time snapshot of every active connection (§4.10).
    pub fn connection_summary(&self) -> Vec<ConnectionSnapshot> {
        let now = Instant::now();
        self.connections
            .iter()
            .map(|(_, conn)| ConnectionSnapshot {
                item_id: conn.item_id(),
                role: conn.role(),
                address: conn.address(),
                bytes_read: conn.bytes_read(),
                bytes_written: conn.bytes_written(),
                age: conn.age(now),
                idle_time: conn.idle_time(now),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::DisconnectCause, handler::Handler, initializer::ServerInitializer, scheduler::NullScheduler};
    use std::{
        io::{Read as _, Write as _},
        net::TcpStream as StdTcpStream,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    struct RecordingHandler {
        item_id: ItemId,
        connected: Arc<Mutex<bool>>,
        received: Arc<Mutex<Vec<u8>>>,
    }

    impl Handler for RecordingHandler {
        fn item_id(&self) -> ItemId {
            self.item_id
        }

        fn on_connected(&mut self, _conn: &mut Connection) {
            *self.connected.lock().unwrap() = true;
        }

        fn on_bytes(&mut self, _conn: &mut Connection, data: &[u8]) {
            self.received.lock().unwrap().extend_from_slice(data);
        }

        fn on_disconnected(&mut self, _cause: &DisconnectCause) {}
    }

    struct RecordingInitializer {
        connected: Arc<Mutex<bool>>,
        received: Arc<Mutex<Vec<u8>>>,
    }

    impl ServerInitializer for RecordingInitializer {
        fn on_connect(
            &mut self,
            item_id: ItemId,
            _socket: &mio::net::TcpStream,
        ) -> Option<Box<dyn Handler>> {
            Some(Box::new(RecordingHandler {
                item_id,
                connected: self.connected.clone(),
                received: self.received.clone(),
            }))
        }
    }

    fn test_worker() -> (Worker, WorkerHandle, Receiver<WorkerNotification>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut config = WorkerConfig::default();
        config.select_timeout = Duration::from_millis(5);
        let (worker, handle) = Worker::new(WorkerId(0), config, Box::new(NullScheduler), tx).unwrap();
        (worker, handle, rx)
    }

    #[test]
    fn accept_and_bytes_arrive_at_handler() {
        let (mut worker, handle, _rx) = test_worker();
        let connected = Arc::new(Mutex::new(false));
        let received = Arc::new(Mutex::new(Vec::new()));

        handle
            .send_io(IoCommand::RegisterServer {
                server_id: ServerId(1),
                initializer: Box::new(RecordingInitializer {
                    connected: connected.clone(),
                    received: received.clone(),
                }),
            })
            .unwrap();
        worker.step().unwrap();

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = StdTcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();

        handle
            .send_io(IoCommand::NewConnection {
                server_id: ServerId(1),
                socket: mio::net::TcpStream::from_std(accepted),
                attempt: 0,
            })
            .unwrap();
        worker.step().unwrap();
        assert!(*connected.lock().unwrap());

        client.write_all(b"ping").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        worker.step().unwrap();

        assert_eq!(&*received.lock().unwrap(), b"ping");

        drop(client);
    }

    #[test]
    fn unknown_server_refuses_connection() {
        let (mut worker, handle, rx) = test_worker();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = std::net::TcpStream::connect(addr).unwrap();
        let (accepted, _) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();

        handle
            .send_io(IoCommand::NewConnection {
                server_id: ServerId(99),
                socket: mio::net::TcpStream::from_std(accepted),
                attempt: 3,
            })
            .unwrap();
        worker.step().unwrap();

        let notif = rx.try_recv();
        assert!(matches!(
            notif,
            Ok(WorkerNotification::ConnectionRefused { attempt: 3, .. })
        ));
    }

    #[test]
    fn message_to_unbound_item_reports_delivery_failure() {
        let (mut worker, handle, rx) = test_worker();
        // drain WorkerReady
        let _ = rx.try_recv();
        handle
            .send(WorkerCommand::Message {
                item_id: ItemId(42),
                payload: Box::new(7u32),
            })
            .unwrap();
        worker.step().unwrap();
        let notif = rx.try_recv();
        assert!(matches!(
            notif,
            Ok(WorkerNotification::MessageDeliveryFailed { item_id: ItemId(42), .. })
        ));
    }

    struct HookCountingHandler {
        item_id: ItemId,
        binds: Arc<AtomicUsize>,
        unbinds: Arc<AtomicUsize>,
    }

    impl Handler for HookCountingHandler {
        fn item_id(&self) -> ItemId {
            self.item_id
        }

        fn on_bind(&mut self) {
            self.binds.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unbind(&mut self) {
            self.unbinds.fetch_add(1, Ordering::SeqCst);
        }

        fn on_bytes(&mut self, _conn: &mut Connection, _data: &[u8]) {}
    }

    #[test]
    fn bind_then_unbind_invokes_hooks_exactly_once() {
        let (mut worker, handle, _rx) = test_worker();
        let binds = Arc::new(AtomicUsize::new(0));
        let unbinds = Arc::new(AtomicUsize::new(0));
        let item_id = ItemId(7);

        handle
            .send(WorkerCommand::Bind {
                item_id,
                handler: Box::new(HookCountingHandler {
                    item_id,
                    binds: binds.clone(),
                    unbinds: unbinds.clone(),
                }),
            })
            .unwrap();
        worker.step().unwrap();
        assert_eq!(binds.load(Ordering::SeqCst), 1);
        assert_eq!(unbinds.load(Ordering::SeqCst), 0);

        handle.send(WorkerCommand::UnbindItem { item_id }).unwrap();
        worker.step().unwrap();
        assert_eq!(binds.load(Ordering::SeqCst), 1);
        assert_eq!(unbinds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rebinding_after_unbind_fires_a_fresh_bind_hook() {
        let (mut worker, handle, _rx) = test_worker();
        let binds = Arc::new(AtomicUsize::new(0));
        let unbinds = Arc::new(AtomicUsize::new(0));
        let item_id = ItemId(8);

        for _ in 0..2 {
            handle
                .send(WorkerCommand::Bind {
                    item_id,
                    handler: Box::new(HookCountingHandler {
                        item_id,
                        binds: binds.clone(),
                        unbinds: unbinds.clone(),
                    }),
                })
                .unwrap();
            worker.step().unwrap();
            handle.send(WorkerCommand::UnbindItem { item_id }).unwrap();
            worker.step().unwrap();
        }

        assert_eq!(binds.load(Ordering::SeqCst), 2);
        assert_eq!(unbinds.load(Ordering::SeqCst), 2);
    }
}
