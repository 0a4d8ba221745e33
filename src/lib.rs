//! A single-threaded, nonblocking TCP I/O worker.
//!
//! A [`Worker`](worker::Worker) owns an OS readiness [`selector::Selector`], a
//! set of [`connection::Connection`]s, and a registry of
//! [`handler::Handler`]s bound to them by [`id::ItemId`]. External callers
//! address a running worker only through its [`worker::WorkerHandle`]: the
//! [`command::IoCommand`] mailbox for sockets an acceptor hands in, and the
//! [`command::WorkerCommand`] mailbox for everything else (bind, connect,
//! message, disconnect, swap handler). The worker never spawns threads or
//! crosses its own boundary to do I/O; every tick is a single pass of
//! [`worker::Worker::step`].
//!
//! Accepting connections, load-balancing across workers, and running
//! multiple workers as a pool are the responsibility of the parent I/O
//! system this crate is embedded in, not this crate itself.

pub mod buffer;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod id;
pub mod initializer;
pub mod registry;
pub mod scheduler;
pub mod selector;
pub mod watched;
pub mod worker;

pub use command::{ConnectionSnapshot, IoCommand, Payload, WorkerCommand, WorkerNotification};
pub use config::WorkerConfig;
pub use connection::{ConnState, Connection, Role};
pub use error::{DisconnectCause, WorkerError};
pub use handler::{AtomicLivenessToken, Handler, LivenessToken};
pub use id::{Context, ItemId, ItemIdGenerator, WorkerId};
pub use initializer::{ServerId, ServerInitializer};
pub use scheduler::{NullScheduler, Scheduler};
pub use worker::{Worker, WorkerHandle};
