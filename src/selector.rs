//! Thin wrapper around the OS readiness selector (§2, "Selector driver").
//!
//! Grounded on the teacher's `Listener::run`/`MultiListener::run` poll loops
//! (`listener.rs`, `multilistener.rs`): `Poll::new()`, `Events::with_capacity`,
//! and iterating `events.iter()` all carry over unchanged. What's new is
//! bounding every poll to a configured timeout rather than the teacher's
//! unbounded blocking call, since this worker must also drain its command
//! mailbox and run idle checks between ticks.

use std::{io, time::Duration};

use mio::{Events, Interest, Poll, Registry, Token};

const EVENTS_CAPACITY: usize = 1024;

/// Bounded-poll wrapper around `mio::Poll`.
pub struct Selector {
    poll: Poll,
    events: Events,
    timeout: Duration,
}

impl Selector {
    pub fn new(timeout: Duration) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENTS_CAPACITY),
            timeout,
        })
    }

    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: mio::event::Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)
    }

    /// Blocks for at most the configured timeout, then returns the set of
    /// ready tokens observed this tick. An empty result is a normal tick with
    /// no readiness, not an error.
    pub fn poll(&mut self) -> io::Result<Vec<(Token, bool, bool, bool)>> {
        self.poll.poll(&mut self.events, Some(self.timeout))?;
        let mut ready = Vec::with_capacity(self.events.iter().count());
        for event in self.events.iter() {
            ready.push((
                event.token(),
                event.is_writable(),
                event.is_readable(),
                event.is_error(),
            ));
        }
        Ok(ready)
    }
}
