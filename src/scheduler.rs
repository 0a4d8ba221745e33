//! The external scheduler seam (§4.7).
//!
//! The worker's own suspension point is a bounded selector poll, which makes
//! it unsuitable for firing its own delayed callbacks reliably; `Schedule`
//! commands are instead forwarded to a collaborator the worker holds a
//! handle to but never implements, in the same spirit as the teacher's
//! `Arc<Waker>` handle to the listener — a referenced collaborator, not an
//! owned subsystem. A concrete timer wheel is explicitly out of scope.

use std::time::Duration;

use crate::{command::Payload, id::ItemId};

/// Delayed-delivery collaborator the worker forwards `Schedule` commands to.
pub trait Scheduler: Send {
    /// Requests that `payload` be delivered to `item_id` (via the worker's
    /// own `Message` command) no sooner than `delay` from now.
    fn schedule(&self, delay: Duration, item_id: ItemId, payload: Payload);
}

/// A `Scheduler` that drops every request, useful for workers that never
/// accept `Schedule` commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScheduler;

impl Scheduler for NullScheduler {
    fn schedule(&self, _delay: Duration, item_id: ItemId, _payload: Payload) {
        log::debug!("dropping schedule request for item {:?}: no scheduler configured", item_id);
    }
}
