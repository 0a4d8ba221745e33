//! Identity types for workers and the items bound to them.
//!
//! A `mio::Token` alone is not enough to keep these identities straight: a
//! [`Token`](mio::Token) names a slot in one worker's selector, while an
//! [`ItemId`] names an item across the whole parent I/O system (it is what a
//! [`Message`](crate::command::WorkerCommand::Message) or
//! [`SwapHandler`](crate::command::WorkerCommand::SwapHandler) addresses).
//! Keeping them as distinct newtypes stops the two from being swapped by
//! accident at a call site.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Identifies a worker uniquely within its parent I/O system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

/// Identifies a [`WorkerItem`](crate::handler::WorkerItem) uniquely within
/// the parent I/O system, independent of which worker currently owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub usize);

/// An immutable `(itemId, workerRef)` pair, created once by the I/O system
/// for every item it hands to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Context {
    pub item_id: ItemId,
    pub worker_id: WorkerId,
}

impl Context {
    pub fn new(item_id: ItemId, worker_id: WorkerId) -> Self {
        Self { item_id, worker_id }
    }
}

/// Process-wide monotonic counter producing unique [`ItemId`]s.
///
/// A single generator is expected to be shared (typically inside an `Arc`)
/// across every worker belonging to one parent I/O system, so that item ids
/// never collide between workers.
#[derive(Debug, Default)]
pub struct ItemIdGenerator {
    next: AtomicUsize,
}

impl ItemIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }

    /// Allocates the next id. Never reuses a previously allocated value for
    /// the lifetime of the generator.
    pub fn next(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_generator_produces_increasing_unique_ids() {
        let gen = ItemIdGenerator::new();
        let a = gen.next();
        let b = gen.next();
        let c = gen.next();
        assert_eq!(a, ItemId(0));
        assert_eq!(b, ItemId(1));
        assert_eq!(c, ItemId(2));
    }

    #[test]
    fn context_carries_item_and_worker_identity() {
        let ctx = Context::new(ItemId(4), WorkerId(1));
        assert_eq!(ctx.item_id, ItemId(4));
        assert_eq!(ctx.worker_id, WorkerId(1));
    }
}
