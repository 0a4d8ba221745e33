//! The WatchedHandler bridge (§4.9).
//!
//! No direct teacher analogue; modeled structurally the same way as the
//! idle-check sweep (§4.1) since both are poll-driven rather than
//! event-driven — there is no OS readiness event for "my owner died", so
//! liveness is checked opportunistically during the idle sweep instead.

use std::collections::HashSet;

use crate::{handler::LivenessToken, id::ItemId};
use std::sync::Arc;

/// Tracks every bound item whose handler is watched, separately from the
/// worker's main connection table so the idle sweep need not probe every
/// handler's capability on every tick.
#[derive(Default)]
pub struct WatchedBridge {
    watched: HashSet<ItemId>,
}

impl WatchedBridge {
    pub fn new() -> Self {
        Self {
            watched: HashSet::new(),
        }
    }

    pub fn watch(&mut self, item_id: ItemId) {
        self.watched.insert(item_id);
    }

    pub fn unwatch(&mut self, item_id: ItemId) {
        self.watched.remove(&item_id);
    }

    pub fn is_watched(&self, item_id: ItemId) -> bool {
        self.watched.contains(&item_id)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Returns the ids of every watched item whose token has died, given a
    /// lookup from id to its token. Dead items are not removed here; the
    /// caller unwatches them as part of closing the connection.
    pub fn dead_tokens<'a>(
        &'a self,
        lookup: impl Fn(ItemId) -> Option<Arc<dyn LivenessToken>> + 'a,
    ) -> impl Iterator<Item = ItemId> + 'a {
        self.watched.iter().copied().filter(move |&id| {
            match lookup(id) {
                Some(token) => !token.is_alive(),
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::AtomicLivenessToken;

    #[test]
    fn watch_then_unwatch_round_trips() {
        let mut bridge = WatchedBridge::new();
        bridge.watch(ItemId(1));
        assert!(bridge.is_watched(ItemId(1)));
        bridge.unwatch(ItemId(1));
        assert!(!bridge.is_watched(ItemId(1)));
    }

    #[test]
    fn dead_tokens_reports_only_killed_items() {
        let mut bridge = WatchedBridge::new();
        let alive = AtomicLivenessToken::new();
        let dead = AtomicLivenessToken::new();
        dead.kill();
        bridge.watch(ItemId(1));
        bridge.watch(ItemId(2));

        let alive: Arc<dyn LivenessToken> = Arc::new(alive);
        let dead: Arc<dyn LivenessToken> = Arc::new(dead);

        let lookup = move |id: ItemId| -> Option<Arc<dyn LivenessToken>> {
            match id {
                ItemId(1) => Some(alive.clone()),
                ItemId(2) => Some(dead.clone()),
                _ => None,
            }
        };

        let dead_ids: Vec<_> = bridge.dead_tokens(lookup).collect();
        assert_eq!(dead_ids, vec![ItemId(2)]);
    }
}
