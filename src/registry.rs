//! The WorkerItem registry (§4.3): dense, id-keyed storage for anything bound
//! to a worker.
//!
//! Adapted from the teacher's `slab::Slab<Arc<Mutex<Connection<S>>>>`
//! (`listener.rs`/`multilistener.rs`): we keep `Slab` as the backing store but
//! drop the `Mutex` since a worker is single-threaded by contract, and
//! generalize the element type from a fixed `Connection` to any bound item.

use std::collections::HashMap;

use slab::Slab;

use crate::id::ItemId;

/// Bound-item storage keyed by [`ItemId`].
///
/// `ItemId`s are allocated externally (by the parent I/O system's
/// [`ItemIdGenerator`](crate::id::ItemIdGenerator)) and are not necessarily
/// dense, so a `Slab` alone cannot serve as the primary index; a `HashMap`
/// from `ItemId` to slab key bridges the two.
pub struct ItemRegistry<T> {
    items: Slab<T>,
    index: HashMap<ItemId, usize>,
}

impl<T> Default for ItemRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ItemRegistry<T> {
    pub fn new() -> Self {
        Self {
            items: Slab::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.index.get(&id).map(|&key| &self.items[key])
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut T> {
        let key = *self.index.get(&id)?;
        Some(&mut self.items[key])
    }

    /// Binds a new item under `id`. Rejects a double bind, returning `item`
    /// back to the caller unbound.
    pub fn bind(&mut self, id: ItemId, item: T) -> Result<(), T> {
        if self.index.contains_key(&id) {
            return Err(item);
        }
        let key = self.items.insert(item);
        self.index.insert(id, key);
        Ok(())
    }

    /// Unbinds and returns the item with `id`, if any.
    pub fn unbind(&mut self, id: ItemId) -> Option<T> {
        let key = self.index.remove(&id)?;
        Some(self.items.remove(key))
    }

    /// Finds the existing item by `id`, unbinds it, then binds `new_item` in
    /// its place. Returns the old item on success, so a caller can run any
    /// unbind hook on it before it is dropped; if no item matches `id`,
    /// `new_item` is handed back unbound and the registry is untouched.
    pub fn replace(&mut self, id: ItemId, new_item: T) -> Result<T, T> {
        match self.index.get(&id) {
            Some(&key) => Ok(std::mem::replace(&mut self.items[key], new_item)),
            None => Err(new_item),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &T)> {
        self.index.iter().map(move |(&id, &key)| (id, &self.items[key]))
    }

    /// Ids currently bound, for callers that need to mutate items one at a
    /// time via [`ItemRegistry::get_mut`] (a mutable iterator over both maps
    /// at once would need one of them borrowed twice).
    pub fn ids(&self) -> Vec<ItemId> {
        self.index.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_unbind_round_trips() {
        let mut reg: ItemRegistry<u32> = ItemRegistry::new();
        reg.bind(ItemId(1), 42).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.unbind(ItemId(1)), Some(42));
        assert!(reg.is_empty());
    }

    #[test]
    fn double_bind_is_rejected() {
        let mut reg: ItemRegistry<u32> = ItemRegistry::new();
        reg.bind(ItemId(1), 1).unwrap();
        assert_eq!(reg.bind(ItemId(1), 2), Err(2));
    }

    #[test]
    fn unbind_unknown_returns_none() {
        let mut reg: ItemRegistry<u32> = ItemRegistry::new();
        assert_eq!(reg.unbind(ItemId(9)), None);
    }

    #[test]
    fn replace_swaps_existing_item() {
        let mut reg: ItemRegistry<u32> = ItemRegistry::new();
        reg.bind(ItemId(1), 1).unwrap();
        assert_eq!(reg.replace(ItemId(1), 2), Ok(1));
        assert_eq!(reg.get(ItemId(1)), Some(&2));
    }

    #[test]
    fn replace_with_no_existing_item_does_not_bind() {
        let mut reg: ItemRegistry<u32> = ItemRegistry::new();
        assert_eq!(reg.replace(ItemId(1), 2), Err(2));
        assert!(!reg.contains(ItemId(1)));
    }
}
