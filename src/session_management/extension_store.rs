//! Side-table associating capture state with host connection ids.
//!
//! Connection ids are dense socket indices, so entries live in a slab indexed
//! by id. The store owns the state; only the connection open/close hooks
//! insert or remove entries.

use log::error;

use crate::error_handling::types::StoreError;
use crate::network::transport::ConnectionId;

#[derive(Debug)]
pub struct ExtensionStore<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T> Default for ExtensionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ExtensionStore<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            len: 0,
        }
    }

    /// Attaches `state` to `id`. The first writer wins: an existing entry is
    /// left untouched and the conflict is reported, never overwritten.
    pub fn attach(&mut self, id: ConnectionId, state: T) -> Result<(), StoreError> {
        if id >= self.slots.len() {
            self.slots.resize_with(id + 1, || None);
        }
        let slot = &mut self.slots[id];
        if slot.is_some() {
            error!("Double capture attach for connection {}", id);
            return Err(StoreError::AlreadyAttached(id));
        }
        *slot = Some(state);
        self.len += 1;
        Ok(())
    }

    /// Unknown and released ids simply have no state.
    pub fn lookup(&self, id: ConnectionId) -> Option<&T> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lookup(id).is_some()
    }

    pub fn detach(&mut self, id: ConnectionId) -> Option<T> {
        let state = self.slots.get_mut(id).and_then(Option::take);
        if state.is_some() {
            self.len -= 1;
        }
        state
    }

    /// Removes every entry, in id order.
    pub fn drain(&mut self) -> impl Iterator<Item = (ConnectionId, T)> + '_ {
        self.len = 0;
        self.slots
            .drain(..)
            .enumerate()
            .filter_map(|(id, slot)| slot.map(|state| (id, state)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_then_lookup() {
        let mut store = ExtensionStore::new();
        store.attach(4, "four").unwrap();
        assert_eq!(store.lookup(4), Some(&"four"));
        assert_eq!(store.lookup(3), None);
        assert_eq!(store.lookup(100), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_first_writer_wins() {
        let mut store = ExtensionStore::new();
        store.attach(1, "first").unwrap();
        assert_eq!(
            store.attach(1, "second"),
            Err(StoreError::AlreadyAttached(1))
        );
        assert_eq!(store.lookup(1), Some(&"first"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_detach_releases_the_id() {
        let mut store = ExtensionStore::new();
        store.attach(2, 20).unwrap();
        assert_eq!(store.detach(2), Some(20));
        assert_eq!(store.detach(2), None);
        assert!(store.lookup(2).is_none());
        assert!(store.is_empty());

        store.attach(2, 21).unwrap();
        assert_eq!(store.lookup(2), Some(&21));
    }

    #[test]
    fn test_drain_yields_live_entries_in_order() {
        let mut store = ExtensionStore::new();
        store.attach(5, 'b').unwrap();
        store.attach(0, 'a').unwrap();
        let drained: Vec<_> = store.drain().collect();
        assert_eq!(drained, vec![(0, 'a'), (5, 'b')]);
        assert!(store.is_empty());
        assert!(store.lookup(5).is_none());
    }
}
