// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Disposable handles for subscriptions and retained records.
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::ident::DataId;
use crate::reader::ReaderSnapshot;

/// Resource released by an explicit call to [`Disposable::dispose`].
///
/// Disposing twice is a no-op. Handles outliving their store are inert.
pub trait Disposable {
    /// Releases the resource.
    fn dispose(&mut self);
}

/// Keyed table of live entries handed out as disposable handles.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    next: u64,
    entries: BTreeMap<u64, T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub(crate) fn insert(&mut self, value: T) -> u64 {
        self.next += 1;
        self.entries.insert(self.next, value);
        self.next
    }

    pub(crate) fn reinsert(&mut self, key: u64, value: T) {
        self.entries.insert(key, value);
    }

    pub(crate) fn remove(&mut self, key: u64) -> Option<T> {
        self.entries.remove(&key)
    }

    pub(crate) fn keys(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

pub(crate) type SharedRegistry<T> = Rc<RefCell<Registry<T>>>;

/// Keeps a record (and everything reachable from it) alive across [`crate::Store::gc`].
#[derive(Debug)]
pub struct RetainHandle {
    registry: Weak<RefCell<Registry<DataId>>>,
    key: Option<u64>,
}

impl RetainHandle {
    pub(crate) fn new(registry: &SharedRegistry<DataId>, id: DataId) -> Self {
        let key = registry.borrow_mut().insert(id);
        Self {
            registry: Rc::downgrade(registry),
            key: Some(key),
        }
    }

    /// Returns `true` until the handle is disposed.
    pub fn is_active(&self) -> bool {
        self.key.is_some()
    }
}

impl Disposable for RetainHandle {
    fn dispose(&mut self) {
        if let (Some(key), Some(registry)) = (self.key.take(), self.registry.upgrade()) {
            registry.borrow_mut().remove(key);
        }
    }
}

/// Callback invoked with the fresh snapshot when subscribed data changes.
pub type SubscriptionCallback = Box<dyn FnMut(&ReaderSnapshot)>;

pub(crate) struct SubscriptionEntry {
    pub(crate) snapshot: ReaderSnapshot,
    pub(crate) callback: SubscriptionCallback,
    pub(crate) active: Rc<Cell<bool>>,
}

impl std::fmt::Debug for SubscriptionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionEntry")
            .field("snapshot", &self.snapshot)
            .field("active", &self.active.get())
            .finish_non_exhaustive()
    }
}

/// Live subscription created by [`crate::Store::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    registry: Weak<RefCell<Registry<SubscriptionEntry>>>,
    key: Option<u64>,
    active: Rc<Cell<bool>>,
}

impl Subscription {
    pub(crate) fn new(
        registry: &SharedRegistry<SubscriptionEntry>,
        snapshot: ReaderSnapshot,
        callback: SubscriptionCallback,
    ) -> Self {
        let active = Rc::new(Cell::new(true));
        let key = registry.borrow_mut().insert(SubscriptionEntry {
            snapshot,
            callback,
            active: Rc::clone(&active),
        });
        Self {
            registry: Rc::downgrade(registry),
            key: Some(key),
            active,
        }
    }

    /// Returns `true` until the subscription is disposed.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }
}

impl Disposable for Subscription {
    fn dispose(&mut self) {
        self.active.set(false);
        if let (Some(key), Some(registry)) = (self.key.take(), self.registry.upgrade()) {
            // The entry may be checked out while its own callback runs; the
            // cleared flag keeps it from being put back.
            if let Ok(mut registry) = registry.try_borrow_mut() {
                registry.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_dispose_is_idempotent() {
        let registry: SharedRegistry<DataId> = Rc::default();
        let mut handle = RetainHandle::new(&registry, DataId::new("a"));
        assert_eq!(registry.borrow().len(), 1);
        handle.dispose();
        handle.dispose();
        assert!(!handle.is_active());
        assert_eq!(registry.borrow().len(), 0);
    }

    #[test]
    fn handles_outliving_registry_are_inert() {
        let registry: SharedRegistry<DataId> = Rc::default();
        let mut handle = RetainHandle::new(&registry, DataId::new("a"));
        drop(registry);
        handle.dispose();
        assert!(!handle.is_active());
    }
}
