//! Mutex-guarded correlation map.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::CorrelationMap;

/// [`CorrelationMap`] behind a single [`Mutex`].
///
/// Every method takes the lock for the duration of one call only. A lookup
/// followed by a remove is two critical sections; use [`Self::with_locked`]
/// when a sequence of calls has to be atomic.
///
/// A panic inside a callback poisons the mutex. The map has no invariant a
/// half-finished call can break, so later calls carry on with the inner map.
#[derive(Debug)]
pub struct SyncCorrelationMap<V> {
    inner: Mutex<CorrelationMap<V>>,
}

impl<V> SyncCorrelationMap<V> {
    /// Creates a map with at least `min_size` primary slots.
    #[must_use]
    pub fn with_min_size(min_size: usize) -> Self {
        Self { inner: Mutex::new(CorrelationMap::with_min_size(min_size)) }
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, CorrelationMap<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with the lock held across the whole closure.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut CorrelationMap<V>) -> R) -> R {
        f(&mut self.lock())
    }

    /// Number of primary slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Associates `value` with `key`, returning the value it replaced.
    pub fn put(&self, key: u64, value: V) -> Option<V> {
        self.lock().put(key, value)
    }

    /// Returns a copy of the value for `key`.
    #[must_use]
    pub fn get(&self, key: u64) -> Option<V>
    where
        V: Clone,
    {
        self.lock().get(key).cloned()
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: u64) -> Option<V> {
        self.lock().remove(key)
    }

    /// Removes every entry for which `filter` returns `true`.
    pub fn remove_if<F>(&self, filter: F)
    where
        F: FnMut(u64, &V) -> bool,
    {
        self.lock().remove_if(filter);
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Visits every value with the lock held; `action` must not call back
    /// into this map.
    pub fn for_each_value<F>(&self, action: F)
    where
        F: FnMut(&V),
    {
        self.lock().for_each_value(action);
    }

    /// Visits every key with the lock held; `action` must not call back into
    /// this map.
    pub fn for_each_key<F>(&self, action: F)
    where
        F: FnMut(u64),
    {
        self.lock().for_each_key(action);
    }

    /// Consumes the wrapper and returns the inner map.
    pub fn into_inner(self) -> CorrelationMap<V> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
