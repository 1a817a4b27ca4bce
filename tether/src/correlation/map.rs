//! Single-threaded correlation map.

use std::collections::HashMap;

/// Smallest number of primary slots.
pub const MIN_SLOTS: usize = 16;

/// Largest number of primary slots. Ids beyond what this covers go to the
/// overflow map.
pub const MAX_SLOTS: usize = 1 << 24;

/// `max(16, min_size.next_power_of_two() * 2)`, capped at [`MAX_SLOTS`].
fn slot_count(min_size: usize) -> usize {
    min_size
        .checked_next_power_of_two()
        .and_then(|n| n.checked_mul(2))
        .map_or(MAX_SLOTS, |n| n.min(MAX_SLOTS))
        .max(MIN_SLOTS)
}

/// Map from transaction id to in-flight context.
///
/// # Layout
///
/// Primary storage is two parallel arrays (`keys`, `values`) whose length is
/// a power of two; a key lives in slot `key & (len - 1)`. A key whose slot is
/// already taken by a *different* key goes to an overflow [`HashMap`] and
/// stays there for as long as it is present, even if the slot is freed in
/// the meantime.
///
/// A freed slot keeps its stale key. Lookups always require a present value
/// as well as a matching key, so the stale key is never observed.
///
/// Transaction ids are expected to be roughly sequential, which spreads them
/// evenly over the slots and keeps the overflow map empty in steady state.
#[derive(Debug, Clone)]
pub struct CorrelationMap<V> {
    mask: u64,
    keys: Box<[u64]>,
    values: Box<[Option<V>]>,
    overflow: HashMap<u64, V>,
}

impl<V> CorrelationMap<V> {
    /// Creates a map sized for `min_size` concurrent ids.
    ///
    /// The slot count is `max(16, min_size.next_power_of_two() * 2)`, capped
    /// at [`MAX_SLOTS`].
    #[must_use]
    pub fn with_min_size(min_size: usize) -> Self {
        let slots = slot_count(min_size);

        Self {
            mask: slots as u64 - 1,
            keys: vec![0; slots].into_boxed_slice(),
            values: std::iter::repeat_with(|| None).take(slots).collect(),
            overflow: HashMap::new(),
        }
    }

    /// Number of primary slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Number of entries currently held in the overflow map.
    #[inline]
    #[must_use]
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// Number of entries. Walks every primary slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count() + self.overflow.len()
    }

    /// Returns `true` if the map holds no entries. Walks every primary slot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overflow.is_empty() && self.values.iter().all(Option::is_none)
    }

    #[inline]
    const fn slot(&self, key: u64) -> usize {
        (key & self.mask) as usize
    }

    /// Associates `value` with `key`, returning the value it replaced.
    pub fn put(&mut self, key: u64, value: V) -> Option<V> {
        let index = self.slot(key);
        if self.values[index].is_none() {
            self.keys[index] = key;
            self.values[index] = Some(value);
            // The key may still sit in overflow from when this slot was taken.
            if self.overflow.is_empty() {
                None
            } else {
                self.overflow.remove(&key)
            }
        } else if self.keys[index] == key {
            self.values[index].replace(value)
        } else {
            self.overflow.insert(key, value)
        }
    }

    /// Returns the value for `key`.
    #[inline]
    #[must_use]
    pub fn get(&self, key: u64) -> Option<&V> {
        let index = self.slot(key);
        if self.keys[index] == key
            && let Some(value) = &self.values[index]
        {
            return Some(value);
        }
        if self.overflow.is_empty() {
            None
        } else {
            self.overflow.get(&key)
        }
    }

    /// Returns a mutable reference to the value for `key`.
    #[inline]
    pub fn get_mut(&mut self, key: u64) -> Option<&mut V> {
        let index = self.slot(key);
        if self.keys[index] == key && self.values[index].is_some() {
            return self.values[index].as_mut();
        }
        self.overflow.get_mut(&key)
    }

    /// Removes `key`, returning its value.
    #[inline]
    pub fn remove(&mut self, key: u64) -> Option<V> {
        let index = self.slot(key);
        if self.keys[index] == key && self.values[index].is_some() {
            return self.values[index].take();
        }
        if self.overflow.is_empty() {
            None
        } else {
            self.overflow.remove(&key)
        }
    }

    /// Removes every entry for which `filter` returns `true`.
    pub fn remove_if<F>(&mut self, mut filter: F)
    where
        F: FnMut(u64, &V) -> bool,
    {
        for (key, value) in self.keys.iter().zip(self.values.iter_mut()) {
            if value.as_ref().is_some_and(|v| filter(*key, v)) {
                *value = None;
            }
        }
        self.overflow.retain(|key, value| !filter(*key, value));
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|v| *v = None);
        self.overflow.clear();
    }

    /// Calls `action` for every value, primary slots first. Order is unspecified.
    pub fn for_each_value<F>(&self, mut action: F)
    where
        F: FnMut(&V),
    {
        self.values.iter().flatten().for_each(&mut action);
        self.overflow.values().for_each(action);
    }

    /// Calls `action` for every key, primary slots first. Order is unspecified.
    pub fn for_each_key<F>(&self, mut action: F)
    where
        F: FnMut(u64),
    {
        for (key, value) in self.keys.iter().zip(self.values.iter()) {
            if value.is_some() {
                action(*key);
            }
        }
        self.overflow.keys().for_each(|key| action(*key));
    }
}
