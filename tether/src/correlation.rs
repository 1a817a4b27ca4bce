//! Transaction-id correlation.
//!
//! Responses arriving on a connection carry the 64-bit id of the request they
//! answer. [`CorrelationMap`] holds the in-flight context for each id until
//! the response is matched, with no allocation in steady state as long as
//! ids are handed out roughly in sequence.

mod map;
mod shared;

pub use map::{CorrelationMap, MAX_SLOTS, MIN_SLOTS};
pub use shared::SyncCorrelationMap;

/// Creates a single-threaded map with room for at least `min_size` ids.
#[must_use]
pub fn create<V>(min_size: usize) -> CorrelationMap<V> {
    CorrelationMap::with_min_size(min_size)
}

/// Creates a map shareable across threads with room for at least `min_size`
/// ids.
#[must_use]
pub fn create_synchronized<V>(min_size: usize) -> SyncCorrelationMap<V> {
    SyncCorrelationMap::with_min_size(min_size)
}
