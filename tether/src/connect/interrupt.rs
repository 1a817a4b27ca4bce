//! Cooperative interruption for blocking connect loops.
//!
//! An [`Interrupt`] is shared between the thread running
//! [`ConnectionStrategy::connect`](super::ConnectionStrategy::connect) and
//! whoever wants to cancel it. Raising it wakes a parked pause immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Thread};
use std::time::Duration;

use minstant::Instant;

#[derive(Debug, Default)]
struct Inner {
    raised: AtomicBool,
    /// Threads currently parked in [`Interrupt::park_timeout`].
    parked: Mutex<Vec<Thread>>,
}

/// Cloneable interruption flag.
///
/// All clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    inner: Arc<Inner>,
}

impl Interrupt {
    /// Creates a handle in the cleared state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every thread parked on this handle.
    pub fn interrupt(&self) {
        self.inner.raised.store(true, Ordering::Release);
        for thread in self.parked().iter() {
            thread.unpark();
        }
    }

    fn parked(&self) -> MutexGuard<'_, Vec<Thread>> {
        self.inner.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the flag is raised.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.inner.raised.swap(false, Ordering::AcqRel)
    }

    /// Re-raises the flag after a callee consumed an interruption.
    ///
    /// Unlike [`interrupt`](Self::interrupt) this does not unpark anyone;
    /// it only makes the state visible to the caller again.
    pub fn restore(&self) {
        self.inner.raised.store(true, Ordering::Release);
    }

    /// Parks the current thread for `duration` or until interrupted.
    ///
    /// Returns `true` if the pause ended because of an interrupt. The flag is
    /// left raised either way. Several threads may park on clones of the same
    /// handle; [`interrupt`](Self::interrupt) wakes all of them.
    pub fn park_timeout(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let current = thread::current();
        let id = current.id();
        self.parked().push(current);

        let interrupted = loop {
            if self.is_interrupted() {
                break true;
            }
            let now = Instant::now();
            if now >= deadline {
                break false;
            }
            thread::park_timeout(deadline - now);
        };

        let mut parked = self.parked();
        if let Some(pos) = parked.iter().position(|t| t.id() == id) {
            parked.swap_remove(pos);
        }
        interrupted
    }
}
