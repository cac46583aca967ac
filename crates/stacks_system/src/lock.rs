//! The single-writer gate for transaction chains.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A non-blocking, compare-and-set lock.
///
/// Clones share the same state. [`Lock::try_acquire`] never waits: it either
/// flips the lock from unlocked to locked or reports that another chain is
/// still open.
#[derive(Debug, Clone, Default)]
pub struct Lock {
    locked: Arc<AtomicBool>,
}

impl Lock {
    /// Create an unlocked lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt the unlocked → locked transition.
    ///
    /// Returns `true` if this call took the lock.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the lock. Releasing an unlocked lock is harmless.
    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }

    /// Returns `true` while a chain holds the lock.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}
