// locks.rs — Per-key mutual exclusion for read-then-write on tracking records.
//
// Evaluating a course reads its record and then creates or deletes it. Two
// evaluations of the same key running at once could both see "untracked" and
// both insert, or both see an expired record and both report the course.
// Each store owns one `KeyLocks`; every evaluator over that store takes the
// key's guard around the whole sequence. Different keys never block each
// other.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::tracking::TrackingKey;

/// A set of currently held keys plus a condition variable to wait on.
#[derive(Debug, Default)]
pub struct KeyLocks {
    held: Mutex<HashSet<TrackingKey>>,
    released: Condvar,
}

/// Holds a key until dropped.
#[must_use = "the key is released as soon as the guard is dropped"]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: TrackingKey,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `key` is free, then hold it.
    pub fn lock(&self, key: TrackingKey) -> KeyGuard<'_> {
        let mut held = self.held_set();
        while held.contains(&key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key);
        KeyGuard { locks: self, key }
    }

    #[cfg(test)]
    fn is_held(&self, key: &TrackingKey) -> bool {
        self.held_set().contains(key)
    }

    // Poisoning is ignored: the set holds membership only.
    fn held_set(&self) -> MutexGuard<'_, HashSet<TrackingKey>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locks.held_set().remove(&self.key);
        self.locks.released.notify_all();
    }
}
