// Single-slot, overwrite-on-write hand-off cell
//
// The producer never blocks and never queues: a new value replaces whatever
// the consumer has not picked up yet.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value`; returns true if an unread value was dropped
    pub fn post(&self, value: T) -> bool {
        self.slot().replace(value).is_some()
    }

    /// Take the newest value, leaving the slot empty
    pub fn take(&self) -> Option<T> {
        self.slot().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot().is_none()
    }
}
