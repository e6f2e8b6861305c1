//! [`StateCell`] – the synchronized value every sensor entity lives in.
//!
//! The lock is held only for the duration of a single write or a single
//! clone, never across caller code.

use parking_lot::Mutex;

/// A `T` shared between one or more producer threads and the tick thread.
#[derive(Debug, Default)]
pub struct StateCell<T> {
    inner: Mutex<T>,
}

impl<T: Clone> StateCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Replace the stored value.
    pub fn set(&self, value: T) {
        *self.inner.lock() = value;
    }

    /// Mutate the stored value in place under the lock.
    ///
    /// `f` must not block; it runs while producers and readers wait.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    /// A point-in-time copy of the stored value.
    pub fn get(&self) -> T {
        self.inner.lock().clone()
    }
}
