//! Write lock serializing every ledger mutation.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::error::LockError;

/// Exclusive, non-recursive write lock backed by `Mutex` + `Condvar`.
///
/// The state records which thread holds the lock so a second acquisition
/// from the same thread fails with [`LockError::Recursive`] instead of
/// deadlocking. Share one lock between ledgers through an `Arc`.
pub struct WriteLock {
    holder: Mutex<Option<ThreadId>>,
    wake: Condvar,
}

impl WriteLock {
    pub fn new() -> Self {
        WriteLock {
            holder: Mutex::new(None),
            wake: Condvar::new(),
        }
    }

    /// Acquire the lock, blocking until it becomes available.
    pub fn write(&self) -> Result<WriteGuard<'_>, LockError> {
        let me = thread::current().id();
        let mut holder = self.state();
        if *holder == Some(me) {
            return Err(LockError::Recursive);
        }
        while holder.is_some() {
            holder = self
                .wake
                .wait(holder)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *holder = Some(me);
        Ok(WriteGuard { lock: self })
    }

    /// Try to acquire the lock without blocking.
    /// Returns `Ok(None)` if another thread holds it.
    pub fn try_write(&self) -> Result<Option<WriteGuard<'_>>, LockError> {
        let me = thread::current().id();
        let mut holder = self.state();
        match *holder {
            Some(owner) if owner == me => Err(LockError::Recursive),
            Some(_) => Ok(None),
            None => {
                *holder = Some(me);
                Ok(Some(WriteGuard { lock: self }))
            }
        }
    }

    /// Whether any thread currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.state().is_some()
    }

    fn state(&self) -> MutexGuard<'_, Option<ThreadId>> {
        // The inner mutex is only held for a few instructions and never
        // across user code, so a poisoned state is still consistent.
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        let mut holder = self.state();
        if holder.take().is_some() {
            self.wake.notify_one();
        }
    }
}

impl Default for WriteLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Scoped hold on a [`WriteLock`]; released on drop, including during unwinding.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a WriteLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
