//! Owner-thread assertion for the state core.
//!
//! The store is *thread-confined*, not thread-safe: its maps carry no locks and
//! are only ever touched from the thread that created it. Every entry point
//! calls [`ThreadGuard::check`] first. Work produced on other threads must go
//! through [`crate::core::dispatch`] and be applied by the owner.

use std::thread::{self, ThreadId};

use log::error;

use super::error::{Result, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadGuard {
    owner: ThreadId,
}

impl ThreadGuard {
    /// Register the calling thread as owner.
    pub fn current() -> Self {
        Self { owner: thread::current().id() }
    }

    /// Register an explicit owner (e.g. the UI thread handed over at startup).
    pub fn for_thread(owner: ThreadId) -> Self {
        Self { owner }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_owner(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Fails with `ThreadConfinement` when called off the owner thread.
    #[inline]
    pub fn check(&self) -> Result<()> {
        let actual = thread::current().id();
        if actual == self.owner {
            return Ok(());
        }
        error!(
            "Thread confinement violated: {:?} ({}) touched state owned by {:?}",
            actual,
            thread::current().name().unwrap_or("<unnamed>"),
            self.owner
        );
        Err(StoreError::ThreadConfinement { expected: self.owner, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_passes() {
        let guard = ThreadGuard::current();
        assert!(guard.is_owner());
        assert!(guard.check().is_ok());
    }

    #[test]
    fn test_other_thread_rejected() {
        let guard = ThreadGuard::current();
        let owner = guard.owner();

        let result = thread::spawn(move || guard.check()).join().unwrap();
        match result {
            Err(StoreError::ThreadConfinement { expected, actual }) => {
                assert_eq!(expected, owner);
                assert_ne!(actual, owner);
            }
            other => panic!("expected confinement error, got {:?}", other),
        }
    }

    #[test]
    fn test_for_thread_rejects_caller() {
        let worker_id = thread::spawn(|| thread::current().id()).join().unwrap();
        let guard = ThreadGuard::for_thread(worker_id);
        assert!(!guard.is_owner());
        assert!(guard.check().is_err());
    }
}
