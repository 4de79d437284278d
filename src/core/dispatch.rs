//! Hand-off from worker threads to the store's owner thread.
//!
//! Workers never touch the store. They send jobs through a [`DispatchSender`]
//! (cheap to clone, `Send`); the owner drains them with [`Dispatcher::pump`]
//! from its event loop, where each job runs against the store like any other
//! owner-thread caller.
//!
//! # Example
//! ```ignore
//! let tx = dispatcher.sender();
//! std::thread::spawn(move || {
//!     let points = track_feature(&frames);
//!     tx.send(move |store| store.set_curve_data("Track1", points, None)).ok();
//! });
//! // later, on the owner thread:
//! dispatcher.pump(&store)?;
//! ```

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, trace, warn};

use super::error::Result;
use super::store::Store;
use super::thread_guard::ThreadGuard;

type Job = Box<dyn FnOnce(&Store) -> Result<()> + Send + 'static>;

/// Error returned when the owner side has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("dispatcher closed: owner side dropped")]
pub struct DispatchClosed;

/// Worker-side handle.
#[derive(Clone)]
pub struct DispatchSender {
    tx: Sender<Job>,
}

impl std::fmt::Debug for DispatchSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchSender").field("queued", &self.tx.len()).finish()
    }
}

impl DispatchSender {
    /// Queue a job for the owner thread.
    pub fn send<F>(&self, job: F) -> std::result::Result<(), DispatchClosed>
    where
        F: FnOnce(&Store) -> Result<()> + Send + 'static,
    {
        self.tx.send(Box::new(job)).map_err(|_| DispatchClosed)
    }
}

/// Owner-side queue. Lives on the owner thread alongside the store.
pub struct Dispatcher {
    guard: ThreadGuard,
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("owner", &self.guard.owner())
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl Dispatcher {
    /// Dispatcher owned by the calling thread.
    pub fn new() -> Self {
        Self::with_guard(ThreadGuard::current())
    }

    pub fn with_guard(guard: ThreadGuard) -> Self {
        let (tx, rx) = unbounded();
        Self { guard, tx, rx }
    }

    pub fn sender(&self) -> DispatchSender {
        DispatchSender { tx: self.tx.clone() }
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Run queued jobs in submission order; returns how many ran.
    ///
    /// Stops at the first failing job and returns its error; later jobs stay
    /// queued for the next pump.
    pub fn pump(&self, store: &Store) -> Result<usize> {
        self.guard.check()?;
        store.guard().check()?;

        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(job) => {
                    trace!("Dispatch job {}", applied);
                    if let Err(e) = job(store) {
                        warn!("Dispatched job failed after {} applied: {}", applied, e);
                        return Err(e);
                    }
                    applied += 1;
                }
                // Dispatcher holds a sender, so the channel cannot disconnect
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if applied > 0 {
            debug!("Dispatcher applied {} jobs", applied);
        }
        Ok(applied)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::core::error::{StoreError, ValidationError};
    use crate::entities::Point;
    use std::thread;

    #[test]
    fn test_worker_results_applied_on_owner() {
        let store = Store::new(StoreConfig::default());
        let dispatcher = Dispatcher::new();

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let tx = dispatcher.sender();
                thread::spawn(move || {
                    let name = format!("Track{}", i);
                    let points = vec![Point::new(1, i as f64, 0.0)];
                    tx.send(move |s| s.set_curve_data(&name, points, None)).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(dispatcher.pending(), 3);
        assert_eq!(dispatcher.pump(&store).unwrap(), 3);
        assert_eq!(store.curve_count().unwrap(), 3);
        assert_eq!(dispatcher.pump(&store).unwrap(), 0);
    }

    #[test]
    fn test_pump_stops_at_failure() {
        let store = Store::new(StoreConfig::default());
        let dispatcher = Dispatcher::new();
        let tx = dispatcher.sender();

        tx.send(|s| s.set_curve_data("A", vec![Point::new(1, 0.0, 0.0)], None)).unwrap();
        tx.send(|s| s.set_curve_data("", Vec::new(), None)).unwrap();
        tx.send(|s| s.set_curve_data("B", Vec::new(), None)).unwrap();

        let err = dispatcher.pump(&store).unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::EmptyCurveName)));
        assert_eq!(store.curve_names().unwrap(), vec!["A".to_string()]);
        assert_eq!(dispatcher.pending(), 1);
        assert_eq!(dispatcher.pump(&store).unwrap(), 1);
    }

    #[test]
    fn test_closed_after_dispatcher_dropped() {
        let dispatcher = Dispatcher::new();
        let tx = dispatcher.sender();
        drop(dispatcher);
        assert_eq!(tx.send(|_| Ok(())), Err(DispatchClosed));
    }
}
