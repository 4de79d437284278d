//! Transaction bookkeeping: batch depth, pre-batch snapshot, merged pending events.
//!
//! While a batch is open, mutators still validate and mutate, but their events
//! are merged into [`PendingChanges`] instead of being delivered. Merging is
//! per event name (curve names are unioned), so three writes to "A", "B", "A"
//! flush as one `curves_changed {A, B}`.
//!
//! Only the outermost batch owns the snapshot. Closing it either flushes the
//! merged events in canonical order or, when the batch failed, hands the
//! snapshot back for a wholesale restore.

use std::collections::BTreeSet;

use log::trace;

use super::error::{Result, StoreError};
use super::store_events::StoreEvent;

/// Something that can absorb events while a batch is open.
pub trait Pending: Default {
    type Event;
    fn record(&mut self, event: Self::Event);
    fn is_empty(&self) -> bool;
}

/// Result of closing one batch level.
#[derive(Debug)]
pub enum BatchEnd<S, P> {
    /// Inner level closed, outer batch still open.
    Nested,
    /// Outermost level closed cleanly: deliver `pending`, `snapshot` is the baseline.
    Commit { snapshot: S, pending: P },
    /// Outermost level closed after an inner level failed: restore `snapshot`.
    Poisoned { snapshot: S },
}

#[derive(Debug)]
pub struct BatchCoordinator<S, P> {
    depth: usize,
    snapshot: Option<S>,
    pending: P,
    poisoned: bool,
}

impl<S, P: Pending> Default for BatchCoordinator<S, P> {
    fn default() -> Self {
        Self { depth: 0, snapshot: None, pending: P::default(), poisoned: false }
    }
}

impl<S, P: Pending> BatchCoordinator<S, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// An inner level failed; the outermost close will roll back.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Open a batch level. The snapshot closure only runs for the outermost level.
    pub fn begin(&mut self, take_snapshot: impl FnOnce() -> S) -> usize {
        if self.depth == 0 {
            self.snapshot = Some(take_snapshot());
            self.pending = P::default();
            self.poisoned = false;
        }
        self.depth += 1;
        trace!("Batch begin (depth {})", self.depth);
        self.depth
    }

    pub fn record(&mut self, event: P::Event) {
        self.pending.record(event);
    }

    /// Close a batch level on the success path.
    pub fn end(&mut self) -> Result<BatchEnd<S, P>> {
        if self.depth == 0 {
            return Err(StoreError::NotBatching);
        }
        self.depth -= 1;
        trace!("Batch end (depth {})", self.depth);
        if self.depth > 0 {
            return Ok(BatchEnd::Nested);
        }

        let pending = std::mem::take(&mut self.pending);
        let snapshot = self.snapshot.take().ok_or(StoreError::NotBatching)?;
        if std::mem::take(&mut self.poisoned) {
            return Ok(BatchEnd::Poisoned { snapshot });
        }
        Ok(BatchEnd::Commit { snapshot, pending })
    }

    /// Close a batch level on the failure path.
    ///
    /// Returns the snapshot to restore when this was the outermost level.
    /// An inner failure poisons the outer batch so it rolls back as well.
    pub fn abort(&mut self) -> Option<S> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        trace!("Batch abort (depth {})", self.depth);
        if self.depth > 0 {
            self.poisoned = true;
            return None;
        }
        self.pending = P::default();
        self.poisoned = false;
        self.snapshot.take()
    }
}

/// Values the flush compares against to drop no-op changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Baseline {
    pub active_curve: Option<String>,
    pub frame: i32,
    pub total_frames: i32,
}

/// Store events merged per event name.
#[derive(Debug, Default)]
pub struct PendingChanges {
    curves: BTreeSet<String>,
    selection: BTreeSet<String>,
    selection_all: bool,
    active_curve: Option<Option<String>>,
    frame: Option<i32>,
    image_sequence: bool,
    total_frames: Option<i32>,
}

impl Pending for PendingChanges {
    type Event = StoreEvent;

    fn record(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::CurvesChanged(e) => self.curves.extend(e.changed),
            StoreEvent::SelectionChanged(e) => match e.curve {
                Some(curve) => {
                    self.selection.insert(curve);
                }
                None => self.selection_all = true,
            },
            StoreEvent::ActiveCurveChanged(e) => self.active_curve = Some(e.new),
            StoreEvent::FrameChanged(e) => self.frame = Some(e.frame),
            StoreEvent::ImageSequenceChanged(_) => self.image_sequence = true,
            StoreEvent::TotalFramesChanged(e) => self.total_frames = Some(e.total),
        }
    }

    fn is_empty(&self) -> bool {
        self.curves.is_empty()
            && self.selection.is_empty()
            && !self.selection_all
            && self.active_curve.is_none()
            && self.frame.is_none()
            && !self.image_sequence
            && self.total_frames.is_none()
    }
}

impl PendingChanges {
    /// Merged events in flush order:
    /// curves -> selection -> active curve -> frame -> image sequence -> total frames.
    ///
    /// Scalar changes that ended where they started are dropped. A bulk
    /// selection clear subsumes the per-curve selection events.
    pub fn into_events(self, baseline: &Baseline) -> Vec<StoreEvent> {
        let mut events = Vec::new();

        if !self.curves.is_empty() {
            events.push(StoreEvent::curves(self.curves));
        }
        if self.selection_all {
            events.push(StoreEvent::selection(None));
        } else {
            events.extend(self.selection.iter().map(|c| StoreEvent::selection(Some(c.as_str()))));
        }
        if let Some(new) = self.active_curve {
            if new != baseline.active_curve {
                events.push(StoreEvent::active_curve(baseline.active_curve.clone(), new));
            }
        }
        if let Some(frame) = self.frame {
            if frame != baseline.frame {
                events.push(StoreEvent::frame(frame));
            }
        }
        if self.image_sequence {
            events.push(StoreEvent::image_sequence());
        }
        if let Some(total) = self.total_frames {
            if total != baseline.total_frames {
                events.push(StoreEvent::total_frames(total));
            }
        }

        debug_assert!(events.windows(2).all(|w| w[0].flush_rank() <= w[1].flush_rank()));
        events
    }
}
