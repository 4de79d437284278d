//! Store change events.
//!
//! Payloads carry identifiers only. A subscriber checks whether the change is
//! relevant and pulls data itself via the store getters; curve points are
//! never pushed through the bus.

use std::collections::BTreeSet;

use super::event_bus::ChangeBus;

/// Curves whose points or metadata changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurvesChangedEvent {
    pub changed: BTreeSet<String>,
}

impl CurvesChangedEvent {
    pub fn contains(&self, curve: &str) -> bool {
        self.changed.contains(curve)
    }
}

/// Selection of one curve changed. `None` = all curves (bulk clear).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionChangedEvent {
    pub curve: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveCurveChangedEvent {
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameChangedEvent {
    pub frame: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TotalFramesChangedEvent {
    pub total: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSequenceChangedEvent;

/// Tagged union over all store events, used for pending merges and for
/// catch-all listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    CurvesChanged(CurvesChangedEvent),
    SelectionChanged(SelectionChangedEvent),
    ActiveCurveChanged(ActiveCurveChangedEvent),
    FrameChanged(FrameChangedEvent),
    ImageSequenceChanged(ImageSequenceChangedEvent),
    TotalFramesChanged(TotalFramesChangedEvent),
}

impl StoreEvent {
    pub fn curves<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StoreEvent::CurvesChanged(CurvesChangedEvent {
            changed: names.into_iter().map(Into::into).collect(),
        })
    }

    pub fn selection(curve: Option<&str>) -> Self {
        StoreEvent::SelectionChanged(SelectionChangedEvent { curve: curve.map(str::to_owned) })
    }

    pub fn active_curve(old: Option<String>, new: Option<String>) -> Self {
        StoreEvent::ActiveCurveChanged(ActiveCurveChangedEvent { old, new })
    }

    pub fn frame(frame: i32) -> Self {
        StoreEvent::FrameChanged(FrameChangedEvent { frame })
    }

    pub fn total_frames(total: i32) -> Self {
        StoreEvent::TotalFramesChanged(TotalFramesChangedEvent { total })
    }

    pub fn image_sequence() -> Self {
        StoreEvent::ImageSequenceChanged(ImageSequenceChangedEvent)
    }

    /// Event name as used in logs and debug panels.
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::CurvesChanged(_) => "curves_changed",
            StoreEvent::SelectionChanged(_) => "selection_changed",
            StoreEvent::ActiveCurveChanged(_) => "active_curve_changed",
            StoreEvent::FrameChanged(_) => "frame_changed",
            StoreEvent::ImageSequenceChanged(_) => "image_sequence_changed",
            StoreEvent::TotalFramesChanged(_) => "total_frames_changed",
        }
    }

    /// Position in the batch flush order:
    /// curves -> selection -> active curve -> frame -> image sequence -> total frames.
    pub fn flush_rank(&self) -> u8 {
        match self {
            StoreEvent::CurvesChanged(_) => 0,
            StoreEvent::SelectionChanged(_) => 1,
            StoreEvent::ActiveCurveChanged(_) => 2,
            StoreEvent::FrameChanged(_) => 3,
            StoreEvent::ImageSequenceChanged(_) => 4,
            StoreEvent::TotalFramesChanged(_) => 5,
        }
    }

    /// Emit the wrapped typed event on the bus.
    pub fn deliver(self, bus: &ChangeBus) {
        match self {
            StoreEvent::CurvesChanged(e) => bus.emit(e),
            StoreEvent::SelectionChanged(e) => bus.emit(e),
            StoreEvent::ActiveCurveChanged(e) => bus.emit(e),
            StoreEvent::FrameChanged(e) => bus.emit(e),
            StoreEvent::ImageSequenceChanged(e) => bus.emit(e),
            StoreEvent::TotalFramesChanged(e) => bus.emit(e),
        }
    }
}
