//! CURVEDIT - state core for a motion-tracking curve editor
//!
//! Owns curve data, selections, the active curve and frame/image-sequence
//! state; UI panels, timeline, renderer and undo collaborators observe it
//! through change events and pull copies through getters.

// Core state (store, batches, events, thread confinement)
pub mod core;

// App modules
pub mod app;
pub mod config;
pub mod entities;
pub mod paths;
pub mod prefs;

// Re-export commonly used types from core
pub use crate::core::event_bus::{downcast_event, ChangeBus, Event, SubscriptionId};
pub use crate::core::store_events::{
    ActiveCurveChangedEvent, CurvesChangedEvent, FrameChangedEvent, ImageSequenceChangedEvent,
    SelectionChangedEvent, StoreEvent, TotalFramesChangedEvent,
};
pub use crate::core::{Dispatcher, LegacyFacade, Store, StoreError, ThreadGuard, ValidationError};

// Re-export entities
pub use config::StoreConfig;
pub use entities::{CurveMetadata, ImageSequence, Point, PointStatus};
pub use prefs::{UiPreferenceLayer, UiPreferences};
