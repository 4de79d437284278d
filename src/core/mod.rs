//! Core state modules - store, batches, change bus, thread confinement
//!
//! These modules form the editor's data layer, independent of UI.

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod event_bus;
pub mod legacy;
pub mod store;
pub mod store_events;
pub mod thread_guard;

// Re-exports for convenience
pub use dispatch::{DispatchSender, Dispatcher};
pub use error::{Result, StoreError, ValidationError};
pub use event_bus::{ChangeBus, SubscriptionId};
pub use legacy::LegacyFacade;
pub use store::Store;
pub use store_events::{
    ActiveCurveChangedEvent, CurvesChangedEvent, FrameChangedEvent, ImageSequenceChangedEvent,
    SelectionChangedEvent, StoreEvent, TotalFramesChangedEvent,
};
pub use thread_guard::ThreadGuard;
