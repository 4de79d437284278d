//! Entities module - plain data types owned by the store
//!
//! Nothing here knows about events, batching or threads; the store in
//! `crate::core` wraps these types and is the only place they are mutated.

pub mod curve;
pub mod image_sequence;
pub mod point;

pub use curve::CurveMetadata;
pub use image_sequence::ImageSequence;
pub use point::{normalize_points, Point, PointStatus};
