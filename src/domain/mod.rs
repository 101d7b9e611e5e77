//! Domain models - core tracking types
//!
//! This module contains the canonical data types used throughout the system:
//! - `Detection` / `DetectionFrame` - detector output consumed per frame
//! - `Zone` - configured polygonal region of interest
//! - `Track` - a persistent identity, with live snapshots and terminal records
//! - `TrackingEvent` - zone enter/exit transitions
//! - `CoreError` - configuration and geometry failures

pub mod error;
pub mod track;
pub mod types;

pub use error::CoreError;
pub use track::{Track, TrackRecord, TrackSnapshot, TrackStatus};
pub use types::{
    BoundingBox, Detection, DetectionFrame, EventKind, Point, TrackId, TrackingEvent, Zone, ZoneId,
};
