//! Services - tracking logic and per-session state
//!
//! This module contains the core services:
//! - `geometry` - Centroids, distances and point-in-polygon tests
//! - `zone_index` - Validated zone set with containment lookup
//! - `registry` - Track registry with greedy nearest-centroid association
//! - `zone_stats` - Per-zone visitor, occupancy and dwell statistics
//! - `aggregator` - Zone membership diffing and ENTER/EXIT emission
//! - `orchestrator` - Per-session frame sequencing and summaries

pub mod aggregator;
pub mod geometry;
pub mod orchestrator;
pub mod registry;
pub mod zone_index;
pub mod zone_stats;

// Re-export commonly used types
pub use aggregator::ZoneAggregator;
pub use orchestrator::{FrameOrchestrator, FrameOutput, SessionSummary};
pub use registry::{RegistryConfig, TrackRegistry};
pub use zone_index::ZoneIndex;
pub use zone_stats::ZoneStats;
