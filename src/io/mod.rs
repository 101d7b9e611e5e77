//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `frame_source` - JSONL detection frame reader with frame sampling
//! - `egress_channel` - Typed channel for egress messages
//! - `egress` - Event, track and summary output to files (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod egress;
pub mod egress_channel;
pub mod frame_source;
pub mod prometheus;

// Re-export commonly used types
pub use egress::Egress;
pub use egress_channel::{create_egress_channel, EgressMessage, EgressSender};
pub use frame_source::{FrameSource, SourceStats};
