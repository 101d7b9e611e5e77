//! Zone tracker library
//!
//! Multi-object tracking over detector output with polygonal zone analytics.
//! Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
