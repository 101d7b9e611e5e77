//! Errors raised by the tracking core

use crate::domain::types::ZoneId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// Polygon with fewer than 3 vertices or non-finite coordinates
    #[error("invalid zone geometry ({}): {reason}", zone_label(.zone_id))]
    InvalidZoneGeometry { zone_id: Option<ZoneId>, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn zone_label(zone_id: &Option<ZoneId>) -> String {
    match zone_id {
        Some(id) => format!("zone {id}"),
        None => "unbound polygon".to_string(),
    }
}

impl CoreError {
    pub(crate) fn geometry(zone_id: Option<ZoneId>, reason: impl Into<String>) -> Self {
        CoreError::InvalidZoneGeometry { zone_id, reason: reason.into() }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        CoreError::InvalidConfiguration(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::geometry(Some(ZoneId(4)), "needs at least 3 vertices, got 2");
        assert_eq!(
            err.to_string(),
            "invalid zone geometry (zone 4): needs at least 3 vertices, got 2"
        );
        let err = CoreError::config("max_match_distance must be > 0");
        assert_eq!(err.to_string(), "invalid configuration: max_match_distance must be > 0");
    }
}
