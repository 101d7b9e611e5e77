//! Per-zone visit statistics for one session
//!
//! Fed by the aggregator with every ENTER/EXIT it emits:
//! - ENTER counts a visitor and raises occupancy
//! - EXIT (live or synthetic) closes a visit and accumulates its dwell
//!
//! Stats survive zone reloads; a zone removed from the index keeps its
//! history but receives no further events once its occupants have exited.

use crate::domain::types::{format_duration, Zone, ZoneId};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters for a single zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStats {
    pub zone_id: ZoneId,
    pub name: String,
    pub zone_type: String,
    /// ENTER events seen
    pub visitors: u64,
    /// Tracks currently inside
    pub occupancy: u64,
    /// EXIT events seen, synthetic ones included
    pub completed_visits: u64,
    pub total_dwell_ms: u64,
}

impl ZoneStats {
    fn new(zone_id: ZoneId) -> Self {
        Self {
            zone_id,
            name: String::new(),
            zone_type: String::new(),
            visitors: 0,
            occupancy: 0,
            completed_visits: 0,
            total_dwell_ms: 0,
        }
    }

    /// Mean dwell of completed visits (ms), 0 when none completed
    pub fn avg_dwell_ms(&self) -> u64 {
        if self.completed_visits == 0 {
            0
        } else {
            self.total_dwell_ms / self.completed_visits
        }
    }

    pub fn avg_dwell_display(&self) -> String {
        format_duration(self.avg_dwell_ms())
    }
}

/// Statistics keyed by zone id
#[derive(Debug, Clone, Default)]
pub struct ZoneStatsBook {
    zones: BTreeMap<ZoneId, ZoneStats>,
}

impl ZoneStatsBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register zone metadata; existing counters are kept
    pub fn register<'a>(&mut self, zones: impl IntoIterator<Item = &'a Zone>) {
        for zone in zones {
            let stats = self.zones.entry(zone.id).or_insert_with(|| ZoneStats::new(zone.id));
            stats.name = zone.display_name();
            stats.zone_type = zone.zone_type.clone();
        }
    }

    pub fn record_enter(&mut self, zone_id: ZoneId) {
        let stats = self.zones.entry(zone_id).or_insert_with(|| ZoneStats::new(zone_id));
        stats.visitors += 1;
        stats.occupancy += 1;
    }

    pub fn record_exit(&mut self, zone_id: ZoneId, dwell_ms: u64) {
        let stats = self.zones.entry(zone_id).or_insert_with(|| ZoneStats::new(zone_id));
        stats.occupancy = stats.occupancy.saturating_sub(1);
        stats.completed_visits += 1;
        stats.total_dwell_ms += dwell_ms;
    }

    pub fn get(&self, zone_id: ZoneId) -> Option<&ZoneStats> {
        self.zones.get(&zone_id)
    }

    /// All zones, ascending by id
    pub fn iter(&self) -> impl Iterator<Item = &ZoneStats> {
        self.zones.values()
    }

    /// Owned copy of all zone stats, ascending by id
    pub fn snapshot(&self) -> Vec<ZoneStats> {
        self.zones.values().cloned().collect()
    }
}
