//! Zone analytics aggregator
//!
//! Turns registry updates into zone transitions. Only tracks whose position
//! was refreshed this frame (matched or created) are re-resolved against the
//! zone index; aging tracks keep their last zone state untouched.
//!
//! Event order within a frame:
//! 1. synthetic EXITs of tracks evicted this frame, ascending track id
//! 2. live transitions, ascending track id; per track all EXITs before
//!    ENTERs, each ascending by zone id

use crate::domain::error::CoreError;
use crate::domain::track::{Track, TrackRecord, ZoneSet};
use crate::domain::types::{format_duration, TrackingEvent, Zone, ZoneId};
use crate::services::registry::{RegistryUpdate, TrackRegistry};
use crate::services::zone_index::ZoneIndex;
use crate::services::zone_stats::ZoneStatsBook;
use tracing::{debug, info};

/// Events and retired tracks produced by one aggregation round
#[derive(Debug, Default)]
pub struct Aggregation {
    pub events: Vec<TrackingEvent>,
    pub retired: Vec<TrackRecord>,
}

pub struct ZoneAggregator {
    index: ZoneIndex,
    stats: ZoneStatsBook,
}

impl ZoneAggregator {
    pub fn new(index: ZoneIndex) -> Self {
        let mut stats = ZoneStatsBook::new();
        stats.register(index.zones());
        Self { index, stats }
    }

    pub fn index(&self) -> &ZoneIndex {
        &self.index
    }

    pub fn stats(&self) -> &ZoneStatsBook {
        &self.stats
    }

    /// Swap the zone configuration between frames
    ///
    /// Tracks inside a zone that no longer exists exit it on their next
    /// matched frame, or when they are retired.
    pub fn reload_zones(&mut self, zones: Vec<Zone>) -> Result<(), CoreError> {
        self.index.reload_zones(zones)?;
        self.stats.register(self.index.zones());
        Ok(())
    }

    /// Apply one registry update: retire evicted tracks, then diff refreshed ones
    pub fn apply(
        &mut self,
        registry: &mut TrackRegistry,
        update: RegistryUpdate,
        ts: u64,
    ) -> Aggregation {
        let mut out = Aggregation::default();

        let refreshed = update.refreshed();
        for track in update.removed {
            out.retired.push(self.retire_track(track, ts, &mut out.events));
        }

        for track_id in refreshed {
            if let Some(track) = registry.get_mut(track_id) {
                self.update_track(track, ts, &mut out.events);
            }
        }

        out
    }

    /// Re-resolve one track's zones and emit its transitions
    pub fn update_track(&mut self, track: &mut Track, ts: u64, events: &mut Vec<TrackingEvent>) {
        let new_zones = self.index.zones_containing(track.centroid);
        if new_zones == track.current_zone_ids {
            return;
        }

        let exited: ZoneSet =
            track.current_zone_ids.iter().filter(|z| !new_zones.contains(z)).copied().collect();
        let entered: ZoneSet =
            new_zones.iter().filter(|z| !track.current_zone_ids.contains(z)).copied().collect();

        for zone_id in exited {
            events.push(self.exit(track, zone_id, ts));
        }

        for zone_id in entered {
            track.enter_zone(zone_id, ts);
            self.stats.record_enter(zone_id);
            debug!(track_id = %track.track_id, zone_id = %zone_id, "zone_enter");
            events.push(
                TrackingEvent::enter(track.track_id, zone_id, ts, track.centroid)
                    .with_zone_name(self.zone_name(zone_id)),
            );
        }

        track.current_zone_ids = new_zones;
    }

    /// Close every open zone visit of a removed track and archive it
    pub fn retire_track(
        &mut self,
        mut track: Track,
        ts: u64,
        events: &mut Vec<TrackingEvent>,
    ) -> TrackRecord {
        let open = std::mem::take(&mut track.current_zone_ids);
        for zone_id in open {
            events.push(self.exit(&mut track, zone_id, ts).into_synthetic());
        }

        let record = track.into_record(ts);
        info!(
            track_id = %record.track_id,
            vid = %record.vid,
            duration = %format_duration(record.duration_ms),
            zones = %record.zones_visited.len(),
            frames = %record.frames_matched,
            "track_removed"
        );
        record
    }

    fn exit(&mut self, track: &mut Track, zone_id: ZoneId, ts: u64) -> TrackingEvent {
        let dwell_ms = track.exit_zone(zone_id, ts);
        self.stats.record_exit(zone_id, dwell_ms);
        debug!(
            track_id = %track.track_id,
            zone_id = %zone_id,
            dwell = %format_duration(dwell_ms),
            "zone_exit"
        );
        TrackingEvent::exit(track.track_id, zone_id, ts, track.centroid, dwell_ms)
            .with_zone_name(self.zone_name(zone_id))
    }

    /// Name from the stats book so zones dropped by a reload keep their label
    fn zone_name(&self, zone_id: ZoneId) -> String {
        match self.stats.get(zone_id) {
            Some(stats) if !stats.name.is_empty() => stats.name.clone(),
            _ => self.index.zone_name(zone_id),
        }
    }
}
