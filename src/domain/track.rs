//! Track data model: live tracks, per-frame snapshots and terminal visit records

use crate::domain::types::{Point, TrackId, ZoneId};
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Zone membership set, kept sorted by zone id
pub type ZoneSet = SmallVec<[ZoneId; 4]>;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Track lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackStatus {
    /// Matched in the most recent frame (new tracks start here)
    Active,
    /// Unmatched for at least one frame, still within the grace period
    Aging,
    /// Evicted; terminal
    Removed,
}

/// A persistent identity for one person, owned by the track registry
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: TrackId,
    /// Visit ID (UUIDv7), stable for the lifetime of the track
    pub vid: String,
    pub centroid: Point,
    /// Every matched centroid, oldest first
    pub path: Vec<Point>,
    pub disappeared_count: u32,
    pub status: TrackStatus,
    /// Whether a detection was bound to this track in the latest update
    pub matched: bool,
    pub current_zone_ids: ZoneSet,
    /// Entry timestamp (epoch ms) for each zone currently occupied
    pub zone_entry_time: BTreeMap<ZoneId, u64>,
    /// Accumulated dwell per zone (ms), updated on exit
    pub total_dwell_ms: BTreeMap<ZoneId, u64>,
    /// Zones in first-entry order
    pub zones_visited: ZoneSet,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub frames_matched: u64,
}

impl Track {
    pub fn new(track_id: TrackId, centroid: Point, ts: u64) -> Self {
        Self {
            track_id,
            vid: new_uuid_v7(),
            centroid,
            path: vec![centroid],
            disappeared_count: 0,
            status: TrackStatus::Active,
            matched: true,
            current_zone_ids: ZoneSet::new(),
            zone_entry_time: BTreeMap::new(),
            total_dwell_ms: BTreeMap::new(),
            zones_visited: ZoneSet::new(),
            first_seen_ms: ts,
            last_seen_ms: ts,
            frames_matched: 1,
        }
    }

    /// Bind a detection centroid to this track
    pub(crate) fn record_match(&mut self, centroid: Point, ts: u64) {
        self.centroid = centroid;
        self.path.push(centroid);
        self.disappeared_count = 0;
        self.status = TrackStatus::Active;
        self.matched = true;
        self.last_seen_ms = ts;
        self.frames_matched += 1;
    }

    /// Age the track by one unmatched frame; returns the new disappeared count
    pub(crate) fn record_miss(&mut self) -> u32 {
        self.disappeared_count += 1;
        self.status = TrackStatus::Aging;
        self.matched = false;
        self.disappeared_count
    }

    /// Record zone entry at `ts`
    pub(crate) fn enter_zone(&mut self, zone_id: ZoneId, ts: u64) {
        self.zone_entry_time.insert(zone_id, ts);
        if !self.zones_visited.contains(&zone_id) {
            self.zones_visited.push(zone_id);
        }
    }

    /// Record zone exit at `ts`, accumulating dwell. Returns the session dwell in ms.
    ///
    /// Timestamps that run backwards yield a zero-length session.
    pub(crate) fn exit_zone(&mut self, zone_id: ZoneId, ts: u64) -> u64 {
        let session_ms = self
            .zone_entry_time
            .remove(&zone_id)
            .map(|entered| ts.saturating_sub(entered))
            .unwrap_or(0);
        *self.total_dwell_ms.entry(zone_id).or_insert(0) += session_ms;
        session_ms
    }

    /// Accumulated dwell in a zone, in seconds
    pub fn dwell_secs(&self, zone_id: ZoneId) -> f64 {
        self.total_dwell_ms.get(&zone_id).copied().unwrap_or(0) as f64 / 1000.0
    }

    #[inline]
    pub fn in_zone(&self, zone_id: ZoneId) -> bool {
        self.current_zone_ids.contains(&zone_id)
    }

    /// Live snapshot including the last `tail_len` path points
    pub fn snapshot(&self, tail_len: usize) -> TrackSnapshot {
        let start = self.path.len().saturating_sub(tail_len);
        TrackSnapshot {
            track_id: self.track_id,
            centroid: self.centroid,
            path_tail: self.path[start..].to_vec(),
            zones: self.current_zone_ids.to_vec(),
            status: self.status,
            matched: self.matched,
            disappeared_count: self.disappeared_count,
        }
    }

    /// Consume the track into its terminal visit record
    pub fn into_record(mut self, removed_at_ms: u64) -> TrackRecord {
        self.status = TrackStatus::Removed;
        TrackRecord {
            vid: self.vid,
            track_id: self.track_id,
            first_seen_ms: self.first_seen_ms,
            last_seen_ms: self.last_seen_ms,
            removed_at_ms,
            duration_ms: self.last_seen_ms.saturating_sub(self.first_seen_ms),
            frames_matched: self.frames_matched,
            zones_visited: self.zones_visited.to_vec(),
            dwell_ms: self.total_dwell_ms,
            path: self.path,
        }
    }
}

/// Per-frame view of a live track, for broadcast consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    pub track_id: TrackId,
    pub centroid: Point,
    pub path_tail: Vec<Point>,
    pub zones: Vec<ZoneId>,
    pub status: TrackStatus,
    pub matched: bool,
    pub disappeared_count: u32,
}

/// Terminal snapshot of a retired track, for archival as a visit record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub vid: String,
    pub track_id: TrackId,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub removed_at_ms: u64,
    pub duration_ms: u64,
    pub frames_matched: u64,
    pub zones_visited: Vec<ZoneId>,
    pub dwell_ms: BTreeMap<ZoneId, u64>,
    pub path: Vec<Point>,
}

impl TrackRecord {
    /// Total dwell across all zones (ms)
    pub fn total_dwell_ms(&self) -> u64 {
        self.dwell_ms.values().sum()
    }
}
