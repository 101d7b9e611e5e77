//! Track registry: frame-to-frame identity association and track lifecycle
//!
//! The registry exclusively owns live tracks. Each `update` call:
//! - drops degenerate and low-confidence detections
//! - binds detections to live tracks by greedy nearest-neighbour matching
//! - ages unmatched tracks and evicts those past `max_disappeared_frames`
//! - creates a new track for every detection left over
//!
//! Track IDs are allocated from a per-registry counter and never reused.

mod association;

use crate::domain::error::CoreError;
use crate::domain::track::Track;
use crate::domain::types::{Detection, Point, TrackId};
use crate::services::geometry::centroid;
use association::greedy_match;
use std::collections::BTreeMap;
use tracing::debug;

/// Association and aging thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Maximum centroid distance (pixels) for a detection to continue a track
    pub max_match_distance: f64,
    /// Consecutive unmatched frames tolerated before eviction
    pub max_disappeared_frames: u32,
    /// Detections below this confidence are ignored
    pub min_confidence: f32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_match_distance: 50.0, max_disappeared_frames: 50, min_confidence: 0.0 }
    }
}

impl RegistryConfig {
    pub fn new(max_match_distance: f64, max_disappeared_frames: u32) -> Self {
        Self { max_match_distance, max_disappeared_frames, ..Self::default() }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.max_match_distance.is_finite() || self.max_match_distance <= 0.0 {
            return Err(CoreError::config(format!(
                "max_match_distance must be a positive number, got {}",
                self.max_match_distance
            )));
        }
        if self.max_disappeared_frames == 0 {
            return Err(CoreError::config("max_disappeared_frames must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CoreError::config(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        Ok(())
    }
}

/// Outcome of one registry update
#[derive(Debug, Default)]
pub struct RegistryUpdate {
    /// Existing tracks bound to a detection this frame, ascending
    pub matched: Vec<TrackId>,
    /// Tracks created this frame, ascending
    pub created: Vec<TrackId>,
    /// Tracks aged this frame but still live, ascending
    pub aging: Vec<TrackId>,
    /// Tracks evicted this frame, ascending; no longer in the registry
    pub removed: Vec<Track>,
    /// Detections dropped for degenerate geometry
    pub skipped_degenerate: usize,
    /// Detections dropped below `min_confidence`
    pub skipped_low_confidence: usize,
}

impl RegistryUpdate {
    /// Tracks whose position was refreshed this frame (matched + created), ascending
    pub fn refreshed(&self) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = self.matched.iter().chain(&self.created).copied().collect();
        ids.sort_unstable();
        ids
    }
}

/// Owner of all live tracks for one source
#[derive(Debug)]
pub struct TrackRegistry {
    tracks: BTreeMap<TrackId, Track>,
    next_track_id: u64,
    config: RegistryConfig,
}

impl TrackRegistry {
    pub fn new(config: RegistryConfig) -> Result<Self, CoreError> {
        config.validate()?;
        Ok(Self { tracks: BTreeMap::new(), next_track_id: 1, config })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Process the detections of one frame taken at `ts` (epoch ms)
    pub fn update(&mut self, detections: &[Detection], ts: u64) -> RegistryUpdate {
        let mut result = RegistryUpdate::default();

        let centroids = self.usable_centroids(detections, &mut result);

        let ids: Vec<TrackId> = self.tracks.keys().copied().collect();
        let positions: Vec<Point> = self.tracks.values().map(|t| t.centroid).collect();
        let association = greedy_match(&positions, &centroids, self.config.max_match_distance);

        for pairing in &association.pairings {
            let track_id = ids[pairing.track];
            if let Some(track) = self.tracks.get_mut(&track_id) {
                track.record_match(centroids[pairing.detection], ts);
                result.matched.push(track_id);
                debug!(
                    track_id = %track_id,
                    distance = format!("{:.1}", pairing.distance),
                    "track_matched"
                );
            }
        }
        result.matched.sort_unstable();

        for &idx in &association.unmatched_tracks {
            let track_id = ids[idx];
            let Some(track) = self.tracks.get_mut(&track_id) else { continue };
            let missed = track.record_miss();
            if missed > self.config.max_disappeared_frames {
                if let Some(track) = self.tracks.remove(&track_id) {
                    debug!(track_id = %track_id, missed = %missed, "track_evicted");
                    result.removed.push(track);
                }
            } else {
                result.aging.push(track_id);
            }
        }

        for &idx in &association.unmatched_detections {
            let track_id = self.allocate_id();
            self.tracks.insert(track_id, Track::new(track_id, centroids[idx], ts));
            result.created.push(track_id);
            debug!(
                track_id = %track_id,
                x = format!("{:.1}", centroids[idx].x),
                y = format!("{:.1}", centroids[idx].y),
                "track_created"
            );
        }

        result
    }

    /// Centroids of detections that pass the geometry and confidence checks
    fn usable_centroids(&self, detections: &[Detection], result: &mut RegistryUpdate) -> Vec<Point> {
        let mut centroids = Vec::with_capacity(detections.len());
        for (i, det) in detections.iter().enumerate() {
            if det.bbox.is_degenerate() {
                debug!(
                    index = %i,
                    width = %det.bbox.width,
                    height = %det.bbox.height,
                    "detection_skipped_degenerate"
                );
                result.skipped_degenerate += 1;
                continue;
            }
            if det.confidence.is_nan() || det.confidence < self.config.min_confidence {
                debug!(index = %i, confidence = %det.confidence, "detection_skipped_low_confidence");
                result.skipped_low_confidence += 1;
                continue;
            }
            centroids.push(centroid(&det.bbox));
        }
        centroids
    }

    fn allocate_id(&mut self) -> TrackId {
        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;
        id
    }

    /// Remove every live track, ascending, for session teardown
    pub fn drain(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.tracks).into_values().collect()
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Mutable access for zone bookkeeping
    pub fn get_mut(&mut self, track_id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&track_id)
    }

    /// Live tracks, ascending by id
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// The id the next created track will receive
    pub fn next_track_id(&self) -> TrackId {
        TrackId(self.next_track_id)
    }
}
