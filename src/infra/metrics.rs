//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! One `Metrics` instance is shared by every session in the process. It only
//! aggregates counts; no track or zone state lives here.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use crate::domain::types::ZoneId;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Maximum number of zones with an occupancy gauge
pub const MAX_ZONES: usize = 32;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Saturating decrement of a gauge
#[inline]
fn gauge_dec(gauge: &AtomicU64, by: u64) {
    let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(by)));
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps counters to get a consistent snapshot.
pub struct Metrics {
    /// Total frames processed (monotonic)
    frames_total: AtomicU64,
    /// Frames since last report (reset on report)
    frames_since_report: AtomicU64,
    /// Sum of frame latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max frame latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Frame processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Latency histogram for exposition (monotonic, never reset)
    latency_buckets_total: [AtomicU64; NUM_BUCKETS],
    /// Sum of all frame latencies in microseconds (monotonic)
    latency_sum_total_us: AtomicU64,
    /// Detections received, before filtering (monotonic)
    detections_total: AtomicU64,
    /// Detections dropped for degenerate geometry (monotonic)
    detections_degenerate: AtomicU64,
    /// Detections dropped below the confidence floor (monotonic)
    detections_low_confidence: AtomicU64,
    /// Input lines that failed to parse (monotonic)
    frames_malformed: AtomicU64,
    tracks_created: AtomicU64,
    tracks_removed: AtomicU64,
    zone_enters: AtomicU64,
    zone_exits: AtomicU64,
    /// Exits synthesized on track retirement (subset of zone_exits)
    synthetic_exits: AtomicU64,
    /// Records written by the egress writer (monotonic)
    egress_written: AtomicU64,
    /// Egress messages dropped due to channel full (monotonic)
    egress_dropped: AtomicU64,
    /// Egress write failures (monotonic)
    egress_errors: AtomicU64,
    /// Live tracks across all sessions
    active_tracks: AtomicU64,
    /// Sessions currently running
    active_sessions: AtomicU64,
    /// Zone occupancy summed over sessions, indexed via `zone_id_to_index`
    zone_occupancy: [AtomicU64; MAX_ZONES],
    /// Zone IDs in gauge order (set at init and on reload)
    zone_ids: parking_lot::Mutex<Vec<ZoneId>>,
    /// Pre-computed zone ID to index mapping (for O(1) lookup without mutex)
    zone_id_to_index: parking_lot::RwLock<FxHashMap<ZoneId, usize>>,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_buckets_total: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_total_us: AtomicU64::new(0),
            detections_total: AtomicU64::new(0),
            detections_degenerate: AtomicU64::new(0),
            detections_low_confidence: AtomicU64::new(0),
            frames_malformed: AtomicU64::new(0),
            tracks_created: AtomicU64::new(0),
            tracks_removed: AtomicU64::new(0),
            zone_enters: AtomicU64::new(0),
            zone_exits: AtomicU64::new(0),
            synthetic_exits: AtomicU64::new(0),
            egress_written: AtomicU64::new(0),
            egress_dropped: AtomicU64::new(0),
            egress_errors: AtomicU64::new(0),
            active_tracks: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            zone_occupancy: std::array::from_fn(|_| AtomicU64::new(0)),
            zone_ids: parking_lot::Mutex::new(Vec::new()),
            zone_id_to_index: parking_lot::RwLock::new(FxHashMap::default()),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Set the zones that get an occupancy gauge
    ///
    /// Gauges of zones that remain configured keep their value; new zones start at 0.
    pub fn set_zones(&self, zone_ids: &[ZoneId]) {
        let mut zones = self.zone_ids.lock();
        let mut index_map = self.zone_id_to_index.write();

        let previous: FxHashMap<ZoneId, u64> = zones
            .iter()
            .enumerate()
            .map(|(idx, &id)| (id, self.zone_occupancy[idx].load(Ordering::Relaxed)))
            .collect();

        zones.clear();
        index_map.clear();
        for (idx, &zone_id) in zone_ids.iter().take(MAX_ZONES).enumerate() {
            zones.push(zone_id);
            index_map.insert(zone_id, idx);
            let carried = previous.get(&zone_id).copied().unwrap_or(0);
            self.zone_occupancy[idx].store(carried, Ordering::Relaxed);
        }
        for gauge in &self.zone_occupancy[zones.len()..] {
            gauge.store(0, Ordering::Relaxed);
        }
    }

    /// Get the index for a zone ID, or None if the zone has no gauge
    #[inline]
    fn zone_index(&self, zone_id: ZoneId) -> Option<usize> {
        let index_map = self.zone_id_to_index.read();
        index_map.get(&zone_id).copied()
    }

    #[inline]
    pub fn record_zone_enter(&self, zone_id: ZoneId) {
        self.zone_enters.fetch_add(1, Ordering::Relaxed);
        if let Some(idx) = self.zone_index(zone_id) {
            self.zone_occupancy[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_zone_exit(&self, zone_id: ZoneId, synthetic: bool) {
        self.zone_exits.fetch_add(1, Ordering::Relaxed);
        if synthetic {
            self.synthetic_exits.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(idx) = self.zone_index(zone_id) {
            gauge_dec(&self.zone_occupancy[idx], 1);
        }
    }

    /// Current occupancy for all gauged zones
    pub fn zone_occupancy(&self) -> Vec<(ZoneId, u64)> {
        let zones = self.zone_ids.lock();
        zones
            .iter()
            .enumerate()
            .map(|(idx, &zone_id)| (zone_id, self.zone_occupancy[idx].load(Ordering::Relaxed)))
            .collect()
    }

    /// Record a frame was processed with given latency (lock-free)
    #[inline]
    pub fn record_frame_processed(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        self.latency_sum_total_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.latency_buckets_total[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    /// Record the detection counts of one frame
    #[inline]
    pub fn record_detections(&self, received: usize, degenerate: usize, low_confidence: usize) {
        self.detections_total.fetch_add(received as u64, Ordering::Relaxed);
        self.detections_degenerate.fetch_add(degenerate as u64, Ordering::Relaxed);
        self.detections_low_confidence.fetch_add(low_confidence as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_frame_malformed(&self) {
        self.frames_malformed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tracks_created(&self, count: usize) {
        self.tracks_created.fetch_add(count as u64, Ordering::Relaxed);
        self.active_tracks.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_tracks_removed(&self, count: usize) {
        self.tracks_removed.fetch_add(count as u64, Ordering::Relaxed);
        gauge_dec(&self.active_tracks, count as u64);
    }

    #[inline]
    pub fn session_started(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_finished(&self) {
        gauge_dec(&self.active_sessions, 1);
    }

    #[inline]
    pub fn record_egress_written(&self) {
        self.egress_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an egress message dropped due to channel full (lock-free)
    #[inline]
    pub fn record_egress_dropped(&self) {
        self.egress_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_egress_error(&self) {
        self.egress_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn active_tracks(&self) -> u64 {
        self.active_tracks.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn egress_dropped(&self) -> u64 {
        self.egress_dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn egress_written(&self) -> u64 {
        self.egress_written.load(Ordering::Relaxed)
    }

    /// Calculate and return metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };
        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        self.summarize(frames_count, latency_sum, max_latency, lat_buckets, frames_per_sec)
    }

    /// Cumulative latency histogram since startup; unaffected by `report()`
    pub fn latency_histogram(&self) -> LatencyHistogram {
        LatencyHistogram {
            buckets: load_buckets(&self.latency_buckets_total),
            sum_us: self.latency_sum_total_us.load(Ordering::Relaxed),
        }
    }

    /// Summary of the current state without resetting anything (for scrapes)
    pub fn peek(&self) -> MetricsSummary {
        let frames_count = self.frames_since_report.load(Ordering::Relaxed);
        self.summarize(
            frames_count,
            self.latency_sum_us.load(Ordering::Relaxed),
            self.latency_max_us.load(Ordering::Relaxed),
            load_buckets(&self.latency_buckets),
            0.0,
        )
    }

    fn summarize(
        &self,
        frames_count: u64,
        latency_sum: u64,
        max_latency: u64,
        lat_buckets: [u64; NUM_BUCKETS],
        frames_per_sec: f64,
    ) -> MetricsSummary {
        let avg_latency = if frames_count > 0 { latency_sum / frames_count } else { 0 };

        MetricsSummary {
            frames_total: self.frames_total.load(Ordering::Relaxed),
            frames_per_sec,
            avg_frame_latency_us: avg_latency,
            max_frame_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            detections_total: self.detections_total.load(Ordering::Relaxed),
            detections_degenerate: self.detections_degenerate.load(Ordering::Relaxed),
            detections_low_confidence: self.detections_low_confidence.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            tracks_created: self.tracks_created.load(Ordering::Relaxed),
            tracks_removed: self.tracks_removed.load(Ordering::Relaxed),
            zone_enters: self.zone_enters.load(Ordering::Relaxed),
            zone_exits: self.zone_exits.load(Ordering::Relaxed),
            synthetic_exits: self.synthetic_exits.load(Ordering::Relaxed),
            egress_written: self.egress_written.load(Ordering::Relaxed),
            egress_dropped: self.egress_dropped.load(Ordering::Relaxed),
            egress_errors: self.egress_errors.load(Ordering::Relaxed),
            active_tracks: self.active_tracks.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Monotonic latency histogram, as exposed to Prometheus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyHistogram {
    pub buckets: [u64; NUM_BUCKETS],
    pub sum_us: u64,
}

impl LatencyHistogram {
    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub frames_total: u64,
    pub frames_per_sec: f64,
    pub avg_frame_latency_us: u64,
    pub max_frame_latency_us: u64,
    /// Frame processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 95th percentile latency (µs)
    pub lat_p95_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    pub detections_total: u64,
    pub detections_degenerate: u64,
    pub detections_low_confidence: u64,
    pub frames_malformed: u64,
    pub tracks_created: u64,
    pub tracks_removed: u64,
    pub zone_enters: u64,
    pub zone_exits: u64,
    pub synthetic_exits: u64,
    pub egress_written: u64,
    pub egress_dropped: u64,
    pub egress_errors: u64,
    pub active_tracks: u64,
    pub active_sessions: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_total,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_frame_latency_us,
            max_latency_us = %self.max_frame_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            active_tracks = %self.active_tracks,
            sessions = %self.active_sessions,
            enters = %self.zone_enters,
            exits = %self.zone_exits,
            egress_dropped = %self.egress_dropped,
            "metrics"
        );
    }
}
