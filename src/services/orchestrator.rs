//! Frame orchestrator - per-session sequencing of registry and aggregator
//!
//! One orchestrator owns everything a source needs: its own registry (and
//! therefore its own track id counter), its own zone index and statistics.
//! Sessions share nothing except the process-wide `Metrics`.
//!
//! Frames are processed strictly in order; `process` completes association,
//! aging, zone diffing and event emission before returning.

use crate::domain::error::CoreError;
use crate::domain::track::{new_uuid_v7, TrackRecord, TrackSnapshot};
use crate::domain::types::{format_duration, DetectionFrame, EventKind, TrackingEvent, Zone};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::EgressSender;
use crate::services::aggregator::ZoneAggregator;
use crate::services::registry::{RegistryConfig, TrackRegistry};
use crate::services::zone_index::ZoneIndex;
use crate::services::zone_stats::ZoneStats;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Default number of path points in live snapshots
pub const DEFAULT_PATH_TAIL_LEN: usize = 16;

/// Everything one frame produced
#[derive(Debug, Clone, Default)]
pub struct FrameOutput {
    pub frame_index: u64,
    pub ts: u64,
    /// Ordered ENTER/EXIT events
    pub events: Vec<TrackingEvent>,
    /// All live tracks after the update, ascending by id
    pub live: Vec<TrackSnapshot>,
    /// Tracks retired this frame
    pub retired: Vec<TrackRecord>,
}

/// End-of-session report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session: String,
    pub source: String,
    pub frames_processed: u64,
    pub max_persons: usize,
    pub avg_persons: f64,
    pub tracks_created: u64,
    pub enter_events: u64,
    pub exit_events: u64,
    pub first_ts: Option<u64>,
    pub last_ts: Option<u64>,
    pub zones: Vec<ZoneStats>,
}

pub struct FrameOrchestrator {
    session_id: String,
    source: String,
    registry: TrackRegistry,
    aggregator: ZoneAggregator,
    metrics: Arc<Metrics>,
    path_tail_len: usize,
    frames_processed: u64,
    persons_sum: u64,
    max_persons: usize,
    tracks_created: u64,
    enter_events: u64,
    exit_events: u64,
    first_ts: Option<u64>,
    last_ts: Option<u64>,
    last_frame_index: u64,
}

impl FrameOrchestrator {
    /// Create a session; fails on invalid thresholds or zone geometry
    pub fn new(
        registry_config: RegistryConfig,
        zones: Vec<Zone>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, CoreError> {
        let registry = TrackRegistry::new(registry_config)?;
        let aggregator = ZoneAggregator::new(ZoneIndex::new(zones)?);
        Ok(Self {
            session_id: new_uuid_v7(),
            source: String::new(),
            registry,
            aggregator,
            metrics,
            path_tail_len: DEFAULT_PATH_TAIL_LEN,
            frames_processed: 0,
            persons_sum: 0,
            max_persons: 0,
            tracks_created: 0,
            enter_events: 0,
            exit_events: 0,
            first_ts: None,
            last_ts: None,
            last_frame_index: 0,
        })
    }

    /// Create a session from application config
    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, CoreError> {
        Ok(Self::new(config.registry_config(), config.zones().to_vec(), metrics)?
            .with_path_tail_len(config.path_tail_len()))
    }

    pub fn with_path_tail_len(mut self, path_tail_len: usize) -> Self {
        self.path_tail_len = path_tail_len;
        self
    }

    /// Label the session with its input (file path, camera name, ...)
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn aggregator(&self) -> &ZoneAggregator {
        &self.aggregator
    }

    /// Run one frame through registry and aggregator
    pub fn process(&mut self, frame: &DetectionFrame) -> FrameOutput {
        let start = Instant::now();
        let ts = frame.timestamp_ms;

        if let Some(last) = self.last_ts {
            if ts < last {
                warn!(
                    session = %self.session_id,
                    frame = %frame.frame_index,
                    ts = %ts,
                    last_ts = %last,
                    "frame_timestamp_backwards"
                );
            }
        }

        let update = self.registry.update(&frame.detections, ts);

        let persons = update.matched.len() + update.created.len();
        self.metrics.record_detections(
            frame.detections.len(),
            update.skipped_degenerate,
            update.skipped_low_confidence,
        );
        self.metrics.record_tracks_created(update.created.len());
        self.metrics.record_tracks_removed(update.removed.len());
        self.tracks_created += update.created.len() as u64;

        let aggregation = self.aggregator.apply(&mut self.registry, update, ts);
        self.record_events(&aggregation.events);

        self.frames_processed += 1;
        self.persons_sum += persons as u64;
        self.max_persons = self.max_persons.max(persons);
        self.first_ts.get_or_insert(ts);
        self.last_ts = Some(ts);
        self.last_frame_index = frame.frame_index;

        let live = self.registry.tracks().map(|t| t.snapshot(self.path_tail_len)).collect();

        self.metrics.record_frame_processed(start.elapsed().as_micros() as u64);

        FrameOutput {
            frame_index: frame.frame_index,
            ts,
            events: aggregation.events,
            live,
            retired: aggregation.retired,
        }
    }

    /// Retire every live track at `ts`: synthetic EXITs plus terminal records
    ///
    /// The orchestrator stays usable; later frames start new tracks with
    /// fresh ids.
    pub fn finish(&mut self, ts: u64) -> FrameOutput {
        let mut events = Vec::new();
        let mut retired = Vec::new();

        let tracks = self.registry.drain();
        self.metrics.record_tracks_removed(tracks.len());
        for track in tracks {
            retired.push(self.aggregator.retire_track(track, ts, &mut events));
        }
        self.record_events(&events);

        FrameOutput { frame_index: self.last_frame_index, ts, events, live: Vec::new(), retired }
    }

    /// Replace the zone configuration between frames
    pub fn reload_zones(&mut self, zones: Vec<Zone>) -> Result<(), CoreError> {
        self.aggregator.reload_zones(zones)
    }

    pub fn summary(&self) -> SessionSummary {
        let avg_persons = if self.frames_processed > 0 {
            self.persons_sum as f64 / self.frames_processed as f64
        } else {
            0.0
        };
        SessionSummary {
            session: self.session_id.clone(),
            source: self.source.clone(),
            frames_processed: self.frames_processed,
            max_persons: self.max_persons,
            avg_persons,
            tracks_created: self.tracks_created,
            enter_events: self.enter_events,
            exit_events: self.exit_events,
            first_ts: self.first_ts,
            last_ts: self.last_ts,
            zones: self.aggregator.stats().snapshot(),
        }
    }

    fn record_events(&mut self, events: &[TrackingEvent]) {
        for event in events {
            match event.kind {
                EventKind::Enter => {
                    self.enter_events += 1;
                    self.metrics.record_zone_enter(event.zone_id);
                }
                EventKind::Exit => {
                    self.exit_events += 1;
                    self.metrics.record_zone_exit(event.zone_id, event.synthetic);
                }
            }
        }
    }

    /// Drive the session from a frame channel until it closes or shutdown
    ///
    /// On exit every live track is retired at the last frame timestamp and
    /// the session summary is emitted.
    pub async fn run(
        mut self,
        mut frame_rx: mpsc::Receiver<DetectionFrame>,
        egress: Option<EgressSender>,
        mut shutdown: watch::Receiver<bool>,
    ) -> SessionSummary {
        self.metrics.session_started();
        info!(
            session = %self.session_id,
            source = %self.source,
            zones = %self.aggregator.index().len(),
            "session_started"
        );

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let output = self.process(&frame);
                            self.emit(&egress, output).await;
                        }
                        None => break, // Source exhausted
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(session = %self.session_id, "session_shutdown");
                        break;
                    }
                }
            }
        }

        let end_ts = self.last_ts.unwrap_or(0);
        let output = self.finish(end_ts);
        self.emit(&egress, output).await;

        let summary = self.summary();
        if let Some(sender) = &egress {
            sender.send_summary(summary.clone()).await;
        }
        self.metrics.session_finished();

        let span_ms = match (summary.first_ts, summary.last_ts) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => 0,
        };
        info!(
            session = %summary.session,
            source = %summary.source,
            frames = %summary.frames_processed,
            tracks = %summary.tracks_created,
            max_persons = %summary.max_persons,
            avg_persons = format!("{:.2}", summary.avg_persons),
            enters = %summary.enter_events,
            exits = %summary.exit_events,
            span = %format_duration(span_ms),
            "session_finished"
        );
        summary
    }

    async fn emit(&self, egress: &Option<EgressSender>, output: FrameOutput) {
        let Some(sender) = egress else { return };

        debug!(
            session = %self.session_id,
            frame = %output.frame_index,
            events = %output.events.len(),
            live = %output.live.len(),
            "frame_emitted"
        );

        for event in output.events {
            sender.send_event(&self.session_id, event).await;
        }
        for record in output.retired {
            sender.send_track(&self.session_id, record).await;
        }
        if !output.live.is_empty() {
            sender.send_snapshots(&self.session_id, output.frame_index, output.ts, output.live);
        }
    }
}
