//! Detection frame source - reads detector output from JSONL files
//!
//! Each non-empty line holds one frame:
//! `{"frame": 12, "time": 1767617600000, "detections": [{"x":..,"y":..,"width":..,"height":..,"confidence":..}]}`
//!
//! Malformed lines are logged, counted and skipped. Frame sampling happens
//! here: only every `frame_stride`-th parsed frame is forwarded.

use crate::domain::types::DetectionFrame;
use crate::infra::metrics::Metrics;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Parse one input line; blank lines and `#` comments yield `None`
pub fn parse_frame_line(line: &str) -> Result<Option<DetectionFrame>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Per-source frame sampler; keeps the 1st, (1+N)th, (1+2N)th... frame
#[derive(Debug, Clone)]
pub struct FrameSampler {
    stride: u64,
    seen: u64,
}

impl FrameSampler {
    pub fn new(frame_stride: u32) -> Self {
        Self { stride: u64::from(frame_stride.max(1)), seen: 0 }
    }

    /// Returns true when the next frame should be processed
    pub fn admit(&mut self) -> bool {
        let keep = self.seen % self.stride == 0;
        self.seen += 1;
        keep
    }
}

/// Counts reported when a source is exhausted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub lines: u64,
    pub frames_sent: u64,
    pub frames_sampled_out: u64,
    pub malformed: u64,
}

/// Streams frames from one JSONL file into a session channel
pub struct FrameSource {
    path: PathBuf,
    sampler: FrameSampler,
    metrics: Arc<Metrics>,
}

impl FrameSource {
    pub fn new<P: AsRef<Path>>(path: P, frame_stride: u32, metrics: Arc<Metrics>) -> Self {
        Self { path: path.as_ref().to_path_buf(), sampler: FrameSampler::new(frame_stride), metrics }
    }

    /// Read the file to the end (or until shutdown), forwarding sampled frames
    ///
    /// Returns when the file is exhausted, the receiver is dropped or shutdown
    /// is signalled. Dropping `tx` on return ends the session.
    pub async fn run(
        mut self,
        tx: mpsc::Sender<DetectionFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<SourceStats> {
        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open input {}", self.path.display()))?;
        let mut lines = BufReader::new(file).lines();
        let mut stats = SourceStats::default();

        info!(path = %self.path.display(), stride = %self.sampler.stride, "frame_source_started");

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line
                    .with_context(|| format!("Failed to read input {}", self.path.display()))?,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(path = %self.path.display(), "frame_source_shutdown");
                        break;
                    }
                    continue;
                }
            };
            let Some(line) = line else { break };
            stats.lines += 1;

            let frame = match parse_frame_line(&line) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    stats.malformed += 1;
                    self.metrics.record_frame_malformed();
                    warn!(
                        path = %self.path.display(),
                        line = %stats.lines,
                        error = %e,
                        "frame_line_malformed"
                    );
                    continue;
                }
            };

            if !self.sampler.admit() {
                stats.frames_sampled_out += 1;
                continue;
            }

            if tx.send(frame).await.is_err() {
                debug!(path = %self.path.display(), "frame_receiver_closed");
                break;
            }
            stats.frames_sent += 1;
        }

        info!(
            path = %self.path.display(),
            lines = %stats.lines,
            frames = %stats.frames_sent,
            sampled_out = %stats.frames_sampled_out,
            malformed = %stats.malformed,
            "frame_source_finished"
        );
        Ok(stats)
    }
}
