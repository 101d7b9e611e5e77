//! Typed channel for egress messages
//!
//! Sessions hand their output to the egress writer through a bounded mpsc
//! channel. Events, track records and summaries apply backpressure; live
//! snapshots are best-effort and dropped (and counted) when the channel is full.

use crate::domain::track::{TrackRecord, TrackSnapshot};
use crate::domain::types::TrackingEvent;
use crate::infra::metrics::Metrics;
use crate::services::orchestrator::SessionSummary;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Messages that can be sent to the egress writer
#[derive(Debug)]
pub enum EgressMessage {
    /// Zone ENTER/EXIT event
    Event(EventPayload),
    /// Live track snapshots of one frame
    Snapshots(SnapshotPayload),
    /// Terminal record of a retired track
    Track(TrackPayload),
    /// End-of-session summary
    Summary(SummaryPayload),
}

#[derive(Debug, Serialize)]
pub struct EventPayload {
    pub site: String,
    pub session: String,
    #[serde(flatten)]
    pub event: TrackingEvent,
}

#[derive(Debug, Serialize)]
pub struct SnapshotPayload {
    pub site: String,
    pub session: String,
    pub frame: u64,
    pub ts: u64,
    pub tracks: Vec<TrackSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct TrackPayload {
    pub site: String,
    pub session: String,
    #[serde(flatten)]
    pub record: TrackRecord,
}

#[derive(Debug, Serialize)]
pub struct SummaryPayload {
    pub site: String,
    #[serde(flatten)]
    pub summary: SessionSummary,
}

impl EgressMessage {
    /// Serialize the payload to a single JSON line
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            EgressMessage::Event(p) => serde_json::to_string(p),
            EgressMessage::Snapshots(p) => serde_json::to_string(p),
            EgressMessage::Track(p) => serde_json::to_string(p),
            EgressMessage::Summary(p) => serde_json::to_string(p),
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across sessions.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
    metrics: Arc<Metrics>,
}

impl EgressSender {
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String, metrics: Arc<Metrics>) -> Self {
        Self { tx, site_id, metrics }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    /// Send a zone event, waiting for channel capacity
    pub async fn send_event(&self, session: &str, event: TrackingEvent) {
        let payload = EventPayload { site: self.site_id.clone(), session: session.to_string(), event };
        self.send(EgressMessage::Event(payload)).await;
    }

    /// Send a retired track record, waiting for channel capacity
    pub async fn send_track(&self, session: &str, record: TrackRecord) {
        let payload =
            TrackPayload { site: self.site_id.clone(), session: session.to_string(), record };
        self.send(EgressMessage::Track(payload)).await;
    }

    /// Send a session summary, waiting for channel capacity
    pub async fn send_summary(&self, summary: SessionSummary) {
        let payload = SummaryPayload { site: self.site_id.clone(), summary };
        self.send(EgressMessage::Summary(payload)).await;
    }

    /// Send live snapshots; dropped if the channel is full
    pub fn send_snapshots(&self, session: &str, frame: u64, ts: u64, tracks: Vec<TrackSnapshot>) {
        let payload = SnapshotPayload {
            site: self.site_id.clone(),
            session: session.to_string(),
            frame,
            ts,
            tracks,
        };
        // Use try_send to avoid blocking - drop if channel full
        if self.tx.try_send(EgressMessage::Snapshots(payload)).is_err() {
            self.metrics.record_egress_dropped();
        }
    }

    async fn send(&self, msg: EgressMessage) {
        if self.tx.send(msg).await.is_err() {
            debug!("egress_receiver_closed");
            self.metrics.record_egress_dropped();
        }
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
    metrics: Arc<Metrics>,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id, metrics), rx)
}
