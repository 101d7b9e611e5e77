//! End-to-end tests: frames in, zone events, track records and summaries out

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tempfile::{tempdir, NamedTempFile};
use tokio::sync::{mpsc, watch};
use zone_tracker::domain::types::{
    Detection, DetectionFrame, EventKind, TrackId, TrackingEvent, Zone, ZoneId,
};
use zone_tracker::infra::{Config, Metrics};
use zone_tracker::io::{create_egress_channel, Egress, FrameSource};
use zone_tracker::services::{FrameOrchestrator, RegistryConfig};

fn square_zone() -> Zone {
    Zone::new(1, "Z", "product_area", vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]])
}

/// Detection whose centroid lands exactly on (cx, cy)
fn det_at(cx: f64, cy: f64) -> Detection {
    Detection::new(cx - 2.0, cy - 2.0, 4.0, 4.0, 0.9)
}

fn frame(idx: u64, dets: Vec<Detection>) -> DetectionFrame {
    DetectionFrame::new(idx, idx * 100, dets)
}

fn orchestrator(max_distance: f64, zones: Vec<Zone>) -> FrameOrchestrator {
    FrameOrchestrator::new(RegistryConfig::new(max_distance, 3), zones, Arc::new(Metrics::new()))
        .unwrap()
}

fn scenario_frames() -> Vec<DetectionFrame> {
    vec![
        frame(1, vec![det_at(5.0, 5.0)]),
        frame(2, vec![]),
        frame(3, vec![det_at(5.0, 6.0)]),
        frame(4, vec![det_at(50.0, 50.0)]),
    ]
}

#[test]
fn test_scenario_far_jump_within_gate_exits_zone() {
    let mut orch = orchestrator(100.0, vec![square_zone()]);
    let frames = scenario_frames();

    let out = orch.process(&frames[0]);
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].track_id, TrackId(1));
    assert_eq!(out.events[0].kind, EventKind::Enter);
    assert_eq!(out.events[0].zone_name, "Z");

    let out = orch.process(&frames[1]);
    assert!(out.events.is_empty());
    assert_eq!(out.live[0].disappeared_count, 1);

    let out = orch.process(&frames[2]);
    assert!(out.events.is_empty());
    assert_eq!(out.live.len(), 1);
    assert_eq!(out.live[0].disappeared_count, 0);

    let out = orch.process(&frames[3]);
    assert_eq!(out.events.len(), 1);
    let exit = &out.events[0];
    assert_eq!(exit.track_id, TrackId(1));
    assert_eq!(exit.kind, EventKind::Exit);
    assert_eq!(exit.dwell_ms, Some(300));
    assert!(!exit.synthetic);
}

#[test]
fn test_scenario_far_jump_beyond_gate_creates_new_track() {
    let mut orch = orchestrator(20.0, vec![square_zone()]);
    let frames = scenario_frames();
    for f in &frames[..3] {
        orch.process(f);
    }

    let out = orch.process(&frames[3]);
    assert!(out.events.is_empty());
    let ids: Vec<TrackId> = out.live.iter().map(|t| t.track_id).collect();
    assert_eq!(ids, vec![TrackId(1), TrackId(2)]);
    assert_eq!(out.live[0].disappeared_count, 1);
    assert_eq!(out.live[0].zones, vec![ZoneId(1)]);
    assert!(out.live[1].zones.is_empty());
}

#[test]
fn test_outside_to_inside_emits_single_enter() {
    let mut orch = orchestrator(50.0, vec![square_zone()]);
    assert!(orch.process(&frame(0, vec![det_at(15.0, 5.0)])).events.is_empty());

    let out = orch.process(&frame(1, vec![det_at(5.0, 5.0)]));
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].kind, EventKind::Enter);
    assert_eq!(out.events[0].zone_id, ZoneId(1));
}

/// Two people walking across overlapping zones, one disappearing for good
fn walk_frames() -> Vec<DetectionFrame> {
    let mut frames = Vec::new();
    for i in 0..20u64 {
        let x = i as f64 * 3.0;
        let mut dets = vec![det_at(x, 5.0)];
        if i < 8 {
            dets.push(det_at(40.0 - x, 30.0));
        }
        frames.push(frame(i, dets));
    }
    frames
}

fn walk_zones() -> Vec<Zone> {
    vec![
        Zone::new(1, "left", "entrance", vec![[-5.0, -5.0], [20.0, -5.0], [20.0, 40.0], [-5.0, 40.0]]),
        Zone::new(2, "center", "product_area", vec![[10.0, 0.0], [35.0, 0.0], [35.0, 40.0], [10.0, 40.0]]),
    ]
}

fn run_session(frames: &[DetectionFrame]) -> (Vec<TrackingEvent>, FrameOrchestrator) {
    let mut orch = orchestrator(10.0, walk_zones());
    let mut events = Vec::new();
    for f in frames {
        events.extend(orch.process(f).events);
    }
    (events, orch)
}

#[test]
fn test_dwell_accounting_closes() {
    let frames = walk_frames();
    let (mut events, mut orch) = run_session(&frames);
    let last_ts = frames.last().unwrap().timestamp_ms;
    let finished = orch.finish(last_ts);
    events.extend(finished.events);

    let mut enters: BTreeMap<(TrackId, ZoneId), u32> = BTreeMap::new();
    let mut exits: BTreeMap<(TrackId, ZoneId), u32> = BTreeMap::new();
    let mut exit_dwell: BTreeMap<(TrackId, ZoneId), u64> = BTreeMap::new();
    for event in &events {
        let key = (event.track_id, event.zone_id);
        match event.kind {
            EventKind::Enter => *enters.entry(key).or_default() += 1,
            EventKind::Exit => {
                *exits.entry(key).or_default() += 1;
                *exit_dwell.entry(key).or_default() += event.dwell_ms.unwrap();
            }
        }
    }
    assert!(!enters.is_empty());
    assert_eq!(enters, exits);

    for record in &finished.retired {
        for (zone_id, dwell) in &record.dwell_ms {
            assert_eq!(exit_dwell.get(&(record.track_id, *zone_id)), Some(dwell));
        }
    }
    assert!(orch.registry().is_empty());
    let summary = orch.summary();
    assert_eq!(summary.enter_events, summary.exit_events);
}

#[test]
fn test_identical_runs_are_deterministic() {
    let frames = walk_frames();
    let (first, _) = run_session(&frames);
    let (second, _) = run_session(&frames);
    assert_eq!(first, second);
}

#[test]
fn test_sessions_do_not_share_track_ids() {
    let mut a = orchestrator(10.0, vec![square_zone()]);
    let mut b = orchestrator(10.0, vec![square_zone()]);

    a.process(&frame(0, vec![det_at(5.0, 5.0), det_at(50.0, 50.0)]));
    let out = b.process(&frame(0, vec![det_at(5.0, 5.0)]));

    assert_eq!(out.live[0].track_id, TrackId(1));
    assert_eq!(a.registry().len(), 2);
    assert_eq!(b.registry().len(), 1);
    assert_ne!(a.session_id(), b.session_id());
}

#[tokio::test]
async fn test_file_pipeline_writes_all_outputs() {
    let dir = tempdir().unwrap();
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, r#"{{"frame": 0, "time": 1000, "detections": [{{"x": 3, "y": 3, "width": 4, "height": 4}}]}}"#).unwrap();
    writeln!(input, "not json").unwrap();
    writeln!(input, r#"{{"frame": 1, "time": 1100, "detections": [{{"x": 4, "y": 3, "width": 4, "height": 4}}]}}"#).unwrap();
    writeln!(input, r#"{{"frame": 2, "time": "1970-01-01T00:00:01.200Z", "detections": [{{"x": 20, "y": 3, "width": 4, "height": 4}}]}}"#).unwrap();
    input.flush().unwrap();

    let config = Config::default()
        .with_zones(vec![square_zone()])
        .with_snapshots_file("live.jsonl")
        .with_egress_dir(dir.path());
    let metrics = Arc::new(Metrics::new());

    let (egress_sender, egress_rx) =
        create_egress_channel(64, config.site_id().to_string(), metrics.clone());
    let (_egress_stop_tx, egress_stop_rx) = watch::channel(false);
    let egress = Egress::new(&config, metrics.clone());
    let egress_handle = tokio::spawn(egress.run(egress_rx, egress_stop_rx));

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let source = FrameSource::new(input.path(), config.frame_stride(), metrics.clone());
    let source_handle = tokio::spawn(source.run(frame_tx, shutdown_rx.clone()));

    let summary = FrameOrchestrator::from_config(&config, metrics.clone())
        .unwrap()
        .with_source("cam-1")
        .run(frame_rx, Some(egress_sender), shutdown_rx)
        .await;

    let stats = source_handle.await.unwrap().unwrap();
    egress_handle.await.unwrap();

    assert_eq!(stats.malformed, 1);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(summary.tracks_created, 1);
    assert_eq!(summary.enter_events, 1);
    assert_eq!(summary.exit_events, 1);
    assert_eq!(summary.first_ts, Some(1000));
    assert_eq!(summary.last_ts, Some(1200));

    let events = fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
    let events: Vec<serde_json::Value> =
        events.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "enter");
    assert_eq!(events[1]["event"], "exit");
    assert_eq!(events[1]["dwell_ms"], 200);
    assert_eq!(events[1]["session"], summary.session.as_str());

    let tracks = fs::read_to_string(dir.path().join("tracks.jsonl")).unwrap();
    assert_eq!(tracks.lines().count(), 1);

    let sessions = fs::read_to_string(dir.path().join("sessions.jsonl")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(sessions.trim()).unwrap();
    assert_eq!(parsed["source"], "cam-1");
    assert_eq!(parsed["zones"][0]["visitors"], 1);

    let live = fs::read_to_string(dir.path().join("live.jsonl")).unwrap();
    assert_eq!(live.lines().count(), 3);
}
