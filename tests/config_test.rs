//! Integration tests for configuration loading

use std::io::Write;
use tempfile::NamedTempFile;
use zone_tracker::domain::types::ZoneId;
use zone_tracker::infra::Config;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content.as_bytes()).unwrap();
    temp_file.flush().unwrap();
    temp_file
}

#[test]
fn test_load_config_from_file() {
    let temp_file = write_config(
        r#"
[site]
id = "test-site"

[tracker]
max_match_distance = 35.5
max_disappeared_frames = 12
min_confidence = 0.4
path_tail_len = 8

[sampling]
frame_stride = 3

[egress]
events_file = "out/events.jsonl"
snapshots_file = "out/live.jsonl"
channel_capacity = 128

[metrics]
interval_secs = 15
prometheus_port = 9091

[[zones]]
id = 1
name = "entrance"
zone_type = "entrance"
coordinates = [[0.0, 0.0], [100.0, 0.0], [100.0, 50.0], [0.0, 50.0]]

[[zones]]
id = 2
coordinates = [[200.0, 200.0], [300.0, 200.0], [250.0, 300.0]]
"#,
    );

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "test-site");
    assert_eq!(config.tracker().max_match_distance, 35.5);
    assert_eq!(config.tracker().max_disappeared_frames, 12);
    assert_eq!(config.registry_config().min_confidence, 0.4);
    assert_eq!(config.path_tail_len(), 8);
    assert_eq!(config.frame_stride(), 3);
    assert_eq!(config.events_file(), "out/events.jsonl");
    assert_eq!(config.tracks_file(), "tracks.jsonl");
    assert_eq!(config.snapshots_file(), Some("out/live.jsonl"));
    assert_eq!(config.egress_channel_capacity(), 128);
    assert_eq!(config.metrics_interval_secs(), 15);
    assert_eq!(config.prometheus_port(), 9091);

    let zones = config.zones();
    assert_eq!(zones.len(), 2);
    assert_eq!(zones[0].id, ZoneId(1));
    assert_eq!(zones[0].display_name(), "entrance");
    assert_eq!(zones[1].display_name(), "ZONE_2");
}

#[test]
fn test_invalid_zone_is_rejected() {
    let temp_file = write_config(
        r#"
[[zones]]
id = 1
coordinates = [[0.0, 0.0], [10.0, 10.0]]
"#,
    );

    let err = Config::from_file(temp_file.path()).unwrap_err();
    assert!(format!("{err:#}").contains("Invalid config file"));
}

#[test]
fn test_duplicate_zone_ids_are_rejected() {
    let temp_file = write_config(
        r#"
[[zones]]
id = 7
coordinates = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]

[[zones]]
id = 7
coordinates = [[20.0, 0.0], [30.0, 0.0], [30.0, 10.0]]
"#,
    );

    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_invalid_tracker_settings_are_rejected() {
    let temp_file = write_config("[tracker]\nmax_match_distance = -1.0\n");
    assert!(Config::from_file(temp_file.path()).is_err());
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "zone-tracker");
    assert_eq!(config.tracker().max_match_distance, 50.0);
    assert_eq!(config.frame_stride(), 1);
    assert!(config.zones().is_empty());
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_load_from_path_falls_back_on_invalid_file() {
    let temp_file = write_config("[sampling]\nframe_stride = 0\n");
    let config = Config::load_from_path(temp_file.path());
    assert_eq!(config.frame_stride(), 1);
}
