//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::error::CoreError;
use crate::domain::types::Zone;
use crate::services::registry::RegistryConfig;
use crate::services::zone_index::ZoneIndex;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier included in every egress record (e.g., "store-1")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "zone-tracker".to_string()
}

/// Association and track lifecycle settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackerSettings {
    /// Maximum centroid distance (pixels) for a detection to continue a track
    #[serde(default = "default_max_match_distance")]
    pub max_match_distance: f64,
    /// Consecutive unmatched frames before a track is evicted
    #[serde(default = "default_max_disappeared_frames")]
    pub max_disappeared_frames: u32,
    /// Detections below this confidence are ignored
    #[serde(default)]
    pub min_confidence: f32,
    /// Number of path points included in live snapshots
    #[serde(default = "default_path_tail_len")]
    pub path_tail_len: usize,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            max_match_distance: default_max_match_distance(),
            max_disappeared_frames: default_max_disappeared_frames(),
            min_confidence: 0.0,
            path_tail_len: default_path_tail_len(),
        }
    }
}

fn default_max_match_distance() -> f64 {
    50.0
}

fn default_max_disappeared_frames() -> u32 {
    50
}

fn default_path_tail_len() -> usize {
    16
}

impl TrackerSettings {
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig::new(self.max_match_distance, self.max_disappeared_frames)
            .with_min_confidence(self.min_confidence)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.registry_config().validate()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Submit every Nth frame of a source to the tracker (1 = every frame)
    #[serde(default = "default_frame_stride")]
    pub frame_stride: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { frame_stride: default_frame_stride() }
    }
}

fn default_frame_stride() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// Zone ENTER/EXIT events (JSONL)
    #[serde(default = "default_events_file")]
    pub events_file: String,
    /// Terminal track records (JSONL)
    #[serde(default = "default_tracks_file")]
    pub tracks_file: String,
    /// Per-frame live snapshots (JSONL); disabled when unset
    #[serde(default)]
    pub snapshots_file: Option<String>,
    /// Session summaries (JSONL)
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
    /// Egress channel capacity (messages)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            events_file: default_events_file(),
            tracks_file: default_tracks_file(),
            snapshots_file: None,
            summary_file: default_summary_file(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_events_file() -> String {
    "events.jsonl".to_string()
}

fn default_tracks_file() -> String {
    "tracks.jsonl".to_string()
}

fn default_summary_file() -> String {
    "sessions.jsonl".to_string()
}

fn default_channel_capacity() -> usize {
    4096
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default)]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval(), prometheus_port: 0 }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tracker: TrackerSettings,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    tracker: TrackerSettings,
    frame_stride: u32,
    zones: Vec<Zone>,
    events_file: String,
    tracks_file: String,
    snapshots_file: Option<String>,
    summary_file: String,
    egress_channel_capacity: usize,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            tracker: toml_config.tracker,
            frame_stride: toml_config.sampling.frame_stride,
            zones: toml_config.zones,
            events_file: toml_config.egress.events_file,
            tracks_file: toml_config.egress.tracks_file,
            snapshots_file: toml_config.egress.snapshots_file,
            summary_file: toml_config.egress.summary_file,
            egress_channel_capacity: toml_config.egress.channel_capacity,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, &path.display().to_string());
        config.validate().with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    /// Reject settings the tracker cannot run with
    ///
    /// Zone polygons are checked by building a throwaway index so invalid
    /// zones are caught at load time rather than when a session starts.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.tracker.validate()?;
        if self.frame_stride == 0 {
            return Err(CoreError::config("frame_stride must be >= 1"));
        }
        if self.egress_channel_capacity == 0 {
            return Err(CoreError::config("egress channel_capacity must be > 0"));
        }
        ZoneIndex::new(self.zones.clone())?;
        Ok(())
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn tracker(&self) -> &TrackerSettings {
        &self.tracker
    }

    pub fn registry_config(&self) -> RegistryConfig {
        self.tracker.registry_config()
    }

    pub fn path_tail_len(&self) -> usize {
        self.tracker.path_tail_len
    }

    pub fn frame_stride(&self) -> u32 {
        self.frame_stride
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn events_file(&self) -> &str {
        &self.events_file
    }

    pub fn tracks_file(&self) -> &str {
        &self.tracks_file
    }

    pub fn snapshots_file(&self) -> Option<&str> {
        self.snapshots_file.as_deref()
    }

    pub fn summary_file(&self) -> &str {
        &self.summary_file
    }

    pub fn egress_channel_capacity(&self) -> usize {
        self.egress_channel_capacity
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method to set the zone list
    pub fn with_zones(mut self, zones: Vec<Zone>) -> Self {
        self.zones = zones;
        self
    }

    /// Builder method to set tracker settings
    pub fn with_tracker(mut self, tracker: TrackerSettings) -> Self {
        self.tracker = tracker;
        self
    }

    /// Builder method to set the frame stride
    pub fn with_frame_stride(mut self, frame_stride: u32) -> Self {
        self.frame_stride = frame_stride;
        self
    }

    /// Builder method to redirect all egress files into `dir`
    pub fn with_egress_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        let dir = dir.as_ref();
        let join = |name: &str| dir.join(name).display().to_string();
        self.events_file = join(&self.events_file);
        self.tracks_file = join(&self.tracks_file);
        self.summary_file = join(&self.summary_file);
        self.snapshots_file = self.snapshots_file.as_deref().map(join);
        self
    }

    /// Builder method to enable live snapshot egress
    pub fn with_snapshots_file(mut self, path: &str) -> Self {
        self.snapshots_file = Some(path.to_string());
        self
    }
}
