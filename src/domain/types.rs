//! Shared types for the zone tracker

use serde::{Deserialize, Deserializer, Serialize};

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub u64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newtype wrapper for zone IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ZoneId(pub i32);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A position in frame coordinates (pixels)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<[f64; 2]> for Point {
    fn from(p: [f64; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

/// Axis-aligned bounding box, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// True when the box has no usable area (zero/negative extent or non-finite values)
    pub fn is_degenerate(&self) -> bool {
        !(self.x.is_finite() && self.y.is_finite())
            || !(self.width.is_finite() && self.height.is_finite())
            || self.width <= 0.0
            || self.height <= 0.0
    }
}

/// One detector output for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(x: f64, y: f64, width: f64, height: f64, confidence: f32) -> Self {
        Self { bbox: BoundingBox::new(x, y, width, height), confidence }
    }
}

/// Detections for one sampled frame, as handed over by the detector
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionFrame {
    #[serde(rename = "frame")]
    pub frame_index: u64,
    /// Frame timestamp - ISO 8601 string or epoch milliseconds integer
    #[serde(rename = "time", deserialize_with = "deserialize_timestamp")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(frame_index: u64, timestamp_ms: u64, detections: Vec<Detection>) -> Self {
        Self { frame_index, timestamp_ms, detections }
    }
}

/// Parse an RFC 3339 timestamp to epoch milliseconds
pub fn parse_iso_time(time_str: &str) -> Option<u64> {
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("an RFC 3339 string or epoch milliseconds")
        }

        fn visit_str<E>(self, value: &str) -> Result<u64, E>
        where
            E: de::Error,
        {
            parse_iso_time(value)
                .ok_or_else(|| E::custom(format!("invalid RFC 3339 timestamp: {value}")))
        }

        fn visit_u64<E>(self, value: u64) -> Result<u64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_i64<E>(self, value: i64) -> Result<u64, E>
        where
            E: de::Error,
        {
            u64::try_from(value).map_err(|_| E::custom("negative timestamp"))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// A configured polygonal region of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    #[serde(default)]
    pub name: String,
    /// Free-form tag: entrance, exit, product_area, checkout, ...
    #[serde(default)]
    pub zone_type: String,
    pub coordinates: Vec<[f64; 2]>,
}

impl Zone {
    pub fn new(id: i32, name: &str, zone_type: &str, coordinates: Vec<[f64; 2]>) -> Self {
        Self {
            id: ZoneId(id),
            name: name.to_string(),
            zone_type: zone_type.to_string(),
            coordinates,
        }
    }

    /// Display name, falling back to `ZONE_<id>` when unnamed
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("ZONE_{}", self.id)
        } else {
            self.name.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Exit,
}

/// Zone transition emitted by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingEvent {
    pub track_id: TrackId,
    pub zone_id: ZoneId,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub zone_name: String,
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Frame timestamp (epoch ms)
    pub ts: u64,
    pub position: Point,
    /// Time spent in the zone, set on exit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_ms: Option<u64>,
    /// True when the exit was synthesized because the track was retired
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl TrackingEvent {
    pub fn enter(track_id: TrackId, zone_id: ZoneId, ts: u64, position: Point) -> Self {
        Self {
            track_id,
            zone_id,
            zone_name: String::new(),
            kind: EventKind::Enter,
            ts,
            position,
            dwell_ms: None,
            synthetic: false,
        }
    }

    pub fn exit(
        track_id: TrackId,
        zone_id: ZoneId,
        ts: u64,
        position: Point,
        dwell_ms: u64,
    ) -> Self {
        Self {
            track_id,
            zone_id,
            zone_name: String::new(),
            kind: EventKind::Exit,
            ts,
            position,
            dwell_ms: Some(dwell_ms),
            synthetic: false,
        }
    }

    pub fn with_zone_name(mut self, name: impl Into<String>) -> Self {
        self.zone_name = name.into();
        self
    }

    pub fn into_synthetic(mut self) -> Self {
        self.synthetic = true;
        self
    }
}

/// Format a duration in milliseconds as "45s", "2m 5s" or "1h 3m"
pub fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_boxes() {
        assert!(!BoundingBox::new(0.0, 0.0, 10.0, 20.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 0.0, 0.0, 20.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 0.0, 10.0, -1.0).is_degenerate());
        assert!(BoundingBox::new(f64::NAN, 0.0, 10.0, 10.0).is_degenerate());
        assert!(BoundingBox::new(0.0, 0.0, f64::INFINITY, 10.0).is_degenerate());
    }

    #[test]
    fn test_frame_epoch_ms() {
        let json = r#"{"frame": 3, "time": 1767617600000, "detections": [
            {"x": 1.0, "y": 2.0, "width": 4.0, "height": 6.0, "confidence": 0.8}
        ]}"#;
        let frame: DetectionFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.frame_index, 3);
        assert_eq!(frame.timestamp_ms, 1767617600000);
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.detections[0].bbox, BoundingBox::new(1.0, 2.0, 4.0, 6.0));
    }

    #[test]
    fn test_frame_iso_time_and_default_confidence() {
        let json = r#"{"frame": 0, "time": "2026-01-05T16:41:30.048+00:00",
            "detections": [{"x": 0, "y": 0, "width": 2, "height": 2}]}"#;
        let frame: DetectionFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.timestamp_ms, 1767631290048);
        assert_eq!(frame.detections[0].confidence, 1.0);
    }

    #[test]
    fn test_frame_without_detections() {
        let frame: DetectionFrame = serde_json::from_str(r#"{"frame": 9, "time": 5}"#).unwrap();
        assert!(frame.detections.is_empty());
    }

    #[test]
    fn test_parse_iso_time_invalid() {
        assert!(parse_iso_time("not a timestamp").is_none());
        assert!(parse_iso_time("").is_none());
    }

    #[test]
    fn test_zone_display_name() {
        let square = vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]];
        assert_eq!(Zone::new(7, "", "entrance", square.clone()).display_name(), "ZONE_7");
        assert_eq!(Zone::new(7, "Entrance", "entrance", square).display_name(), "Entrance");
    }

    #[test]
    fn test_event_serialization() {
        let enter = TrackingEvent::enter(TrackId(1), ZoneId(2), 500, Point::new(5.0, 5.0))
            .with_zone_name("Entrance");
        let json: serde_json::Value = serde_json::to_value(&enter).unwrap();
        assert_eq!(json["event"], "enter");
        assert_eq!(json["zone_name"], "Entrance");
        assert!(json.get("dwell_ms").is_none());
        assert!(json.get("synthetic").is_none());

        let exit =
            TrackingEvent::exit(TrackId(1), ZoneId(2), 900, Point::new(5.0, 5.0), 400).into_synthetic();
        let json: serde_json::Value = serde_json::to_value(&exit).unwrap();
        assert_eq!(json["event"], "exit");
        assert_eq!(json["dwell_ms"], 400);
        assert_eq!(json["synthetic"], true);
        assert!(json.get("zone_name").is_none());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(45_000), "45s");
        assert_eq!(format_duration(125_000), "2m 5s");
        assert_eq!(format_duration(3_780_000), "1h 3m");
    }
}
