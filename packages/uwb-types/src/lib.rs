//! # uwb-types
//!
//! Shared data model for the UWB tag tracker.
//!
//! These types are used by:
//! - `backend-rust`: decoding range reports, solving positions, serving snapshots
//! - `packages/uwb-simulator`: reading the anchors file to generate range lines
//!
//! ## Coordinate Conventions
//!
//! - **World frame**: 2D Cartesian, meters, Y increases upward (north on a floorplan)
//! - **Pixel frame**: image column `u` to the right, image row `v` downward (row 0 = top)
//!
//! The anchors file is a flat JSON object `{ "A1": [x, y], ... }` with an optional
//! reserved `_image_transform` entry carrying the floorplan calibration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Anchors ───────────────────────────────────────────────────────────────────

/// Anchor identifier as reported by the tag firmware, e.g. `"A1"`.
pub type AnchorId = String;

/// Anchor id → fixed world position. Ordered by id so iteration is deterministic.
pub type AnchorMap = BTreeMap<AnchorId, Position>;

/// Reserved key in the anchors file holding the floorplan calibration record.
pub const IMAGE_TRANSFORM_KEY: &str = "_image_transform";

// ── Positions ─────────────────────────────────────────────────────────────────

/// 2D world position (meters)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn is_finite(&self) -> bool { self.x.is_finite() && self.y.is_finite() }

    pub fn to_array(self) -> [f64; 2] { [self.x, self.y] }
}

impl From<[f64; 2]> for Position {
    fn from(v: [f64; 2]) -> Self { Self { x: v[0], y: v[1] } }
}

/// Position estimate stamped with the wall-clock time it was solved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedPosition {
    pub x: f64,
    pub y: f64,
    /// Unix epoch milliseconds
    pub timestamp_ms: u64,
}

impl TimedPosition {
    pub fn new(pos: Position, timestamp_ms: u64) -> Self {
        Self { x: pos.x, y: pos.y, timestamp_ms }
    }

    pub fn position(&self) -> Position { Position::new(self.x, self.y) }
}

// ── Measurements ──────────────────────────────────────────────────────────────

/// One decoded tag → anchor range report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Unix epoch milliseconds at which the producer received the line
    pub timestamp_ms: u64,
    pub anchor_id: AnchorId,
    /// Non-negative, finite range in meters
    pub distance_m: f64,
}

impl Measurement {
    pub fn new(timestamp_ms: u64, anchor_id: impl Into<AnchorId>, distance_m: f64) -> Self {
        Self { timestamp_ms, anchor_id: anchor_id.into(), distance_m }
    }
}

// ── Persisted calibration records ─────────────────────────────────────────────

/// Marker for the `"type": "scale_origin"` tag of a scale+origin record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleOriginTag {
    #[default]
    #[serde(rename = "scale_origin")]
    ScaleOrigin,
}

/// Two-point similarity record: `world = r·pixel + t` in complex form.
///
/// `pixel` here is the upright pixel `u + i·(−v)`, with the row negated so
/// world Y grows upward. Records whose `r`/`t` were fitted on raw image rows
/// load vertically mirrored and need recalibrating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoPointRecord {
    /// Scale + rotation as `[re, im]`
    pub r: [f64; 2],
    /// Translation as `[re, im]`
    pub t: [f64; 2],
    /// `[height, width]` of the calibrated image, pixels
    pub image_shape: [u32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file: Option<String>,
}

/// Scale-bar + origin record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleOriginRecord {
    #[serde(rename = "type")]
    pub kind: ScaleOriginTag,
    /// Pixels per meter, > 0
    pub ppm: f64,
    pub origin_pixel: [f64; 2],
    pub origin_world: [f64; 2],
    /// `[height, width]` of the calibrated image, pixels
    pub image_shape: [u32; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_file: Option<String>,
}

/// Persisted floorplan calibration. Exactly two shapes exist on disk; the
/// scale+origin one is recognised by its `type` tag, anything carrying `r`/`t`
/// is a two-point record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformRecord {
    ScaleOrigin(ScaleOriginRecord),
    TwoPoint(TwoPointRecord),
}

impl TransformRecord {
    pub fn image_shape(&self) -> [u32; 2] {
        match self {
            Self::ScaleOrigin(r) => r.image_shape,
            Self::TwoPoint(r) => r.image_shape,
        }
    }

    pub fn image_file(&self) -> Option<&str> {
        match self {
            Self::ScaleOrigin(r) => r.image_file.as_deref(),
            Self::TwoPoint(r) => r.image_file.as_deref(),
        }
    }
}

// ── Anchors file ──────────────────────────────────────────────────────────────

/// On-disk shape of the anchors file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnchorsFile {
    #[serde(flatten)]
    pub anchors: BTreeMap<AnchorId, [f64; 2]>,
    #[serde(rename = "_image_transform", default, skip_serializing_if = "Option::is_none")]
    pub image_transform: Option<TransformRecord>,
}

impl AnchorsFile {
    /// Anchor entries as world positions (the reserved key is never among them).
    pub fn anchor_map(&self) -> AnchorMap {
        self.anchors.iter().map(|(id, xy)| (id.clone(), Position::from(*xy))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchors_file_separates_reserved_key() {
        let json = r#"{
            "A1": [0.0, 0.0],
            "A2": [4.5, 0.0],
            "_image_transform": { "r": [0.1, 0.0], "t": [1.0, 2.0], "image_shape": [600, 800], "image_file": "floor.png" }
        }"#;
        let file: AnchorsFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.anchors.len(), 2);
        assert!(!file.anchors.contains_key(IMAGE_TRANSFORM_KEY));
        match file.image_transform {
            Some(TransformRecord::TwoPoint(rec)) => {
                assert_eq!(rec.r, [0.1, 0.0]);
                assert_eq!(rec.image_shape, [600, 800]);
                assert_eq!(rec.image_file.as_deref(), Some("floor.png"));
            }
            other => panic!("expected two-point record, got {other:?}"),
        }
    }

    #[test]
    fn scale_origin_record_is_recognised_by_tag() {
        let json = r#"{ "type": "scale_origin", "ppm": 50.0, "origin_pixel": [0, 0],
                        "origin_world": [1, 1], "image_shape": [100, 200] }"#;
        let rec: TransformRecord = serde_json::from_str(json).unwrap();
        assert!(matches!(rec, TransformRecord::ScaleOrigin(ref r) if r.ppm == 50.0));
        assert_eq!(rec.image_file(), None);
    }

    #[test]
    fn anchors_file_without_transform_is_plain_map() {
        let file: AnchorsFile = serde_json::from_str(r#"{ "A1": [1.0, 2.0] }"#).unwrap();
        assert!(file.image_transform.is_none());
        assert_eq!(file.anchor_map()["A1"], Position::new(1.0, 2.0));
    }

    #[test]
    fn unknown_transform_shape_is_rejected() {
        let json = r#"{ "A1": [1.0, 2.0], "_image_transform": { "type": "scale_origin" } }"#;
        assert!(serde_json::from_str::<AnchorsFile>(json).is_err());
    }

    #[test]
    fn serialized_file_puts_transform_under_reserved_key() {
        let mut file = AnchorsFile::default();
        file.anchors.insert("A1".into(), [0.25, -3.0]);
        file.image_transform = Some(TransformRecord::ScaleOrigin(ScaleOriginRecord {
            kind: ScaleOriginTag::ScaleOrigin,
            ppm: 42.0,
            origin_pixel: [10.0, 20.0],
            origin_world: [0.0, 0.0],
            image_shape: [480, 640],
            image_file: Some("plan.png".into()),
        }));
        let value = serde_json::to_value(&file).unwrap();
        assert_eq!(value["_image_transform"]["type"], "scale_origin");
        assert_eq!(value["A1"], serde_json::json!([0.25, -3.0]));

        let back: AnchorsFile = serde_json::from_value(value).unwrap();
        assert_eq!(back, file);
    }
}
