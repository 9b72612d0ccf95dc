//! # calibration
//!
//! Pixel ↔ world mapping for a floorplan image.
//!
//! ## Conventions
//! Pixel row 0 is the top of the image and rows grow downward, while world Y
//! grows upward. Every mapping in this module first converts a pixel to the
//! *upright* frame `(u, −v)` and only then applies scale, rotation and
//! translation. Both derivation flows and both mapping directions go through
//! [`Pixel::upright`] / [`Pixel::from_upright`], so pixel → world → pixel
//! round-trips hold for either transform kind.
//!
//! ## Derivation flows
//! - **Two-point**: two (pixel, world) correspondences give a similarity
//!   `world = r·z + t` (complex form), stored as an explicit 2×2
//!   scale-rotation matrix plus translation.
//! - **Scale + origin**: a scale bar of known length gives pixels-per-meter;
//!   one more (pixel, world) pair pins the origin. No rotation.

use serde::Serialize;
use uwb_types::{Position, ScaleOriginRecord, ScaleOriginTag, TransformRecord, TwoPointRecord};

use crate::error::CalibrationError;

// ── Pixel frame ───────────────────────────────────────────────────────────────

/// Image coordinate: `u` = column (right), `v` = row (down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pixel {
    pub u: f64,
    pub v: f64,
}

impl Pixel {
    pub fn new(u: f64, v: f64) -> Self { Self { u, v } }

    /// Flip the row axis so that "up" is positive, matching the world frame.
    pub fn upright(self) -> (f64, f64) { (self.u, -self.v) }

    pub fn from_upright(x: f64, y: f64) -> Self { Self { u: x, v: -y } }

    pub fn distance_to(&self, other: &Pixel) -> f64 {
        ((self.u - other.u).powi(2) + (self.v - other.v).powi(2)).sqrt()
    }

    fn is_finite(&self) -> bool { self.u.is_finite() && self.v.is_finite() }
}

impl From<[f64; 2]> for Pixel {
    fn from(v: [f64; 2]) -> Self { Self { u: v[0], v: v[1] } }
}

// ── Similarity ────────────────────────────────────────────────────────────────

/// `world = [[a, −b], [b, a]] · upright + [tx, ty]`
///
/// Equivalent to complex `w = r·z + t` with `r = a + ib`, `t = tx + i·ty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity2 {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Similarity2 {
    /// Meters per (upright) pixel
    pub fn scale(&self) -> f64 { self.a.hypot(self.b) }

    /// Counter-clockwise rotation from upright pixel axes to world axes, radians
    pub fn rotation_rad(&self) -> f64 { self.b.atan2(self.a) }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// `z = (w − t) / r`
    pub fn apply_inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - self.tx, y - self.ty);
        let n = self.a * self.a + self.b * self.b;
        ((self.a * dx + self.b * dy) / n, (self.a * dy - self.b * dx) / n)
    }
}

// ── Transform ─────────────────────────────────────────────────────────────────

/// Established pixel → world mapping. Immutable; recalibrating builds a new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CalibrationTransform {
    TwoPoint(Similarity2),
    ScaleOrigin {
        /// Pixels per meter, > 0
        ppm: f64,
        origin_pixel: Pixel,
        origin_world: Position,
    },
}

impl CalibrationTransform {
    /// Derive a similarity from two (pixel, world) correspondences.
    pub fn from_two_points(
        pixel1: Pixel,
        world1: Position,
        pixel2: Pixel,
        world2: Position,
    ) -> Result<Self, CalibrationError> {
        if !(pixel1.is_finite() && pixel2.is_finite() && world1.is_finite() && world2.is_finite()) {
            return Err(CalibrationError::InvalidRecord("calibration points must be finite".into()));
        }

        let (z1x, z1y) = pixel1.upright();
        let (z2x, z2y) = pixel2.upright();
        let (dzx, dzy) = (z2x - z1x, z2y - z1y);
        let (dwx, dwy) = (world2.x - world1.x, world2.y - world1.y);

        let dz_norm = dzx * dzx + dzy * dzy;
        if dz_norm == 0.0 || (dwx == 0.0 && dwy == 0.0) {
            return Err(CalibrationError::DegenerateCalibration);
        }

        // r = dw / dz = dw · conj(dz) / |dz|²
        let a = (dwx * dzx + dwy * dzy) / dz_norm;
        let b = (dwy * dzx - dwx * dzy) / dz_norm;
        // t = w1 − r·z1
        let tx = world1.x - (a * z1x - b * z1y);
        let ty = world1.y - (b * z1x + a * z1y);

        Ok(Self::TwoPoint(Similarity2 { a, b, tx, ty }))
    }

    /// Equivalent similarity for either kind.
    pub fn similarity(&self) -> Similarity2 {
        match *self {
            Self::TwoPoint(sim) => sim,
            Self::ScaleOrigin { ppm, origin_pixel, origin_world } => {
                let (ox, oy) = origin_pixel.upright();
                Similarity2 {
                    a: 1.0 / ppm,
                    b: 0.0,
                    tx: origin_world.x - ox / ppm,
                    ty: origin_world.y - oy / ppm,
                }
            }
        }
    }

    pub fn pixels_per_meter(&self) -> f64 {
        match *self {
            Self::TwoPoint(sim) => 1.0 / sim.scale(),
            Self::ScaleOrigin { ppm, .. } => ppm,
        }
    }

    pub fn pixel_to_world(&self, pixel: Pixel) -> Position {
        match *self {
            Self::TwoPoint(sim) => {
                let (x, y) = pixel.upright();
                let (wx, wy) = sim.apply(x, y);
                Position::new(wx, wy)
            }
            Self::ScaleOrigin { ppm, origin_pixel, origin_world } => {
                let (x, y) = pixel.upright();
                let (ox, oy) = origin_pixel.upright();
                Position::new(origin_world.x + (x - ox) / ppm, origin_world.y + (y - oy) / ppm)
            }
        }
    }

    pub fn world_to_pixel(&self, world: Position) -> Pixel {
        match *self {
            Self::TwoPoint(sim) => {
                let (x, y) = sim.apply_inverse(world.x, world.y);
                Pixel::from_upright(x, y)
            }
            Self::ScaleOrigin { ppm, origin_pixel, origin_world } => {
                let (ox, oy) = origin_pixel.upright();
                Pixel::from_upright(
                    ox + (world.x - origin_world.x) * ppm,
                    oy + (world.y - origin_world.y) * ppm,
                )
            }
        }
    }

    /// World-space footprint of an image of `height × width` pixels.
    pub fn apply_to_extent(&self, height: u32, width: u32) -> WorldRect {
        let (h, w) = (height as f64, width as f64);
        let corners = [
            self.pixel_to_world(Pixel::new(0.0, 0.0)),
            self.pixel_to_world(Pixel::new(w, 0.0)),
            self.pixel_to_world(Pixel::new(w, h)),
            self.pixel_to_world(Pixel::new(0.0, h)),
        ];
        WorldRect::from_corners(corners)
    }
}

/// Axis-aligned world rectangle covering the image, plus the mapped corners
/// (top-left, top-right, bottom-right, bottom-left in image terms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorldRect {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub corners: [Position; 4],
}

impl WorldRect {
    fn from_corners(corners: [Position; 4]) -> Self {
        let fold = |f: fn(f64, f64) -> f64, init: f64, pick: fn(&Position) -> f64| {
            corners.iter().map(pick).fold(init, f)
        };
        Self {
            min_x: fold(f64::min, f64::INFINITY, |p| p.x),
            max_x: fold(f64::max, f64::NEG_INFINITY, |p| p.x),
            min_y: fold(f64::min, f64::INFINITY, |p| p.y),
            max_y: fold(f64::max, f64::NEG_INFINITY, |p| p.y),
            corners,
        }
    }

    pub fn width(&self) -> f64 { self.max_x - self.min_x }

    pub fn height(&self) -> f64 { self.max_y - self.min_y }
}

// ── Scale-bar flow ────────────────────────────────────────────────────────────

/// First stage of the scale+origin flow: a measured scale bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBar {
    ppm: f64,
}

impl ScaleBar {
    /// `ppm = |p2 − p1| / length_m`
    pub fn measure(p1: Pixel, p2: Pixel, length_m: f64) -> Result<Self, CalibrationError> {
        if !(length_m > 0.0) || !length_m.is_finite() {
            return Err(CalibrationError::InvalidScaleLength(length_m));
        }
        if !(p1.is_finite() && p2.is_finite()) {
            return Err(CalibrationError::InvalidRecord("scale-bar endpoints must be finite".into()));
        }
        let pixels = p1.distance_to(&p2);
        if pixels == 0.0 {
            return Err(CalibrationError::DegenerateCalibration);
        }
        Ok(Self { ppm: pixels / length_m })
    }

    pub fn ppm(&self) -> f64 { self.ppm }

    /// Second stage: pin `origin_pixel` to `origin_world`.
    pub fn with_origin(
        self,
        origin_pixel: Pixel,
        origin_world: Position,
    ) -> Result<CalibrationTransform, CalibrationError> {
        if !(origin_pixel.is_finite() && origin_world.is_finite()) {
            return Err(CalibrationError::InvalidRecord("origin must be finite".into()));
        }
        Ok(CalibrationTransform::ScaleOrigin { ppm: self.ppm, origin_pixel, origin_world })
    }
}

// ── Calibration (transform + image metadata) ──────────────────────────────────

/// A transform together with the image it was derived for. This is what the
/// anchors file persists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub transform: CalibrationTransform,
    /// `[height, width]`, pixels
    pub image_shape: [u32; 2],
    pub image_file: Option<String>,
}

impl Calibration {
    pub fn new(transform: CalibrationTransform, image_shape: [u32; 2], image_file: Option<String>) -> Self {
        Self { transform, image_shape, image_file }
    }

    /// Extent of the calibrated image itself.
    pub fn extent(&self) -> WorldRect {
        self.transform.apply_to_extent(self.image_shape[0], self.image_shape[1])
    }

    pub fn to_record(&self) -> TransformRecord {
        match &self.transform {
            CalibrationTransform::TwoPoint(sim) => TransformRecord::TwoPoint(TwoPointRecord {
                r: [sim.a, sim.b],
                t: [sim.tx, sim.ty],
                image_shape: self.image_shape,
                image_file: self.image_file.clone(),
            }),
            CalibrationTransform::ScaleOrigin { ppm, origin_pixel, origin_world } => {
                TransformRecord::ScaleOrigin(ScaleOriginRecord {
                    kind: ScaleOriginTag::ScaleOrigin,
                    ppm: *ppm,
                    origin_pixel: [origin_pixel.u, origin_pixel.v],
                    origin_world: origin_world.to_array(),
                    image_shape: self.image_shape,
                    image_file: self.image_file.clone(),
                })
            }
        }
    }
}

impl TryFrom<&TransformRecord> for Calibration {
    type Error = CalibrationError;

    fn try_from(record: &TransformRecord) -> Result<Self, Self::Error> {
        let all_finite = |vals: &[f64]| vals.iter().all(|v| v.is_finite());

        let transform = match record {
            TransformRecord::TwoPoint(rec) => {
                if !all_finite(&[rec.r[0], rec.r[1], rec.t[0], rec.t[1]]) {
                    return Err(CalibrationError::InvalidRecord("r and t must be finite".into()));
                }
                if rec.r == [0.0, 0.0] {
                    return Err(CalibrationError::InvalidRecord("r must be non-zero".into()));
                }
                CalibrationTransform::TwoPoint(Similarity2 {
                    a: rec.r[0],
                    b: rec.r[1],
                    tx: rec.t[0],
                    ty: rec.t[1],
                })
            }
            TransformRecord::ScaleOrigin(rec) => {
                if !(rec.ppm.is_finite() && rec.ppm > 0.0) {
                    return Err(CalibrationError::InvalidRecord(format!(
                        "ppm must be positive, got {}",
                        rec.ppm
                    )));
                }
                let coords = [rec.origin_pixel, rec.origin_world].concat();
                if !all_finite(&coords) {
                    return Err(CalibrationError::InvalidRecord("origin must be finite".into()));
                }
                CalibrationTransform::ScaleOrigin {
                    ppm: rec.ppm,
                    origin_pixel: Pixel::from(rec.origin_pixel),
                    origin_world: Position::from(rec.origin_world),
                }
            }
        };

        Ok(Self {
            transform,
            image_shape: record.image_shape(),
            image_file: record.image_file().map(str::to_owned),
        })
    }
}
