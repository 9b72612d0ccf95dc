//! radio.rs: Tag → anchor range reports with a simple noise model
//!
//! Per anchor and epoch:
//! 1. True 2D range from the tag to the anchor
//! 2. Gaussian ranging noise (σ = `sigma_m`)
//! 3. With probability `nlos_rate`, a positive NLOS bias around `nlos_bias_m`
//! 4. With probability `dropout_rate`, no report at all
//!
//! Lines use the tag's serial-monitor format so the tracker's decoder sees
//! exactly what a real device prints.

use chrono::NaiveTime;
use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError};
use serde::Deserialize;
use uwb_types::{AnchorId, AnchorMap, Position};

// ── Radio configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RadioConfig {
    pub sigma_m: f64,
    pub nlos_rate: f64,
    pub nlos_bias_m: f64,
    pub dropout_rate: f64,
    /// Chance per epoch of an extra undecodable line
    pub garbage_rate: f64,
}

/// Distributions built once from a [`RadioConfig`].
#[derive(Debug, Clone)]
pub struct RangeNoise {
    los: Normal<f64>,
    nlos_bias: Normal<f64>,
    nlos_rate: f64,
    dropout_rate: f64,
    garbage_rate: f64,
}

/// Probabilities outside `[0, 1]` are clamped; NaN means never.
fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

impl RangeNoise {
    /// `sigma_m` and `nlos_bias_m` must be finite and non-negative.
    pub fn new(cfg: &RadioConfig) -> Result<Self, NormalError> {
        if !(cfg.sigma_m >= 0.0 && cfg.nlos_bias_m >= 0.0) {
            return Err(NormalError::BadVariance);
        }
        Ok(Self {
            los: Normal::new(0.0, cfg.sigma_m)?,
            nlos_bias: Normal::new(cfg.nlos_bias_m, cfg.nlos_bias_m / 3.0)?,
            nlos_rate: probability(cfg.nlos_rate),
            dropout_rate: probability(cfg.dropout_rate),
            garbage_rate: probability(cfg.garbage_rate),
        })
    }
}

// ── Range report ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct RangeReport {
    pub anchor_id: AnchorId,
    /// Noisy range, never negative
    pub range_m: f64,
    pub true_range_m: f64,
    pub nlos: bool,
}

impl RangeReport {
    /// `HH:MM:SS.mmm -> [TAG] A<n> = <d.dd> m`
    pub fn to_line(&self, clock: NaiveTime) -> String {
        format!("{} -> [TAG] {} = {:.2} m", clock.format("%H:%M:%S%.3f"), self.anchor_id, self.range_m)
    }
}

/// Anchor ids the tag firmware can print: `A` followed by digits.
pub fn is_reportable(anchor_id: &str) -> bool {
    anchor_id
        .strip_prefix('A')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Generate one epoch of range reports, in anchor-id order.
pub fn generate_epoch(
    tag: Position,
    anchors: &AnchorMap,
    noise: &RangeNoise,
    rng: &mut impl Rng,
) -> Vec<RangeReport> {
    anchors
        .iter()
        .filter(|(id, _)| is_reportable(id))
        .filter_map(|(id, anchor)| {
            if rng.gen_bool(noise.dropout_rate) {
                return None;
            }
            let true_range_m = tag.distance_to(anchor);
            let nlos = rng.gen_bool(noise.nlos_rate);
            let bias = if nlos { noise.nlos_bias.sample(rng).max(0.0) } else { 0.0 };
            let range_m = (true_range_m + noise.los.sample(rng) + bias).max(0.0);
            Some(RangeReport { anchor_id: id.clone(), range_m, true_range_m, nlos })
        })
        .collect()
}

/// Occasionally a line of serial noise the tracker must skip.
pub fn maybe_garbage(clock: NaiveTime, noise: &RangeNoise, rng: &mut impl Rng) -> Option<String> {
    const NOISE: [&str; 4] = [
        "[TAG] ranging timeout",
        "[TAG] A? = nan m",
        "dw3000: rx error 0x1f",
        "[TAG] A3 = ",
    ];
    rng.gen_bool(noise.garbage_rate)
        .then(|| format!("{} -> {}", clock.format("%H:%M:%S%.3f"), NOISE[rng.gen_range(0..NOISE.len())]))
}
