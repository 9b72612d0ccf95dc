//! trilateration.rs: Linear least-squares multilateration (2D)
//!
//! Each range defines a circle `(x − xi)² + (y − yi)² = ri²`. Subtracting the
//! reference anchor's circle from every other one cancels the `x² + y²` term and
//! leaves one linear equation per non-reference anchor:
//!
//! ```text
//! 2(xi − x1)·x + 2(yi − y1)·y = r1² − ri² − x1² + xi² − y1² + yi²
//! ```
//!
//! Stacked, this is `A·p = b` with `k − 1` rows for `k` anchors, solved in the
//! least-squares sense through the 2×2 normal equations `AᵀA·p = Aᵀb`. Three
//! anchors give an exact solve; more anchors average out range noise.
//!
//! ## Reproducibility
//! Usable anchors are the intersection of known anchor positions and current
//! ranges, taken in ascending anchor-id order. The reference is the first of
//! them (lowest id). In the noiseless case the reference does not change the
//! result, only the conditioning.

use std::collections::BTreeMap;

use serde::Serialize;
use uwb_types::{AnchorId, AnchorMap, Position};

use crate::error::SolveError;

/// Minimum number of usable anchors for a 2D fix.
pub const MIN_ANCHORS: usize = 3;

/// `det(AᵀA) / (‖a₀‖²·‖a₁‖²)` is the squared sine of the angle between the two
/// columns of `A`. Below this the geometry is treated as collinear.
const MIN_RELATIVE_DETERMINANT: f64 = 1e-10;

/// Full solve output, for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    pub position: Position,
    /// Anchor whose circle was subtracted from the others
    pub reference: AnchorId,
    pub anchors_used: usize,
    /// RMS of `‖p − anchor‖ − range` over the anchors used (meters)
    pub rms_residual_m: f64,
}

/// Solve for the tag position. See [`solve_detailed`].
pub fn solve(anchors: &AnchorMap, distances: &BTreeMap<AnchorId, f64>) -> Result<Position, SolveError> {
    solve_detailed(anchors, distances).map(|s| s.position)
}

/// Solve for the tag position and report how well the ranges agree with it.
///
/// Fails with [`SolveError::InsufficientAnchors`] when fewer than three anchor
/// ids appear in both maps and [`SolveError::DegenerateGeometry`] when the
/// anchors do not span the plane (collinear or coincident). Neither is fatal;
/// callers skip the cycle.
pub fn solve_detailed(
    anchors: &AnchorMap,
    distances: &BTreeMap<AnchorId, f64>,
) -> Result<Solution, SolveError> {
    let usable: Vec<(&AnchorId, Position, f64)> = distances
        .iter()
        .filter_map(|(id, &r)| anchors.get(id).map(|p| (id, *p, r)))
        .collect();

    if usable.len() < MIN_ANCHORS {
        return Err(SolveError::InsufficientAnchors { available: usable.len() });
    }

    let (ref_id, p1, r1) = usable[0];
    let k1 = r1 * r1 - p1.x * p1.x - p1.y * p1.y;

    // Accumulate AᵀA and Aᵀb row by row
    let (mut s00, mut s01, mut s11) = (0.0f64, 0.0f64, 0.0f64);
    let (mut t0, mut t1) = (0.0f64, 0.0f64);
    for &(_, pi, ri) in &usable[1..] {
        let a0 = 2.0 * (pi.x - p1.x);
        let a1 = 2.0 * (pi.y - p1.y);
        let b = k1 - ri * ri + pi.x * pi.x + pi.y * pi.y;

        s00 += a0 * a0;
        s01 += a0 * a1;
        s11 += a1 * a1;
        t0 += a0 * b;
        t1 += a1 * b;
    }

    let det = s00 * s11 - s01 * s01;
    // Negated comparison so a NaN determinant is also rejected
    if !(det > MIN_RELATIVE_DETERMINANT * s00 * s11) {
        return Err(SolveError::DegenerateGeometry { determinant: det });
    }

    // Cramer's rule on the 2×2 normal equations
    let position = Position::new(
        (s11 * t0 - s01 * t1) / det,
        (s00 * t1 - s01 * t0) / det,
    );

    let sum_sq: f64 = usable
        .iter()
        .map(|(_, p, r)| (position.distance_to(p) - r).powi(2))
        .sum();

    Ok(Solution {
        position,
        reference: ref_id.clone(),
        anchors_used: usable.len(),
        rms_residual_m: (sum_sq / usable.len() as f64).sqrt(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    fn anchors(list: &[(&str, f64, f64)]) -> AnchorMap {
        list.iter().map(|&(id, x, y)| (id.to_string(), Position::new(x, y))).collect()
    }

    fn ranges_to(anchors: &AnchorMap, truth: Position) -> BTreeMap<AnchorId, f64> {
        anchors.iter().map(|(id, p)| (id.clone(), p.distance_to(&truth))).collect()
    }

    fn assert_close(p: Position, q: Position) {
        assert!(p.distance_to(&q) < TOL, "{p:?} != {q:?}");
    }

    #[test]
    fn three_anchors_noiseless_is_exact() {
        let a = anchors(&[("A1", 0.0, 0.0), ("A2", 6.0, 0.0), ("A3", 0.0, 4.0)]);
        let truth = Position::new(2.5, 1.25);
        let sol = solve_detailed(&a, &ranges_to(&a, truth)).unwrap();
        assert_close(sol.position, truth);
        assert_eq!(sol.reference, "A1");
        assert_eq!(sol.anchors_used, 3);
        assert!(sol.rms_residual_m < TOL);
    }

    #[test]
    fn point_outside_anchor_hull_is_recovered() {
        let a = anchors(&[("A1", 1.0, 1.0), ("A2", 3.0, 1.5), ("A3", 2.0, 4.0)]);
        let truth = Position::new(-7.0, 12.5);
        assert_close(solve(&a, &ranges_to(&a, truth)).unwrap(), truth);
    }

    #[test]
    fn overdetermined_noiseless_is_exact() {
        let a = anchors(&[
            ("A1", 0.0, 0.0),
            ("A2", 10.0, 0.0),
            ("A3", 10.0, 8.0),
            ("A4", 0.0, 8.0),
            ("A5", 5.0, 12.0),
        ]);
        let truth = Position::new(3.3, 6.1);
        assert_close(solve(&a, &ranges_to(&a, truth)).unwrap(), truth);
    }

    #[test]
    fn overdetermined_noise_is_averaged() {
        let a = anchors(&[
            ("A1", 0.0, 0.0),
            ("A2", 10.0, 0.0),
            ("A3", 10.0, 10.0),
            ("A4", 0.0, 10.0),
        ]);
        let truth = Position::new(4.0, 5.0);
        let mut d = ranges_to(&a, truth);
        for (i, r) in d.values_mut().enumerate() {
            *r += if i % 2 == 0 { 0.02 } else { -0.02 };
        }
        let sol = solve_detailed(&a, &d).unwrap();
        assert!(sol.position.distance_to(&truth) < 0.1);
        assert!(sol.rms_residual_m > 0.0);
    }

    #[test]
    fn fewer_than_three_ranges_is_insufficient() {
        let a = anchors(&[("A1", 0.0, 0.0), ("A2", 6.0, 0.0), ("A3", 0.0, 4.0)]);
        let d: BTreeMap<_, _> = [("A1".to_string(), 1.0), ("A2".to_string(), 2.0)].into();
        assert_eq!(solve(&a, &d), Err(SolveError::InsufficientAnchors { available: 2 }));
        assert_eq!(
            solve(&a, &BTreeMap::new()),
            Err(SolveError::InsufficientAnchors { available: 0 })
        );
    }

    #[test]
    fn usable_set_is_intersection_not_union() {
        // Three ranges, three anchors, but only two ids in common
        let a = anchors(&[("A1", 0.0, 0.0), ("A2", 6.0, 0.0), ("A3", 0.0, 4.0)]);
        let d: BTreeMap<_, _> = [
            ("A1".to_string(), 1.0),
            ("A2".to_string(), 2.0),
            ("A9".to_string(), 3.0),
        ]
        .into();
        assert_eq!(solve(&a, &d), Err(SolveError::InsufficientAnchors { available: 2 }));
    }

    #[test]
    fn collinear_anchors_are_degenerate() {
        let a = anchors(&[("A1", 0.0, 0.0), ("A2", 1.0, 1.0), ("A3", 3.0, 3.0), ("A4", -2.0, -2.0)]);
        let d = ranges_to(&a, Position::new(1.0, 0.0));
        assert!(matches!(solve(&a, &d), Err(SolveError::DegenerateGeometry { .. })));
    }

    #[test]
    fn coincident_anchors_are_degenerate() {
        let a = anchors(&[("A1", 2.0, 2.0), ("A2", 2.0, 2.0), ("A3", 2.0, 2.0)]);
        let d = ranges_to(&a, Position::new(0.0, 0.0));
        assert!(matches!(solve(&a, &d), Err(SolveError::DegenerateGeometry { .. })));
    }

    #[test]
    fn reference_choice_does_not_change_noiseless_result() {
        let truth = Position::new(1.7, -0.4);
        let a = anchors(&[("A1", 0.0, 0.0), ("A2", 5.0, 1.0), ("A3", 2.0, 6.0)]);
        // Same geometry, ids permuted so a different anchor sorts first
        let b = anchors(&[("A1", 2.0, 6.0), ("A2", 0.0, 0.0), ("A3", 5.0, 1.0)]);
        let pa = solve(&a, &ranges_to(&a, truth)).unwrap();
        let pb = solve(&b, &ranges_to(&b, truth)).unwrap();
        assert_close(pa, pb);
        assert_close(pa, truth);
    }

    #[test]
    fn anchors_without_ranges_are_ignored() {
        let a = anchors(&[
            ("A1", 0.0, 0.0),
            ("A2", 6.0, 0.0),
            ("A3", 0.0, 4.0),
            ("A4", 100.0, 100.0),
        ]);
        let truth = Position::new(1.0, 1.0);
        let mut d = ranges_to(&a, truth);
        d.remove("A4");
        let sol = solve_detailed(&a, &d).unwrap();
        assert_eq!(sol.anchors_used, 3);
        assert_close(sol.position, truth);
    }
}
