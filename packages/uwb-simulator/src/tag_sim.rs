//! tag_sim.rs: Tag motion along a closed waypoint loop
//!
//! The tag walks at constant speed from waypoint to waypoint and wraps from
//! the last back to the first. Pure math, no randomness, no panics.

use serde::Deserialize;
use uwb_types::Position;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Epochs per second (one line per anchor per epoch)
    pub rate_hz: f64,
    /// Walking speed, meters per second
    pub speed_mps: f64,
    /// Closed loop of `[x, y]` points, meters
    pub waypoints: Vec<[f64; 2]>,
}

// ── Simulation ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TagSim {
    waypoints: Vec<Position>,
    speed_mps: f64,
    /// Length of the closed loop, meters
    perimeter_m: f64,
    /// Index of the waypoint the current leg starts at
    leg: usize,
    /// Meters travelled along the current leg
    along_m: f64,
    /// Total meters travelled
    pub odometer_m: f64,
}

impl TagSim {
    /// A single waypoint (or none) keeps the tag parked.
    pub fn new(cfg: &MotionConfig) -> Self {
        let mut waypoints: Vec<Position> = cfg.waypoints.iter().copied().map(Position::from).collect();
        if waypoints.is_empty() {
            waypoints.push(Position::default());
        }
        let perimeter_m = (0..waypoints.len())
            .map(|i| waypoints[i].distance_to(&waypoints[(i + 1) % waypoints.len()]))
            .sum();
        Self {
            waypoints,
            speed_mps: cfg.speed_mps.max(0.0),
            perimeter_m,
            leg: 0,
            along_m: 0.0,
            odometer_m: 0.0,
        }
    }

    fn leg_ends(&self) -> (Position, Position) {
        let from = self.waypoints[self.leg];
        let to = self.waypoints[(self.leg + 1) % self.waypoints.len()];
        (from, to)
    }

    /// Ground-truth tag position.
    pub fn position(&self) -> Position {
        let (from, to) = self.leg_ends();
        let len = from.distance_to(&to);
        if len == 0.0 {
            return from;
        }
        let t = (self.along_m / len).clamp(0.0, 1.0);
        Position::new(from.x + t * (to.x - from.x), from.y + t * (to.y - from.y))
    }

    /// Advance by `dt` seconds, carrying leftover distance into the next legs.
    pub fn tick(&mut self, dt: f64) {
        let travelled = self.speed_mps * dt.max(0.0);
        self.odometer_m += travelled;
        if !(self.perimeter_m > 0.0) || !travelled.is_finite() {
            return;
        }

        // Whole laps end where they started
        let mut remaining = travelled % self.perimeter_m;
        for _ in 0..=self.waypoints.len() {
            let (from, to) = self.leg_ends();
            let left = from.distance_to(&to) - self.along_m;
            if remaining < left {
                self.along_m += remaining;
                return;
            }
            remaining -= left.max(0.0);
            self.leg = (self.leg + 1) % self.waypoints.len();
            self.along_m = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(speed: f64) -> TagSim {
        TagSim::new(&MotionConfig {
            rate_hz: 10.0,
            speed_mps: speed,
            waypoints: vec![[0.0, 0.0], [4.0, 0.0], [4.0, 4.0], [0.0, 4.0]],
        })
    }

    fn close(a: Position, b: Position) -> bool { a.distance_to(&b) < 1e-9 }

    #[test]
    fn moves_along_first_leg() {
        let mut sim = square(1.0);
        sim.tick(1.5);
        assert!(close(sim.position(), Position::new(1.5, 0.0)));
    }

    #[test]
    fn turns_corners_with_leftover_distance() {
        let mut sim = square(1.0);
        sim.tick(5.0);
        assert!(close(sim.position(), Position::new(4.0, 1.0)));
        sim.tick(8.0);
        assert!(close(sim.position(), Position::new(0.0, 3.0)));
    }

    #[test]
    fn wraps_around_the_loop() {
        let mut sim = square(2.0);
        sim.tick(8.0 + 0.25);
        assert!(close(sim.position(), Position::new(0.5, 0.0)));
        assert!((sim.odometer_m - 16.5).abs() < 1e-9);
    }

    #[test]
    fn many_laps_in_one_tick_keep_the_remainder() {
        // 101 m on a 16 m loop: six laps plus 5 m
        let mut sim = square(101.0);
        sim.tick(1.0);
        assert!(close(sim.position(), Position::new(4.0, 1.0)));
        assert!((sim.odometer_m - 101.0).abs() < 1e-9);

        sim.tick(1.0);
        assert!(close(sim.position(), Position::new(2.0, 4.0)));
    }

    #[test]
    fn single_waypoint_is_parked() {
        let mut sim = TagSim::new(&MotionConfig { rate_hz: 1.0, speed_mps: 3.0, waypoints: vec![[2.0, 1.0]] });
        sim.tick(10.0);
        assert!(close(sim.position(), Position::new(2.0, 1.0)));
    }
}
