use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use uwb_types::{AnchorId, AnchorMap, Measurement, TimedPosition};

use crate::calibration::Calibration;
use crate::error::SolveError;
use crate::trilateration::{solve_detailed, Solution};

pub const DEFAULT_HISTORY_CAPACITY: usize = 500;

// ─── Distance State ──────────────────────────────────────────────────────────

/// Latest range per anchor. The last applied measurement wins, regardless of
/// its timestamp.
#[derive(Debug, Clone, Default)]
pub struct DistanceState {
    ranges: BTreeMap<AnchorId, f64>,
}

impl DistanceState {
    pub fn new() -> Self { Self::default() }

    pub fn apply(&mut self, measurement: &Measurement) {
        self.ranges.insert(measurement.anchor_id.clone(), measurement.distance_m);
    }

    pub fn get(&self, anchor_id: &str) -> Option<f64> { self.ranges.get(anchor_id).copied() }

    pub fn len(&self) -> usize { self.ranges.len() }

    pub fn is_empty(&self) -> bool { self.ranges.is_empty() }

    pub fn as_map(&self) -> &BTreeMap<AnchorId, f64> { &self.ranges }
}

// ─── Position History ────────────────────────────────────────────────────────

/// Bounded, ordered position trail. Holds at most `capacity` entries; the
/// oldest are evicted first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    entries: VecDeque<TimedPosition>,
    capacity: usize,
}

impl PositionHistory {
    /// A capacity of 0 is treated as 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { entries: VecDeque::with_capacity(capacity.min(4096)), capacity }
    }

    pub fn append(&mut self, pos: TimedPosition) {
        self.entries.push_back(pos);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<TimedPosition> { self.entries.back().copied() }

    /// The most recent `limit` entries (all when `None`), oldest first.
    pub fn recent(&self, limit: Option<usize>) -> Vec<TimedPosition> {
        let n = limit.unwrap_or(self.entries.len()).min(self.entries.len());
        self.entries.iter().skip(self.entries.len() - n).copied().collect()
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn capacity(&self) -> usize { self.capacity }
}

impl Default for PositionHistory {
    fn default() -> Self { Self::new(DEFAULT_HISTORY_CAPACITY) }
}

// ─── Tracker Context ─────────────────────────────────────────────────────────

/// Result of one consumer cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Nothing was drained
    Idle,
    /// Ranges applied and a position appended to the history
    Solved { applied: usize, solution: Solution },
    /// Ranges applied but no usable position this cycle
    NoFix { applied: usize, error: SolveError },
}

/// Everything the consumer owns. Only [`TrackerContext::apply_batch`] mutates it.
#[derive(Debug)]
pub struct TrackerContext {
    anchors: Arc<AnchorMap>,
    calibration: Option<Calibration>,
    distances: DistanceState,
    history: PositionHistory,
}

impl TrackerContext {
    pub fn new(anchors: AnchorMap, calibration: Option<Calibration>, history_capacity: usize) -> Self {
        Self {
            anchors: Arc::new(anchors),
            calibration,
            distances: DistanceState::new(),
            history: PositionHistory::new(history_capacity),
        }
    }

    /// Apply a drained batch in arrival order, then attempt one solve.
    ///
    /// Any non-empty batch triggers a solve, even if every value repeats what
    /// was already stored.
    pub fn apply_batch(&mut self, batch: Vec<Measurement>) -> CycleOutcome {
        let Some(timestamp_ms) = batch.iter().map(|m| m.timestamp_ms).max() else {
            return CycleOutcome::Idle;
        };
        for m in &batch {
            self.distances.apply(m);
        }

        match solve_detailed(&self.anchors, self.distances.as_map()) {
            Ok(solution) => {
                self.history.append(TimedPosition::new(solution.position, timestamp_ms));
                CycleOutcome::Solved { applied: batch.len(), solution }
            }
            Err(error) => CycleOutcome::NoFix { applied: batch.len(), error },
        }
    }

    pub fn anchors(&self) -> &AnchorMap { &self.anchors }

    pub fn calibration(&self) -> Option<&Calibration> { self.calibration.as_ref() }

    pub fn distances(&self) -> &DistanceState { &self.distances }

    pub fn history(&self) -> &PositionHistory { &self.history }

    pub fn into_shared(self) -> SharedTracker { Arc::new(RwLock::new(self)) }
}

pub type SharedTracker = Arc<RwLock<TrackerContext>>;

// ─── Read-only Query Surface ─────────────────────────────────────────────────

/// Position and ranges read under one lock, so they belong to the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentState {
    pub position: Option<TimedPosition>,
    pub distances: BTreeMap<AnchorId, f64>,
}

/// Snapshot-only view of the tracker for reporting and rendering. Every call
/// returns an owned copy; nothing here can mutate the context.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    shared: SharedTracker,
}

impl TrackerHandle {
    pub fn new(shared: SharedTracker) -> Self { Self { shared } }

    pub async fn current_distances(&self) -> BTreeMap<AnchorId, f64> {
        self.shared.read().await.distances.as_map().clone()
    }

    pub async fn current_position(&self) -> Option<TimedPosition> {
        self.shared.read().await.history.latest()
    }

    pub async fn current_state(&self) -> CurrentState {
        let ctx = self.shared.read().await;
        CurrentState { position: ctx.history.latest(), distances: ctx.distances.as_map().clone() }
    }

    pub async fn history(&self, limit: Option<usize>) -> Vec<TimedPosition> {
        self.shared.read().await.history.recent(limit)
    }

    pub async fn history_capacity(&self) -> usize {
        self.shared.read().await.history.capacity()
    }

    pub async fn anchors(&self) -> AnchorMap {
        self.shared.read().await.anchors.as_ref().clone()
    }

    pub async fn calibration(&self) -> Option<Calibration> {
        self.shared.read().await.calibration.clone()
    }
}
