//! # uwb_hub
//!
//! Consumer side of the tracker: drains the ingestion channel on a fixed
//! cadence, applies every drained range to the distance state, and attempts one
//! solve per non-empty batch.
//!
//! ## Architecture
//! Runs as its own Tokio task next to the producer and the query API:
//!   1. Ticks every `poll_interval` (default 200 ms, `UWB_POLL_MS`)
//!   2. Drains everything queued, in arrival order
//!   3. Applies the batch under the context write lock and solves once
//!   4. Logs the outcome; solve failures only skip the cycle
//!
//! ## Invariants
//! - The solver never blocks; the write lock is held for one batch only
//! - No solve failure ends the loop; only the stop signal does
//! - Items still queued at stop are discarded

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::SolveError;
use crate::ingest::{MeasurementReceiver, StopSignal};
use crate::state::{CycleOutcome, SharedTracker};

/// Solved cycles between two `info` summaries (~5 s at the default cadence).
const SUMMARY_EVERY: u64 = 25;

/// Counters reported when the consumer exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub cycles: u64,
    pub measurements: u64,
    pub solved: u64,
    pub no_fix: u64,
}

impl HubStats {
    fn record(&mut self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Idle => {}
            CycleOutcome::Solved { applied, .. } => {
                self.cycles += 1;
                self.measurements += *applied as u64;
                self.solved += 1;
            }
            CycleOutcome::NoFix { applied, .. } => {
                self.cycles += 1;
                self.measurements += *applied as u64;
                self.no_fix += 1;
            }
        }
    }
}

// ── Consumer task ─────────────────────────────────────────────────────────────

/// Drain → apply → solve, every `poll_interval`, until `stop` fires.
pub async fn run_consumer(
    shared: SharedTracker,
    mut rx: MeasurementReceiver,
    poll_interval: Duration,
    mut stop: StopSignal,
) -> HubStats {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = HubStats::default();

    info!("🧭 Solver running every {} ms", poll_interval.as_millis());

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = interval.tick() => {}
        }

        let batch = rx.drain();
        if batch.is_empty() {
            continue;
        }

        let outcome = shared.write().await.apply_batch(batch);
        stats.record(&outcome);
        log_outcome(&outcome, &stats);
    }

    info!(
        "Solver stopped: {} cycles, {} measurements, {} fixes, {} without fix",
        stats.cycles, stats.measurements, stats.solved, stats.no_fix
    );
    stats
}

fn log_outcome(outcome: &CycleOutcome, stats: &HubStats) {
    match outcome {
        CycleOutcome::Idle => {}
        CycleOutcome::Solved { applied, solution } => {
            let p = solution.position;
            debug!(
                "Fix ({:.2}, {:.2}) from {} anchors, rms {:.3} m, ref {} ({applied} new ranges)",
                p.x, p.y, solution.anchors_used, solution.rms_residual_m, solution.reference
            );
            if stats.solved % SUMMARY_EVERY == 1 {
                info!(
                    "📍 Tag at ({:.2}, {:.2}) m, {} fixes so far",
                    p.x, p.y, stats.solved
                );
            }
        }
        CycleOutcome::NoFix { error: e @ SolveError::InsufficientAnchors { .. }, .. } => {
            debug!("No fix this cycle: {e}");
        }
        CycleOutcome::NoFix { error: e @ SolveError::DegenerateGeometry { .. }, .. } => {
            warn!("No fix this cycle: {e}");
        }
    }
}
