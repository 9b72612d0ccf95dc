//! # ingest
//!
//! Ordered hand-off of decoded measurements from the producer task (blocked on
//! a transport) to the consumer task (solving on a fixed cadence), plus the
//! cooperative stop signal shared by both.
//!
//! ## Policy
//! - Unbounded queue: `push` never blocks and never drops. Anchor counts and
//!   report rates are small enough that memory is not a concern.
//! - FIFO per producer; `drain` returns everything queued, in arrival order.
//! - After a stop the channel may simply be dropped; pending items are not
//!   required to be consumed.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use uwb_types::Measurement;

// ── Measurement channel ───────────────────────────────────────────────────────

/// Create a connected sender/receiver pair.
pub fn ingest_channel() -> (MeasurementSender, MeasurementReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MeasurementSender { tx }, MeasurementReceiver { rx })
}

/// Producer end. Cloneable so several sources could feed one consumer.
#[derive(Debug, Clone)]
pub struct MeasurementSender {
    tx: mpsc::UnboundedSender<Measurement>,
}

impl MeasurementSender {
    /// Append to the back of the queue. Returns `false` once the consumer is gone.
    pub fn push(&self, measurement: Measurement) -> bool {
        self.tx.send(measurement).is_ok()
    }

    pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

/// Consumer end.
#[derive(Debug)]
pub struct MeasurementReceiver {
    rx: mpsc::UnboundedReceiver<Measurement>,
}

impl MeasurementReceiver {
    /// Remove and return everything currently queued, oldest first. Never blocks.
    ///
    /// Items pushed while draining are either included or left for the next
    /// drain; none are lost.
    pub fn drain(&mut self) -> Vec<Measurement> {
        let mut batch = Vec::new();
        while let Ok(m) = self.rx.try_recv() {
            batch.push(m);
        }
        batch
    }

    /// Wait up to `timeout` for the next item. `None` on timeout or when every
    /// sender has been dropped and the queue is empty.
    pub async fn pop_timeout(&mut self, timeout: Duration) -> Option<Measurement> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }
}

// ── Stop signal ───────────────────────────────────────────────────────────────

/// Create a stop handle and its first signal. Clone the signal for every task.
pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

/// Owner side: requests a cooperative stop.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    /// Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal { rx: self.tx.subscribe() }
    }
}

/// Task side: polled or awaited inside loops.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool { *self.rx.borrow() }

    /// Resolves once a stop was requested, or the handle was dropped.
    pub async fn cancelled(&mut self) {
        // An Err here means the handle is gone, which counts as a stop.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}
