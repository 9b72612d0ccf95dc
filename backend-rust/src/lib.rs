//! UWB tag tracker.
//!
//! A producer task reads `[TAG] A<n> = <d> m` lines from a [`source`], the
//! [`decoder`] turns them into measurements, and the [`ingest`] channel hands
//! them to the consumer in [`uwb_hub`], which keeps the latest range per anchor
//! and solves a 2D position by linear least squares ([`trilateration`]).
//! Positions land in a bounded history behind [`state::TrackerHandle`], served
//! read-only over HTTP by [`handlers`]. [`calibration`] maps between floorplan
//! pixels and world meters.

pub mod anchors;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod source;
pub mod state;
pub mod trilateration;
pub mod uwb_hub;

pub use anchors::{load_anchors, save_anchors, AnchorConfig};
pub use calibration::{Calibration, CalibrationTransform, Pixel, ScaleBar, Similarity2, WorldRect};
pub use config::TrackerConfig;
pub use decoder::decode;
pub use error::{AnchorFileError, CalibrationError, ConfigError, SolveError, SourceError};
pub use ingest::{ingest_channel, stop_signal, MeasurementReceiver, MeasurementSender, StopHandle, StopSignal};
pub use source::{run_producer, LineSource, SourceSpec, SourceStatus};
pub use state::{CycleOutcome, SharedTracker, TrackerContext, TrackerHandle};
pub use trilateration::{solve, solve_detailed, Solution};
pub use uwb_hub::run_consumer;
