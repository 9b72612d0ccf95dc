//! Error types for the tracker.
//!
//! A malformed input line is not an error at all (the decoder returns `None`).
//! Solve failures are per-cycle and recoverable, calibration failures go back to
//! the calibrating caller, and only an unavailable source ends the producer task.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a solve cycle produced no position.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveError {
    /// Fewer than three anchors have both a known position and a current range.
    #[error("need at least 3 anchors with known position and range, have {available}")]
    InsufficientAnchors { available: usize },

    /// The linearised system is singular or too ill-conditioned (e.g. collinear anchors).
    #[error("degenerate anchor geometry (normal-matrix determinant {determinant:e})")]
    DegenerateGeometry { determinant: f64 },
}

/// Invalid calibration input. The session is left untouched and the caller may retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("calibration points must be different")]
    DegenerateCalibration,

    #[error("scale-bar length must be a positive number of meters, got {0}")]
    InvalidScaleLength(f64),

    #[error("invalid calibration record: {0}")]
    InvalidRecord(String),
}

/// Line-source failures.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The transport could not be opened. Fatal to the producer only.
    #[error("source {source_name} unavailable: {error}")]
    Unavailable {
        source_name: String,
        #[source]
        error: io::Error,
    },

    #[error("source read failed: {0}")]
    Read(#[from] io::Error),
}

/// Loading or saving the anchors file.
#[derive(Debug, Error)]
pub enum AnchorFileError {
    #[error("anchors file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("anchors file is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("anchor {id} has non-finite coordinates")]
    InvalidAnchor { id: String },

    #[error(transparent)]
    Transform(#[from] CalibrationError),
}

/// Loading the tracker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
