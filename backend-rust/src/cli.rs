//! Command-line interface.
//!
//! `uwb-tracker` with no subcommand is `uwb-tracker run`. The calibration,
//! anchor and transform subcommands edit or query the anchors file and exit.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::TrackerConfig;
use crate::source::SourceSpec;

#[derive(Debug, Parser)]
#[command(name = "uwb-tracker", version, about = "UWB tag tracker: ranges in, positions out")]
pub struct Cli {
    /// TOML config file (fields override env and defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Anchors file (overrides config)
    #[arg(long, global = true)]
    pub anchors: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    pub fn command_or_default(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run(RunArgs::default()))
    }

    /// Apply the global flags on top of a loaded config.
    pub fn apply(&self, mut config: TrackerConfig) -> TrackerConfig {
        if let Some(path) = &self.anchors {
            config.anchors_file = path.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Ingest ranges, solve positions and serve the query API (default)
    Run(RunArgs),
    /// Derive a floorplan calibration and store it in the anchors file
    #[command(subcommand)]
    Calibrate(CalibrateCommand),
    /// Edit anchor positions in the anchors file
    #[command(subcommand)]
    Anchor(AnchorCommand),
    /// Query the stored floorplan calibration
    #[command(subcommand)]
    Transform(TransformCommand),
}

// ─── run ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Replay a captured serial log instead of listening live
    #[arg(long, conflicts_with = "stdin")]
    pub logfile: Option<PathBuf>,

    /// Read range lines from standard input
    #[arg(long)]
    pub stdin: bool,

    /// UDP port for live range lines
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// Positions kept in the history
    #[arg(long)]
    pub history: Option<usize>,

    /// Solver cadence in milliseconds
    #[arg(long)]
    pub poll_ms: Option<u64>,

    /// Pause between replayed log lines in milliseconds
    #[arg(long)]
    pub replay_delay_ms: Option<u64>,

    /// Query API listen address
    #[arg(long)]
    pub http_addr: Option<SocketAddr>,
}

impl RunArgs {
    pub fn apply(&self, mut config: TrackerConfig) -> TrackerConfig {
        if let Some(v) = self.udp_port {
            config.udp_port = v;
        }
        if let Some(v) = self.history {
            config.history_capacity = v;
        }
        if let Some(v) = self.poll_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.replay_delay_ms {
            config.replay_delay_ms = v;
        }
        if let Some(v) = self.http_addr {
            config.http_addr = v;
        }
        config
    }

    /// Log replay, stdin, or UDP when neither is given.
    pub fn source_spec(&self, config: &TrackerConfig) -> SourceSpec {
        match (&self.logfile, self.stdin) {
            (Some(path), _) => SourceSpec::LogFile { path: path.clone(), replay_delay: config.replay_delay() },
            (None, true) => SourceSpec::Stdin,
            (None, false) => SourceSpec::Udp { addr: config.udp_addr() },
        }
    }
}

// ─── calibrate ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Subcommand)]
pub enum CalibrateCommand {
    /// Two (pixel, world) correspondences
    TwoPoint(TwoPointArgs),
    /// Scale bar of known length plus one origin correspondence
    ScaleOrigin(ScaleOriginArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ImageArgs {
    /// Image size as HEIGHT,WIDTH in pixels
    #[arg(long, value_parser = parse_shape)]
    pub image_shape: [u32; 2],

    /// Floorplan image the calibration belongs to (only its file name is stored)
    #[arg(long)]
    pub image_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct TwoPointArgs {
    /// First pixel as U,V
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub pixel1: [f64; 2],
    /// World coordinate of the first pixel as X,Y (meters)
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub world1: [f64; 2],
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub pixel2: [f64; 2],
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub world2: [f64; 2],
    #[command(flatten)]
    pub image: ImageArgs,
}

#[derive(Debug, Clone, Args)]
pub struct ScaleOriginArgs {
    /// One end of the scale bar as U,V
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub bar1: [f64; 2],
    /// Other end of the scale bar as U,V
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub bar2: [f64; 2],
    /// Real length of the scale bar in meters
    #[arg(long, allow_hyphen_values = true)]
    pub length: f64,
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub origin_pixel: [f64; 2],
    #[arg(long, value_parser = parse_pair, allow_hyphen_values = true)]
    pub origin_world: [f64; 2],
    #[command(flatten)]
    pub image: ImageArgs,
}

// ─── anchor / transform ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Subcommand)]
pub enum AnchorCommand {
    /// Add or move an anchor
    #[command(allow_negative_numbers = true)]
    Set { id: String, x: f64, y: f64 },
    /// Delete an anchor
    Remove { id: String },
    /// Print all anchors
    List,
}

#[derive(Debug, Clone, Subcommand)]
pub enum TransformCommand {
    /// World rectangle covered by the calibrated image
    Extent,
    /// Map an image pixel to world meters
    #[command(allow_negative_numbers = true)]
    ToWorld { u: f64, v: f64 },
    /// Map world meters to an image pixel
    #[command(allow_negative_numbers = true)]
    ToPixel { x: f64, y: f64 },
}

// ─── Value parsers ────────────────────────────────────────────────────────────

fn split_pair(s: &str) -> Result<(&str, &str), String> {
    s.split_once(',').ok_or_else(|| format!("expected A,B, got {s:?}"))
}

pub fn parse_pair(s: &str) -> Result<[f64; 2], String> {
    let (a, b) = split_pair(s)?;
    let parse = |t: &str| {
        t.trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| format!("not a finite number: {t:?}"))
    };
    Ok([parse(a)?, parse(b)?])
}

pub fn parse_shape(s: &str) -> Result<[u32; 2], String> {
    let (a, b) = split_pair(s)?;
    let parse = |t: &str| t.trim().parse::<u32>().map_err(|e| format!("{t:?}: {e}"));
    Ok([parse(a)?, parse(b)?])
}
