//! main.rs: Simulated UWB tag entry point
//!
//! Walks a tag around a waypoint loop and, every epoch, prints one range line
//! per anchor in the tag's serial-monitor format:
//!
//! ```text
//! 13:38:49.068 -> [TAG] A2 = 3.28 m
//! ```
//!
//! Lines go to the tracker over UDP in real time (`--hub-addr`), or into a
//! replay log as fast as possible (`--out`). Send errors are logged, never fatal.

mod radio;
mod tag_sim;
mod udp_tx;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveTime};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use uwb_types::{AnchorId, AnchorMap, AnchorsFile, Position};

use radio::{generate_epoch, is_reportable, maybe_garbage, RadioConfig, RangeNoise};
use tag_sim::{MotionConfig, TagSim};
use udp_tx::LineSink;

/// Epochs written to a replay log when `--epochs` is not given.
const DEFAULT_LOG_EPOCHS: u64 = 600;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uwb-sim", about = "Simulated UWB tag range reports")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// Anchors file (`{"A1": [x, y], ...}`); defaults to [anchors] in the config
    #[arg(long)]
    anchors: Option<PathBuf>,
    /// Tracker UDP address
    #[arg(long, default_value = "127.0.0.1:5555")]
    hub_addr: String,
    /// Write a replay log instead of sending over UDP
    #[arg(long, conflicts_with = "hub_addr")]
    out: Option<PathBuf>,
    /// Stop after this many epochs
    #[arg(long)]
    epochs: Option<u64>,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    simulation: MotionConfig,
    radio: RadioConfig,
    #[serde(default)]
    anchors: BTreeMap<AnchorId, [f64; 2]>,
}

fn load_config(path: &str) -> Result<FullConfig> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            info!("No config at {path}, using built-in defaults");
            include_str!("../config.toml").to_string()
        }
    };
    let cfg: FullConfig = toml::from_str(&text).with_context(|| format!("invalid config {path}"))?;
    if !(cfg.simulation.rate_hz.is_finite() && cfg.simulation.rate_hz > 0.0) {
        bail!("simulation.rate_hz must be positive");
    }
    Ok(cfg)
}

fn load_anchor_map(path: Option<&Path>, cfg: &FullConfig) -> Result<AnchorMap> {
    let anchors = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading anchors {}", path.display()))?;
            let file: AnchorsFile =
                serde_json::from_str(&text).with_context(|| format!("parsing anchors {}", path.display()))?;
            file.anchor_map()
        }
        None => cfg.anchors.iter().map(|(id, xy)| (id.clone(), Position::from(*xy))).collect(),
    };

    for id in anchors.keys().filter(|id| !is_reportable(id)) {
        warn!("Anchor {id} is not of the form A<n>, the tag cannot report it");
    }
    if anchors.keys().filter(|id| is_reportable(id)).count() < 3 {
        warn!("Fewer than 3 reportable anchors, the tracker will not get a fix");
    }
    Ok(anchors)
}

// ── Epoch ─────────────────────────────────────────────────────────────────────

struct Epoch<'a> {
    sim: TagSim,
    anchors: &'a AnchorMap,
    noise: RangeNoise,
    rng: StdRng,
    dt: f64,
    count: u64,
}

impl Epoch<'_> {
    /// Advance the tag and render this epoch's lines.
    fn next_lines(&mut self, clock: NaiveTime) -> Vec<String> {
        self.sim.tick(self.dt);
        self.count += 1;

        let reports = generate_epoch(self.sim.position(), self.anchors, &self.noise, &mut self.rng);
        for r in &reports {
            debug!(
                "{}: true {:.3} m, reported {:.3} m{}",
                r.anchor_id,
                r.true_range_m,
                r.range_m,
                if r.nlos { " (NLOS)" } else { "" }
            );
        }
        let mut lines: Vec<String> = reports.iter().map(|r| r.to_line(clock)).collect();
        if let Some(noise_line) = maybe_garbage(clock, &self.noise, &mut self.rng) {
            lines.push(noise_line);
        }

        if self.count % 20 == 0 {
            let p = self.sim.position();
            info!(
                "⏱ epoch={} | tag=({:.2}, {:.2}) m | reports={} | walked {:.1} m",
                self.count,
                p.x,
                p.y,
                reports.len(),
                self.sim.odometer_m
            );
        }
        lines
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_sim=info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args.config)?;
    let anchors = load_anchor_map(args.anchors.as_deref(), &cfg)?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut epoch = Epoch {
        sim: TagSim::new(&cfg.simulation),
        anchors: &anchors,
        noise: RangeNoise::new(&cfg.radio).context("invalid radio noise parameters")?,
        rng,
        dt: 1.0 / cfg.simulation.rate_hz,
        count: 0,
    };

    info!(
        "🏷  UWB tag simulator: {} anchors, {} Hz, {} m/s",
        anchors.len(),
        cfg.simulation.rate_hz,
        cfg.simulation.speed_mps
    );

    match &args.out {
        Some(path) => write_log(&mut epoch, path, args.epochs.unwrap_or(DEFAULT_LOG_EPOCHS)),
        None => stream_udp(&mut epoch, &args.hub_addr, args.epochs).await,
    }
}

/// Replay log: synthetic clock, no pacing.
fn write_log(epoch: &mut Epoch<'_>, path: &Path, epochs: u64) -> Result<()> {
    let mut sink = LineSink::log_file(path).with_context(|| format!("creating {}", path.display()))?;
    let step = chrono::Duration::milliseconds((epoch.dt * 1000.0).round() as i64);
    let mut clock = Local::now().time();

    for _ in 0..epochs {
        sink.emit(&epoch.next_lines(clock));
        clock += step;
    }
    sink.flush();
    info!("📝 Wrote {epochs} epochs to {}", path.display());
    Ok(())
}

/// Live stream: one epoch per tick until Ctrl-C or the epoch limit.
async fn stream_udp(epoch: &mut Epoch<'_>, hub_addr: &str, limit: Option<u64>) -> Result<()> {
    let mut sink = LineSink::udp(hub_addr).context("binding UDP socket")?;
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(epoch.dt));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!("📡 Sending range lines to udp://{hub_addr}");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                info!("Stopping simulator");
                break;
            }
        }
        sink.emit(&epoch.next_lines(Local::now().time()));
        if limit.is_some_and(|n| epoch.count >= n) {
            break;
        }
    }
    Ok(())
}
