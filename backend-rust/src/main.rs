use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use uwb_tracker::calibration::{Calibration, CalibrationTransform, Pixel, ScaleBar};
use uwb_tracker::cli::{AnchorCommand, CalibrateCommand, Cli, Command, ImageArgs, RunArgs, TransformCommand};
use uwb_tracker::handlers::{router, ApiState};
use uwb_tracker::source::status_channel;
use uwb_tracker::{
    ingest_channel, load_anchors, run_consumer, run_producer, save_anchors, stop_signal, TrackerConfig,
    TrackerContext, TrackerHandle,
};
use uwb_types::Position;

// ─── Run ──────────────────────────────────────────────────────────────────────

async fn run(config: TrackerConfig, args: RunArgs) -> Result<()> {
    let layout = load_anchors(&config.anchors_file)
        .await
        .with_context(|| format!("loading anchors from {}", config.anchors_file.display()))?;
    if layout.anchors.len() < 3 {
        warn!("Only {} anchors configured, at least 3 are needed for a fix", layout.anchors.len());
    }

    let shared = TrackerContext::new(layout.anchors, layout.calibration, config.history_capacity).into_shared();
    let (tx, rx) = ingest_channel();
    let (stop, signal) = stop_signal();
    let (status_tx, status_rx) = status_channel();

    let producer = tokio::spawn(run_producer(args.source_spec(&config), tx, signal.clone(), status_tx));
    let consumer = tokio::spawn(run_consumer(shared.clone(), rx, config.poll_interval(), signal.clone()));

    // Ctrl-C → cooperative stop for every task
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutting down...");
        stop.stop();
    });

    let app = router(ApiState { tracker: TrackerHandle::new(shared), source_status: status_rx });
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("binding query API on {}", config.http_addr))?;
    info!("🚀 Query API listening on http://{}", config.http_addr);

    let mut server_stop = signal;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_stop.cancelled().await })
        .await
        .context("query API server failed")?;

    let produced = producer.await.context("producer task panicked")?;
    let consumed = consumer.await.context("solver task panicked")?;
    info!(
        "Done: {} lines read, {} measurements, {} fixes",
        produced.lines, produced.measurements, consumed.solved
    );
    Ok(())
}

// ─── Calibrate ────────────────────────────────────────────────────────────────

fn stored_file_name(image: &ImageArgs) -> Option<String> {
    image
        .image_file
        .as_deref()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
}

async fn calibrate(path: &Path, cmd: CalibrateCommand) -> Result<()> {
    let mut layout = load_anchors(path).await?;

    let (transform, image) = match cmd {
        CalibrateCommand::TwoPoint(a) => {
            let t = CalibrationTransform::from_two_points(
                Pixel::from(a.pixel1),
                Position::from(a.world1),
                Pixel::from(a.pixel2),
                Position::from(a.world2),
            )?;
            (t, a.image)
        }
        CalibrateCommand::ScaleOrigin(a) => {
            let bar = ScaleBar::measure(Pixel::from(a.bar1), Pixel::from(a.bar2), a.length)?;
            info!("Scale bar: {:.3} px/m", bar.ppm());
            let t = bar.with_origin(Pixel::from(a.origin_pixel), Position::from(a.origin_world))?;
            (t, a.image)
        }
    };

    let calibration = Calibration::new(transform, image.image_shape, stored_file_name(&image));
    let extent = calibration.extent();
    info!(
        "📐 Calibrated: {:.3} px/m, image spans x {:.2}..{:.2} m, y {:.2}..{:.2} m",
        calibration.transform.pixels_per_meter(),
        extent.min_x,
        extent.max_x,
        extent.min_y,
        extent.max_y
    );

    layout.calibration = Some(calibration);
    save_anchors(path, &layout).await?;
    Ok(())
}

// ─── Anchors / Transform ──────────────────────────────────────────────────────

async fn edit_anchors(path: &Path, cmd: AnchorCommand) -> Result<()> {
    let mut layout = load_anchors(path).await?;
    match cmd {
        AnchorCommand::Set { id, x, y } => {
            if uwb_types::IMAGE_TRANSFORM_KEY == id {
                bail!("{id} is reserved");
            }
            let pos = Position::new(x, y);
            if !pos.is_finite() {
                bail!("anchor coordinates must be finite");
            }
            info!("Anchor {id} → ({x}, {y})");
            layout.anchors.insert(id, pos);
        }
        AnchorCommand::Remove { id } => {
            if layout.anchors.remove(&id).is_none() {
                bail!("no anchor named {id}");
            }
            info!("Removed anchor {id}");
        }
        AnchorCommand::List => {
            let listing: std::collections::BTreeMap<_, _> =
                layout.anchors.iter().map(|(id, p)| (id, p.to_array())).collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(());
        }
    }
    save_anchors(path, &layout).await?;
    Ok(())
}

async fn query_transform(path: &Path, cmd: TransformCommand) -> Result<()> {
    let layout = load_anchors(path).await?;
    let calibration = layout
        .calibration
        .with_context(|| format!("no floorplan calibration in {}", path.display()))?;

    let out = match cmd {
        TransformCommand::Extent => serde_json::to_value(calibration.extent())?,
        TransformCommand::ToWorld { u, v } => {
            serde_json::to_value(calibration.transform.pixel_to_world(Pixel::new(u, v)))?
        }
        TransformCommand::ToPixel { x, y } => {
            serde_json::to_value(calibration.transform.world_to_pixel(Position::new(x, y)))?
        }
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "uwb_tracker=info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.apply(TrackerConfig::load(cli.config.as_deref()).context("loading configuration")?);

    match cli.command_or_default() {
        Command::Run(args) => {
            let config = args.apply(config).validate()?;
            info!("📡 UWB tracker starting (anchors: {})", config.anchors_file.display());
            run(config, args).await
        }
        Command::Calibrate(cmd) => calibrate(&config.anchors_file, cmd).await,
        Command::Anchor(cmd) => edit_anchors(&config.anchors_file, cmd).await,
        Command::Transform(cmd) => query_transform(&config.anchors_file, cmd).await,
    }
}
