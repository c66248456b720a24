//! Replay a recorded sensor scenario through a fusion session

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pdr_fusion::api::{EventOutcome, FusedPosition, FusionEvent, FusionSession, SessionStats, Tag};
use pdr_fusion::core::GeoPoint;
use pdr_fusion::utils::config::FusionConfig;

#[derive(Parser, Debug)]
#[command(name = "pdr-fusion")]
#[command(about = "Replay recorded pedestrian sensor events through the fusion engine")]
#[command(version)]
struct Args {
    /// JSON array of sensor events
    scenario: PathBuf,

    /// Fusion configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the result as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Stop at the first event that fails
    #[arg(long)]
    strict: bool,

    /// Log level for diagnostics on stderr
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,
}

#[derive(Serialize)]
struct ReplayReport {
    events: usize,
    failed: usize,
    track: Vec<FusedPosition>,
    tags: Vec<Tag>,
    /// Dead-reckoning-only end point, absent when the session never started
    pdr_end: Option<GeoPoint>,
    floor: i32,
    elevation_m: f32,
    stats: SessionStats,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(args.log_level)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &args.config {
        Some(path) => FusionConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => FusionConfig::default(),
    };

    let scenario = std::fs::read_to_string(&args.scenario)
        .with_context(|| format!("reading scenario {}", args.scenario.display()))?;
    let events: Vec<FusionEvent> =
        serde_json::from_str(&scenario).context("parsing scenario events")?;
    info!(events = events.len(), "Replaying scenario");

    let report = replay(config, events, args.strict)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (i, fused) in report.track.iter().enumerate() {
        println!(
            "{:>4}: lat={:.7}, lon={:.7}, x={:.2} m east, y={:.2} m north, accuracy={:.2} m",
            i, fused.position.latitude, fused.position.longitude, fused.planar.x, fused.planar.y, fused.accuracy_m
        );
    }
    for tag in &report.tags {
        println!(
            "tag {:?}: lat={:.7}, lon={:.7}, floor={}, elevation={:.2} m",
            tag.label.as_deref().unwrap_or("-"),
            tag.position.latitude,
            tag.position.longitude,
            tag.floor,
            tag.elevation_m
        );
    }
    if let Some(pdr) = &report.pdr_end {
        println!("dead reckoning only: lat={:.7}, lon={:.7}", pdr.latitude, pdr.longitude);
    }
    let stats = report.stats;
    println!(
        "{} events ({} failed), {} steps, floor {} ({:.2} m)",
        report.events, report.failed, stats.steps, report.floor, report.elevation_m
    );
    println!(
        "fixes: {} applied, {} recovered, {} outliers, {} suspended, {} dropped, {} rejected",
        stats.fixes_applied, stats.fixes_recovered, stats.outliers, stats.suspended, stats.dropped, stats.rejected
    );
    Ok(())
}

fn replay(config: FusionConfig, events: Vec<FusionEvent>, strict: bool) -> Result<ReplayReport> {
    let mut session = FusionSession::new(config)?;
    let total = events.len();
    let mut failed = 0;
    let mut track = Vec::new();

    for (index, event) in events.into_iter().enumerate() {
        match session.dispatch(event) {
            Ok(outcome) => {
                let moved = matches!(
                    outcome,
                    EventOutcome::Started | EventOutcome::Step { .. } | EventOutcome::Fix { .. } | EventOutcome::JointFix { .. }
                );
                if moved && session.is_recording() {
                    track.push(session.fused_position()?);
                }
            }
            Err(e) if strict => bail!("event {} failed: {}", index, e),
            Err(e) => {
                warn!(index, error = %e, "Event failed");
                failed += 1;
            }
        }
    }

    Ok(ReplayReport {
        events: total,
        failed,
        track,
        tags: session.tags().to_vec(),
        pdr_end: session.pdr_geographic().ok(),
        floor: session.floor(),
        elevation_m: session.elevation(),
        stats: session.stats(),
    })
}
