//! Zone tracker - multi-object tracking with polygonal zone analytics
//!
//! Reads per-frame detector output from JSONL files, assigns persistent
//! track identities and reports zone ENTER/EXIT events, retired tracks and
//! per-session summaries.
//!
//! Module structure:
//! - `domain/` - Core types (Detection, Zone, Track, TrackingEvent)
//! - `io/` - External interfaces (frame source, egress, Prometheus)
//! - `services/` - Tracking logic (registry, zone index, aggregator, orchestrator)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use zone_tracker::domain::types::ZoneId;
use zone_tracker::infra::{Config, Metrics};
use zone_tracker::io::{create_egress_channel, Egress, FrameSource};
use zone_tracker::services::FrameOrchestrator;

/// Frames buffered between a source and its session
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// Zone tracker - track people across frames and report zone transitions
#[derive(Parser, Debug)]
#[command(name = "zone-tracker", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Detection frame files (JSONL); each one runs as an independent session
    #[arg(short, long = "input", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git = %env!("GIT_HASH"), "zone_tracker_starting");

    let args = Args::parse();

    // An explicit --config must be valid; implicit locations fall back to defaults
    let config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::load_from_path(Config::resolve_config_path(None)),
    };

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        zones = %config.zones().len(),
        max_match_distance = %config.tracker().max_match_distance,
        max_disappeared_frames = %config.tracker().max_disappeared_frames,
        min_confidence = %config.tracker().min_confidence,
        frame_stride = %config.frame_stride(),
        inputs = %args.inputs.len(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let metrics = Arc::new(Metrics::new());
    let zone_ids: Vec<ZoneId> = config.zones().iter().map(|z| z.id).collect();
    metrics.set_zones(&zone_ids);

    // Egress writer (bounded channel for backpressure)
    let (egress_sender, egress_rx) = create_egress_channel(
        config.egress_channel_capacity(),
        config.site_id().to_string(),
        metrics.clone(),
    );
    // The writer ignores Ctrl+C; it stops once every session has flushed and
    // dropped its sender
    let (egress_stop_tx, egress_stop_rx) = watch::channel(false);
    let egress = Egress::new(&config, metrics.clone());
    let egress_handle = tokio::spawn(egress.run(egress_rx, egress_stop_rx));

    // Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = zone_tracker::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                error!(error = %e, "prometheus_server_error");
            }
        });
    }

    // Periodic metrics reporter
    let reporter_metrics = metrics.clone();
    let mut reporter_shutdown = shutdown_rx.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let reporter_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await; // first tick fires immediately
        loop {
            tokio::select! {
                _ = interval.tick() => reporter_metrics.report().log(),
                changed = reporter_shutdown.changed() => {
                    if changed.is_err() || *reporter_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Handle shutdown on Ctrl+C
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown_signal_received");
            let _ = signal_tx.send(true);
        }
    });

    // One session per input: source -> frame channel -> orchestrator
    let mut sessions = JoinSet::new();
    for input in &args.inputs {
        let orchestrator = FrameOrchestrator::from_config(&config, metrics.clone())
            .with_context(|| format!("Failed to start session for {}", input.display()))?
            .with_source(input.display().to_string());

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let source = FrameSource::new(input, config.frame_stride(), metrics.clone());
        let source_shutdown = shutdown_rx.clone();
        let source_path = input.display().to_string();
        tokio::spawn(async move {
            if let Err(e) = source.run(frame_tx, source_shutdown).await {
                error!(path = %source_path, error = %format!("{e:#}"), "frame_source_error");
            }
        });

        sessions.spawn(orchestrator.run(frame_rx, Some(egress_sender.clone()), shutdown_rx.clone()));
    }
    drop(egress_sender);

    let mut summaries = Vec::new();
    while let Some(result) = sessions.join_next().await {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => warn!(error = %e, "session_task_failed"),
        }
    }

    // All senders are gone; the writer drains and exits
    if let Err(e) = egress_handle.await {
        warn!(error = %e, "egress_task_failed");
    }
    drop(egress_stop_tx);

    let _ = shutdown_tx.send(true);
    let _ = reporter_handle.await;
    metrics.report().log();

    let frames: u64 = summaries.iter().map(|s| s.frames_processed).sum();
    let tracks: u64 = summaries.iter().map(|s| s.tracks_created).sum();
    info!(
        sessions = %summaries.len(),
        frames = %frames,
        tracks = %tracks,
        egress_dropped = %metrics.egress_dropped(),
        "zone_tracker_shutdown_complete"
    );
    Ok(())
}
