//! Fall detection and live monitoring service.
//!
//! Wires the capture pipeline, the HTTP stream surface, the alert fan-out,
//! and the notification runtime together.
//!
//! # Architecture
//!
//! ```text
//! Camera -> DetectionStage -> FallMonitor -> { FrameCell, AlertFanout, NotifierBridge }
//!                                                  |             |            |
//!                                             /video_feed       /ws     notifier runtime
//! ```
//!
//! # Configuration
//!
//! Loaded from config files (config/default.toml, config/{env}.toml) and
//! environment variables prefixed with FALLWATCH_. See `config.rs`.

use anyhow::{Context, Result};
use fallwatch::camera::{CameraSource, CameraStats};
use fallwatch::config::WatchConfig;
use fallwatch::detect::{DetectionStage, PassthroughDetector};
use fallwatch::fall::{ConfirmWindow, FallMonitor};
use fallwatch::fanout::AlertFanout;
use fallwatch::frame_cell::FrameCell;
use fallwatch::notifier::{LogNotifier, NotifierBridge, NotifierRuntime};
use fallwatch::pipeline::{Pipeline, PipelineShared, PipelineStats};
use fallwatch::server::{self, AppState};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;

    init_logging(&config.logging)?;

    info!(
        service = "fallwatch",
        version = env!("CARGO_PKG_VERSION"),
        device = %config.camera.device,
        "Starting fall detection service"
    );

    config.validate().context("Invalid configuration")?;

    // Shared state between the pipeline thread and the HTTP surface.
    let frames = Arc::new(FrameCell::new());
    let alerts = Arc::new(AlertFanout::new());
    let stats = Arc::new(PipelineStats::default());
    let running = Arc::new(AtomicBool::new(true));

    // Notification channel on its own runtime thread. The bridge stays
    // usable (as a logged no-op) even if this fails.
    let bridge = NotifierBridge::new();
    let notifier_runtime = match NotifierRuntime::spawn() {
        Ok(runtime) => {
            if config.notify.recipients.is_empty() {
                warn!("No alert recipients configured");
            }
            let notifier = Arc::new(LogNotifier::new(
                config.notify.recipients.clone(),
                config.notify.send_delay(),
            ));
            bridge.bind(runtime.handle(), notifier);
            Some(runtime)
        }
        Err(e) => {
            error!(error = %e, "Notifier runtime failed to start, alerts will not be delivered");
            None
        }
    };

    // Open the capture device. A camera that cannot open at all is fatal.
    let camera = CameraSource::open(&config.camera).context("Failed to open capture device")?;
    let camera_stats = camera.stats_handle();

    // No model backend is wired in this build; the pipeline runs with a
    // passthrough detector and the service acts as a live monitor.
    info!("No detector backend configured, falls will not be detected");
    let stage = DetectionStage::new(Box::new(PassthroughDetector));

    let monitor = FallMonitor::new(ConfirmWindow {
        min_gap: config.fall.min_gap(),
        max_gap: config.fall.max_gap(),
    });

    let pipeline = Pipeline::new(
        Box::new(camera),
        stage,
        monitor,
        PipelineShared {
            frames: frames.clone(),
            alerts: alerts.clone(),
            bridge: bridge.clone(),
            stats: stats.clone(),
            running: running.clone(),
        },
        &config,
    );
    let pipeline_handle = pipeline
        .spawn()
        .context("Failed to spawn pipeline thread")?;

    // Periodic stats logging.
    let monitor_handle = tokio::spawn(run_stats_monitor(
        stats.clone(),
        camera_stats,
        alerts.clone(),
        running.clone(),
        config.monitor.interval(),
    ));

    // Serve until Ctrl+C.
    let state = AppState {
        frames,
        alerts: alerts.clone(),
        frame_interval: config.stream.frame_interval(),
        jpeg_quality: config.stream.jpeg_quality,
    };
    server::serve(state, &config.stream, shutdown_signal()).await?;

    info!("Initiating graceful shutdown...");

    running.store(false, Ordering::SeqCst);
    monitor_handle.abort();

    if pipeline_handle.join().is_err() {
        error!("Pipeline thread panicked");
    }

    if let Some(runtime) = notifier_runtime {
        runtime.shutdown();
    }

    let final_stats = stats.snapshot();
    info!(
        frames_captured = final_stats.frames_captured,
        detection_cycles = final_stats.detection_cycles,
        detector_failures = final_stats.detector_failures,
        alerts_confirmed = final_stats.alerts_confirmed,
        "Shutdown complete"
    );

    Ok(())
}

/// Load configuration, falling back to environment-only.
fn load_config() -> Result<WatchConfig> {
    let config = WatchConfig::load().or_else(|e| {
        warn!(error = %e, "Failed to load config from files, trying environment");
        WatchConfig::from_env()
    })?;

    Ok(config)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &fallwatch::config::LoggingConfig) -> Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fallwatch={}", level).parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("gstreamer=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}

/// Resolve when the process receives Ctrl+C.
async fn shutdown_signal() {
    signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
    info!("Received shutdown signal");
}

/// Periodically log pipeline and capture statistics.
async fn run_stats_monitor(
    stats: Arc<PipelineStats>,
    camera_stats: Arc<RwLock<CameraStats>>,
    alerts: Arc<AlertFanout>,
    running: Arc<AtomicBool>,
    interval: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // First tick completes immediately.

    while running.load(Ordering::SeqCst) {
        ticker.tick().await;

        let snap = stats.snapshot();
        let camera = camera_stats.read().clone();
        info!(
            frames_captured = snap.frames_captured,
            frames_published = snap.frames_published,
            detection_cycles = snap.detection_cycles,
            detector_failures = snap.detector_failures,
            camera_read_failures = snap.camera_read_failures,
            alerts_confirmed = snap.alerts_confirmed,
            capture_fps = format!("{:.2}", camera.current_fps),
            alert_listeners = alerts.subscriber_count(),
            "Pipeline stats"
        );
    }
}
