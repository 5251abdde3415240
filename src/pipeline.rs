//! The frame ingestion pipeline.
//!
//! One dedicated thread drives capture -> detection -> fall confirmation
//! sequentially; detection dominates frame time, so throughput is controlled
//! by sampling, not parallelism. Every captured frame is published to the
//! shared cell; only sampled frames reach the detector. Confirmed alerts fan
//! out to listeners and hand off to the notifier bridge without blocking.

use crate::camera::FrameGrabber;
use crate::config::WatchConfig;
use crate::detect::DetectionStage;
use crate::fall::{FallAlert, FallMonitor};
use crate::fanout::{AlertFanout, FALL_ALERT_TOKEN};
use crate::frame::Frame;
use crate::frame_cell::FrameCell;
use crate::notifier::NotifierBridge;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Text handed to the notification channel on a confirmed fall.
pub const ALERT_MESSAGE: &str = "Fall detected";

/// Keeps the loop from monopolizing a core when the source returns
/// immediately (synthetic sources, stalled device).
const LOOP_BREATHER: Duration = Duration::from_millis(1);

/// Counters shared with the stats monitor task.
#[derive(Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_published: AtomicU64,
    detection_cycles: AtomicU64,
    detector_failures: AtomicU64,
    camera_read_failures: AtomicU64,
    alerts_confirmed: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Default, Clone)]
pub struct PipelineStatsSnapshot {
    pub frames_captured: u64,
    pub frames_published: u64,
    pub detection_cycles: u64,
    pub detector_failures: u64,
    pub camera_read_failures: u64,
    pub alerts_confirmed: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            detection_cycles: self.detection_cycles.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
            camera_read_failures: self.camera_read_failures.load(Ordering::Relaxed),
            alerts_confirmed: self.alerts_confirmed.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Shared state the pipeline publishes into, and the flag that stops it.
pub struct PipelineShared {
    pub frames: Arc<FrameCell>,
    pub alerts: Arc<AlertFanout>,
    pub bridge: NotifierBridge,
    pub stats: Arc<PipelineStats>,
    pub running: Arc<AtomicBool>,
}

/// Everything the pipeline thread owns.
pub struct Pipeline {
    camera: Box<dyn FrameGrabber>,
    stage: DetectionStage,
    monitor: FallMonitor,
    shared: PipelineShared,
    frame_size: u32,
    sample_stride: u64,
    retry_delay: Duration,
    sequence: u64,
}

impl Pipeline {
    pub fn new(
        camera: Box<dyn FrameGrabber>,
        stage: DetectionStage,
        monitor: FallMonitor,
        shared: PipelineShared,
        config: &WatchConfig,
    ) -> Self {
        Self {
            camera,
            stage,
            monitor,
            shared,
            frame_size: config.camera.frame_size,
            sample_stride: config.detection.sample_stride,
            retry_delay: config.camera.retry_delay(),
            sequence: 0,
        }
    }

    /// Spawn the dedicated pipeline thread.
    pub fn spawn(mut self) -> std::io::Result<std::thread::JoinHandle<()>> {
        std::thread::Builder::new()
            .name("fallwatch-pipeline".to_string())
            .spawn(move || self.run())
    }

    /// Pipeline thread body. Runs until the shared running flag is cleared.
    pub fn run(&mut self) {
        info!(
            frame_size = self.frame_size,
            sample_stride = self.sample_stride,
            "Pipeline started"
        );

        while self.shared.running.load(Ordering::SeqCst) {
            match self.camera.read() {
                Ok(frame) => {
                    self.process_frame(frame);
                }
                Err(e) => {
                    // Cameras drop frames all the time; retry after a beat.
                    PipelineStats::bump(&self.shared.stats.camera_read_failures);
                    debug!(error = %e, "Camera read failed, retrying");
                    std::thread::sleep(self.retry_delay);
                    continue;
                }
            }
            std::thread::sleep(LOOP_BREATHER);
        }

        info!("Pipeline stopped");
    }

    /// Process one captured frame: resize, optionally detect, publish, and
    /// dispatch any confirmed alert.
    fn process_frame(&mut self, frame: Frame) {
        PipelineStats::bump(&self.shared.stats.frames_captured);

        let frame = frame.resized(self.frame_size, self.frame_size);
        self.sequence += 1;

        let (publish, alert) = if self.sequence % self.sample_stride == 0 {
            PipelineStats::bump(&self.shared.stats.detection_cycles);
            match self.stage.run(&frame) {
                Some(detection) => {
                    let alert = self.monitor.observe(detection.fell, Instant::now());
                    (detection.annotated, alert)
                }
                None => {
                    // Detector failure: raw frame stands, fall state untouched.
                    PipelineStats::bump(&self.shared.stats.detector_failures);
                    (frame, None)
                }
            }
        } else {
            (frame, None)
        };

        let shared_frame = self.shared.frames.publish(publish);
        PipelineStats::bump(&self.shared.stats.frames_published);

        if let Some(alert) = alert {
            self.dispatch_alert(alert, shared_frame);
        }
    }

    fn dispatch_alert(&self, alert: FallAlert, frame: Arc<Frame>) {
        PipelineStats::bump(&self.shared.stats.alerts_confirmed);
        warn!(
            elapsed_secs = alert.elapsed.as_secs_f64(),
            "Fall confirmed, dispatching alert"
        );

        let delivered = self.shared.alerts.publish(FALL_ALERT_TOKEN);
        debug!(listeners = delivered, "Alert fanned out");

        self.shared.bridge.notify(ALERT_MESSAGE, frame);
    }
}
