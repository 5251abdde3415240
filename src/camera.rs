//! Camera capture via GStreamer.
//!
//! The capture device is opened once at startup and read synchronously from
//! the pipeline thread through an `appsink`, keeping the frame path
//! sequential. Cameras are assumed transient-fault-prone: a failed read is
//! reported to the caller, which sleeps briefly and retries indefinitely.

use crate::config::CameraConfig;
use crate::frame::Frame;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during capture.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("GStreamer initialization failed: {0}")]
    Init(String),

    #[error("Capture pipeline creation failed: {0}")]
    PipelineCreation(String),

    #[error("Capture pipeline element not found: {0}")]
    ElementNotFound(String),

    #[error("Capture device failed to start: {0}")]
    StartFailed(String),

    #[error("Timed out waiting for a frame")]
    ReadTimeout,

    #[error("Frame read failed: {0}")]
    ReadFailed(String),
}

/// Statistics for the capture device.
#[derive(Debug, Default, Clone)]
pub struct CameraStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub bytes_read: u64,
    pub current_fps: f64,
    pub opened_at: Option<Instant>,
}

/// Source of frames consumed by the pipeline thread.
///
/// The seam exists so the pipeline can be driven by a synthetic source in
/// tests; the production implementation is [`CameraSource`].
pub trait FrameGrabber: Send {
    fn read(&mut self) -> Result<Frame, CameraError>;
}

/// GStreamer-backed capture device.
pub struct CameraSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    config: CameraConfig,
    stats: Arc<RwLock<CameraStats>>,
}

impl CameraSource {
    /// Open the capture device and start the pipeline.
    ///
    /// Failure here is fatal by policy: a camera that cannot open at all is
    /// a deployment problem, not a transient fault.
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        gst::init().map_err(|e| CameraError::Init(e.to_string()))?;

        let pipeline_str = build_pipeline_string(config);
        debug!(pipeline = %pipeline_str, "Creating capture pipeline");

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| CameraError::PipelineCreation(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CameraError::PipelineCreation("Failed to cast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::ElementNotFound("appsink".to_string()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CameraError::ElementNotFound("Could not cast to AppSink".to_string()))?;

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CameraError::StartFailed(e.to_string()))?;

        // Wait for the state change to complete before handing the device out.
        let (result, _state, _pending) = pipeline.state(gst::ClockTime::from_seconds(
            config.connection_timeout_secs,
        ));
        if result.is_err() {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(CameraError::StartFailed(
                "Timeout waiting for capture pipeline to start".to_string(),
            ));
        }

        info!(
            device = %config.device,
            width = config.capture_width,
            height = config.capture_height,
            fps = config.capture_fps,
            "Capture device opened"
        );

        let stats = CameraStats {
            opened_at: Some(Instant::now()),
            ..CameraStats::default()
        };

        Ok(Self {
            pipeline,
            appsink,
            config: config.clone(),
            stats: Arc::new(RwLock::new(stats)),
        })
    }

    /// Current capture statistics.
    pub fn stats(&self) -> CameraStats {
        self.stats.read().clone()
    }

    /// Shared handle to the statistics, for the monitor task.
    pub fn stats_handle(&self) -> Arc<RwLock<CameraStats>> {
        self.stats.clone()
    }

    fn record_failure(&self) {
        self.stats.write().read_failures += 1;
    }

    fn record_frame(&self, bytes: usize) {
        let mut stats = self.stats.write();
        stats.frames_read += 1;
        stats.bytes_read += bytes as u64;
        if let Some(opened) = stats.opened_at {
            let elapsed = opened.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                stats.current_fps = stats.frames_read as f64 / elapsed;
            }
        }
    }
}

impl FrameGrabber for CameraSource {
    /// Pull one frame, waiting at most the configured read timeout.
    fn read(&mut self) -> Result<Frame, CameraError> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_mseconds(self.config.read_timeout_ms))
            .ok_or_else(|| {
                self.record_failure();
                CameraError::ReadTimeout
            })?;

        let result = sample_to_frame(&sample, &self.config);
        match &result {
            Ok(frame) => self.record_frame(frame.data().len()),
            Err(_) => self.record_failure(),
        }
        result
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Build the GStreamer pipeline string for the configured device.
fn build_pipeline_string(config: &CameraConfig) -> String {
    format!(
        "v4l2src device={device} \
         ! videoconvert ! videoscale \
         ! video/x-raw,format=RGB,width={width},height={height},framerate={fps}/1 \
         ! appsink name=sink sync=false max-buffers=2 drop=true",
        device = config.device,
        width = config.capture_width,
        height = config.capture_height,
        fps = config.capture_fps,
    )
}

/// Convert a pulled sample into an owned RGB frame.
fn sample_to_frame(sample: &gst::Sample, config: &CameraConfig) -> Result<Frame, CameraError> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| CameraError::ReadFailed("Sample without buffer".to_string()))?;
    let caps = sample
        .caps()
        .ok_or_else(|| CameraError::ReadFailed("Sample without caps".to_string()))?;

    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| CameraError::ReadFailed(format!("Unreadable caps: {e}")))?;
    let (width, height) = (info.width(), info.height());

    let map = buffer
        .map_readable()
        .map_err(|_| CameraError::ReadFailed("Buffer not readable".to_string()))?;

    Frame::from_rgb(map.as_slice().to_vec(), width, height).map_err(|e| {
        CameraError::ReadFailed(format!(
            "Device {} produced a malformed frame: {e}",
            config.device
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraConfig;

    fn create_test_config() -> CameraConfig {
        CameraConfig {
            device: "/dev/video0".to_string(),
            capture_width: 640,
            capture_height: 480,
            capture_fps: 30,
            frame_size: 320,
            read_timeout_ms: 500,
            retry_delay_ms: 10,
            connection_timeout_secs: 10,
        }
    }

    #[test]
    fn test_pipeline_string_contains_device_and_caps() {
        let config = create_test_config();
        let pipeline = build_pipeline_string(&config);
        assert!(pipeline.contains("v4l2src device=/dev/video0"));
        assert!(pipeline.contains("format=RGB"));
        assert!(pipeline.contains("width=640,height=480"));
        assert!(pipeline.contains("framerate=30/1"));
        assert!(pipeline.contains("appsink name=sink"));
    }

    #[test]
    fn test_pipeline_string_custom_device() {
        let mut config = create_test_config();
        config.device = "/dev/video2".to_string();
        let pipeline = build_pipeline_string(&config);
        assert!(pipeline.contains("device=/dev/video2"));
    }

    #[test]
    fn test_camera_stats_default() {
        let stats = CameraStats::default();
        assert_eq!(stats.frames_read, 0);
        assert_eq!(stats.read_failures, 0);
        assert!(stats.opened_at.is_none());
    }
}
