//! Fallwatch - fall detection and live monitoring for a single camera.
//!
//! This library wires a camera into a detection pipeline that:
//!
//! - Streams live (optionally annotated) video to any number of viewers
//! - Confirms fall incidents with a bounded two-detection window
//! - Fans confirmed alerts out to every connected WebSocket listener
//! - Hands alerts to an asynchronous notification channel
//!
//! # Architecture
//!
//! ```text
//! Camera -> DetectionStage -> FallMonitor -> { FrameCell, AlertFanout, NotifierBridge }
//! ```
//!
//! The pipeline runs on one dedicated thread; viewers and alert listeners
//! are independent Tokio tasks; the notifier has its own runtime thread.

pub mod camera;
pub mod config;
pub mod detect;
pub mod fall;
pub mod fanout;
pub mod frame;
pub mod frame_cell;
pub mod notifier;
pub mod pipeline;
pub mod posture;
pub mod server;

// Re-export main types
pub use camera::{CameraError, CameraSource, CameraStats, FrameGrabber};
pub use config::{ConfigValidationError, WatchConfig};
pub use detect::{
    BoundingBox, Detection, DetectionStage, Detector, DetectorError, Keypoint, PassthroughDetector,
};
pub use fall::{ConfirmWindow, FallAlert, FallMonitor, FallPhase};
pub use fanout::{AlertFanout, AlertSubscription, FALL_ALERT_TOKEN};
pub use frame::{Frame, FrameError};
pub use frame_cell::FrameCell;
pub use notifier::{LogNotifier, Notifier, NotifierBridge, NotifierRuntime, NotifyError};
pub use pipeline::{Pipeline, PipelineShared, PipelineStats, PipelineStatsSnapshot};
pub use server::{create_router, serve, AppState};
