//! Detector seam and the detection stage of the pipeline.
//!
//! The actual object/pose model lives behind the [`Detector`] trait; the
//! pipeline only cares about the per-frame observation it returns. The
//! [`DetectionStage`] wrapper isolates detector failures so that a crashing
//! backend can never take the pipeline thread down with it.

use crate::frame::Frame;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[cfg(test)]
use mockall::automock;

/// Errors a detector backend can surface.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Detector backend unavailable: {0}")]
    Unavailable(String),
}

/// Axis-aligned bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x1 as f32 && x <= self.x2 as f32 && y >= self.y1 as f32 && y <= self.y2 as f32
    }
}

/// A single pose landmark with its model-reported visibility score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub visibility: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self { x, y, visibility }
    }
}

/// Per-frame observation produced by a detector backend.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Whether a fallen person was observed in this frame.
    pub fell: bool,

    /// Detected objects grouped by class label, in detection order.
    pub objects: HashMap<String, Vec<BoundingBox>>,

    /// Frame with detection overlays drawn, published in place of the raw frame.
    pub annotated: Frame,

    /// Pose landmarks for the most prominent person, if any.
    pub keypoints: Vec<Keypoint>,
}

/// Object + pose model consumed by the pipeline.
///
/// Implementations are called repeatedly from the pipeline thread and may
/// fail on any call; the pipeline treats a failure as a skipped cycle.
#[cfg_attr(test, automock)]
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Detection, DetectorError>;
}

/// A detector backend that observes nothing.
///
/// Stands in when no model is wired up, keeping the rest of the service
/// (live stream, alert plumbing) fully operational.
pub struct PassthroughDetector;

impl Detector for PassthroughDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Detection, DetectorError> {
        Ok(Detection {
            fell: false,
            objects: HashMap::new(),
            annotated: frame.clone(),
            keypoints: Vec::new(),
        })
    }
}

/// Wraps a detector and isolates its failures from the pipeline.
pub struct DetectionStage {
    detector: Box<dyn Detector>,
}

impl DetectionStage {
    pub fn new(detector: Box<dyn Detector>) -> Self {
        Self { detector }
    }

    /// Run one detection cycle.
    ///
    /// A detector error is logged and swallowed; the caller keeps the raw
    /// frame and the previous fall state for this cycle.
    pub fn run(&mut self, frame: &Frame) -> Option<Detection> {
        match self.detector.detect(frame) {
            Ok(detection) => Some(detection),
            Err(e) => {
                warn!(error = %e, "Detector failed, skipping cycle");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_frame() -> Frame {
        Frame::from_rgb(vec![0u8; 8 * 8 * 3], 8, 8).unwrap()
    }

    #[test]
    fn test_bounding_box_dimensions() {
        let bbox = BoundingBox::new(10, 20, 40, 100);
        assert_eq!(bbox.width(), 30);
        assert_eq!(bbox.height(), 80);
        assert_eq!(bbox.area(), 2400);
    }

    #[test]
    fn test_bounding_box_contains() {
        let bbox = BoundingBox::new(0, 0, 10, 10);
        assert!(bbox.contains(5.0, 5.0));
        assert!(bbox.contains(0.0, 10.0));
        assert!(!bbox.contains(11.0, 5.0));
    }

    #[test]
    fn test_passthrough_detector_reports_nothing() {
        let frame = create_test_frame();
        let mut detector = PassthroughDetector;
        let detection = detector.detect(&frame).unwrap();
        assert!(!detection.fell);
        assert!(detection.objects.is_empty());
        assert_eq!(detection.annotated, frame);
    }

    #[test]
    fn test_stage_passes_through_success() {
        let frame = create_test_frame();
        let mut stage = DetectionStage::new(Box::new(PassthroughDetector));
        assert!(stage.run(&frame).is_some());
    }

    #[test]
    fn test_stage_swallows_detector_errors() {
        let frame = create_test_frame();
        let mut mock = MockDetector::new();
        mock.expect_detect()
            .times(2)
            .returning(|_| Err(DetectorError::Inference("model exploded".to_string())));

        let mut stage = DetectionStage::new(Box::new(mock));
        assert!(stage.run(&frame).is_none());
        assert!(stage.run(&frame).is_none());
    }
}
