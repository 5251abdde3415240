//! Single-slot shared buffer holding the most recent frame.
//!
//! The pipeline thread swaps in each new frame; any number of viewer tasks
//! clone the current frame out. The lock is held only for the pointer swap,
//! so a slow viewer can never stall the producer. Publication is
//! last-writer-wins: a reader sees either the previous or the latest frame,
//! never a torn one.

use crate::frame::Frame;
use parking_lot::Mutex;
use std::sync::Arc;

/// Mutex-guarded latest-frame cell.
#[derive(Default)]
pub struct FrameCell {
    slot: Mutex<Option<Arc<Frame>>>,
}

impl FrameCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a new frame, replacing whatever was there.
    ///
    /// Returns the shared handle so the caller can reuse the published frame
    /// (e.g. to attach it to an alert) without another copy.
    pub fn publish(&self, frame: Frame) -> Arc<Frame> {
        let shared = Arc::new(frame);
        *self.slot.lock() = Some(shared.clone());
        shared
    }

    /// Get the most recently published frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slot.lock().clone()
    }

    /// Whether a frame has been published yet.
    pub fn has_frame(&self) -> bool {
        self.slot.lock().is_some()
    }
}
