//! Frame representation and pixel-level operations.
//!
//! Frames are tightly packed RGB24 buffers. Once a frame is published into
//! the shared cell it is never mutated again, so consumers can hold on to it
//! without copying the pixel data.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use thiserror::Error;

/// Bytes per RGB24 pixel.
const BYTES_PER_PIXEL: usize = 3;

/// Errors that can occur when constructing or encoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Buffer length {actual} does not match {width}x{height} RGB frame ({expected} bytes)")]
    BufferMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame dimensions must be non-zero")]
    EmptyDimensions,

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// A tightly packed RGB24 pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Build a frame from a raw RGB24 buffer, validating its length.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions);
        }
        let expected = (width as usize) * (height as usize) * BYTES_PER_PIXEL;
        if data.len() != expected {
            return Err(FrameError::BufferMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGB24 pixel data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Resize to the given dimensions with nearest-neighbor sampling.
    ///
    /// Good enough for the small working frames this pipeline operates on;
    /// a GPU path or `fast_image_resize` would be the upgrade if the working
    /// size ever grows.
    pub fn resized(&self, dst_width: u32, dst_height: u32) -> Frame {
        if dst_width == self.width && dst_height == self.height {
            return self.clone();
        }

        let dst_size = (dst_width as usize) * (dst_height as usize) * BYTES_PER_PIXEL;
        let mut output = vec![0u8; dst_size];

        let x_ratio = self.width as f32 / dst_width as f32;
        let y_ratio = self.height as f32 / dst_height as f32;

        for y in 0..dst_height {
            for x in 0..dst_width {
                let src_x = ((x as f32 * x_ratio) as u32).min(self.width - 1);
                let src_y = ((y as f32 * y_ratio) as u32).min(self.height - 1);

                let src_idx = ((src_y * self.width + src_x) as usize) * BYTES_PER_PIXEL;
                let dst_idx = ((y * dst_width + x) as usize) * BYTES_PER_PIXEL;

                output[dst_idx..dst_idx + BYTES_PER_PIXEL]
                    .copy_from_slice(&self.data[src_idx..src_idx + BYTES_PER_PIXEL]);
            }
        }

        Frame {
            width: dst_width,
            height: dst_height,
            data: output,
        }
    }

    /// Encode the frame as JPEG at the given quality (1-100).
    pub fn encode_jpeg(&self, quality: u8) -> Result<Bytes, FrameError> {
        let mut buf = Vec::with_capacity(self.data.len() / 4);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
        encoder
            .encode(&self.data, self.width, self.height, ExtendedColorType::Rgb8)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }
}
