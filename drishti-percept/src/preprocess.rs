//! Frame validation and tensor preparation
//!
//! Converts raw camera frames into the tensor a backend expects, guarding
//! every inference call behind integrity checks. A single bad frame is
//! skipped; a persistent streak of bad frames is escalated as a camera
//! fault rather than silently dropped, since that indicates a hardware or
//! stream problem and not a one-off glitch.

use crate::error::PerceptError;
use crate::tensor::{Tensor, TensorShape};
use drishti_core::Frame;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::{debug, warn};

/// Bytes sampled from the head of each plane for the all-zero check.
const ZERO_SAMPLE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CorruptReason {
    ZeroDimensions,
    MissingPlanes,
    EmptyPlane,
    ShortPlane,
    AllZeroBuffer,
}

impl std::fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptReason::ZeroDimensions => write!(f, "zero width or height"),
            CorruptReason::MissingPlanes => write!(f, "unsupported plane count"),
            CorruptReason::EmptyPlane => write!(f, "empty pixel plane"),
            CorruptReason::ShortPlane => write!(f, "plane shorter than dimensions require"),
            CorruptReason::AllZeroBuffer => write!(f, "degenerate all-zero buffer"),
        }
    }
}

/// Validates frames and prepares backend input tensors.
pub struct FramePreprocessor {
    corrupted_streak: u32,
    streak_limit: u32,
}

impl FramePreprocessor {
    pub fn new(streak_limit: u32) -> Self {
        Self {
            corrupted_streak: 0,
            streak_limit,
        }
    }

    /// Current run of consecutive corrupted frames.
    pub fn corrupted_streak(&self) -> u32 {
        self.corrupted_streak
    }

    /// Validate a frame and convert it to the target tensor shape.
    ///
    /// Returns `Ok(Some(tensor))` for a valid frame, `Ok(None)` for a
    /// single corrupted frame (skipped, streak incremented), and
    /// `Err(CameraFeedCorrupted)` exactly once when the streak reaches the
    /// configured limit. A valid frame resets the streak to zero.
    pub fn prepare(
        &mut self,
        frame: &Frame,
        target: &TensorShape,
    ) -> Result<Option<Tensor>, PerceptError> {
        if let Some(reason) = Self::validate(frame) {
            warn!("Skipping corrupted frame: {}", reason);
            self.corrupted_streak = self.corrupted_streak.saturating_add(1);
            if self.corrupted_streak >= self.streak_limit {
                let consecutive = self.corrupted_streak;
                // Reset so the fault is raised once per streak, not once
                // per frame after the threshold.
                self.corrupted_streak = 0;
                return Err(PerceptError::CameraFeedCorrupted { consecutive });
            }
            return Ok(None);
        }

        self.corrupted_streak = 0;

        let rgb = Self::to_rgb(frame)?;
        let tensor = Self::rgb_to_tensor(&rgb, target)?;
        debug!(
            "Prepared {}x{} frame into tensor {:?}",
            frame.width, frame.height, target.dims
        );
        Ok(Some(tensor))
    }

    /// Integrity checks, short-circuiting on the first failure.
    fn validate(frame: &Frame) -> Option<CorruptReason> {
        if frame.width == 0 || frame.height == 0 {
            return Some(CorruptReason::ZeroDimensions);
        }

        if frame.planes.is_empty() || frame.planes.len() == 2 || frame.planes.len() > 3 {
            return Some(CorruptReason::MissingPlanes);
        }

        if frame.planes.iter().any(|p| p.is_empty()) {
            return Some(CorruptReason::EmptyPlane);
        }

        // First plane carries at least one byte per pixel in every
        // supported layout (gray, packed RGB, YUV luma).
        let pixels = frame.width as usize * frame.height as usize;
        if frame.planes[0].len() < pixels {
            return Some(CorruptReason::ShortPlane);
        }
        if frame.planes.len() == 3 {
            let chroma_len =
                (frame.width as usize).div_ceil(2) * (frame.height as usize).div_ceil(2);
            if frame.planes[1].len() < chroma_len || frame.planes[2].len() < chroma_len {
                return Some(CorruptReason::ShortPlane);
            }
        }

        // Sampled, not exhaustive: a real sensor never produces a run of
        // leading zero bytes across every plane.
        let all_zero = frame.planes.iter().all(|p| {
            let sample = &p[..p.len().min(ZERO_SAMPLE_LEN)];
            sample.iter().all(|&b| b == 0)
        });
        if all_zero {
            return Some(CorruptReason::AllZeroBuffer);
        }

        None
    }

    /// Convert the frame's plane layout to a packed RGB image.
    fn to_rgb(frame: &Frame) -> Result<RgbImage, PerceptError> {
        let width = frame.width;
        let height = frame.height;
        let pixels = width as usize * height as usize;

        let mut rgb = RgbImage::new(width, height);

        match frame.planes.len() {
            1 => {
                let plane = &frame.planes[0];
                if plane.len() >= pixels * 3 {
                    // Packed RGB8
                    for (i, pixel) in rgb.pixels_mut().enumerate() {
                        let base = i * 3;
                        pixel.0 = [plane[base], plane[base + 1], plane[base + 2]];
                    }
                } else {
                    // Grayscale
                    for (i, pixel) in rgb.pixels_mut().enumerate() {
                        let v = plane[i];
                        pixel.0 = [v, v, v];
                    }
                }
            }
            3 => {
                // Planar YUV420, BT.601 full range
                let y_plane = &frame.planes[0];
                let u_plane = &frame.planes[1];
                let v_plane = &frame.planes[2];
                let chroma_width = (width as usize).div_ceil(2);

                for row in 0..height as usize {
                    for col in 0..width as usize {
                        let y = y_plane[row * width as usize + col] as f32;
                        let chroma_idx = (row / 2) * chroma_width + col / 2;
                        let u = u_plane[chroma_idx] as f32 - 128.0;
                        let v = v_plane[chroma_idx] as f32 - 128.0;

                        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
                        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
                        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
                        rgb.put_pixel(col as u32, row as u32, image::Rgb([r, g, b]));
                    }
                }
            }
            _ => {
                // Already rejected by validate()
                return Err(PerceptError::Config(format!(
                    "Unsupported plane count: {}",
                    frame.planes.len()
                )));
            }
        }

        Ok(rgb)
    }

    /// Resize to the target shape and normalize to f32 in [0, 1], NHWC.
    fn rgb_to_tensor(rgb: &RgbImage, target: &TensorShape) -> Result<Tensor, PerceptError> {
        let (target_h, target_w, channels) = target.hwc().ok_or_else(|| {
            PerceptError::Config(format!("Target shape {:?} is not an image shape", target.dims))
        })?;
        if channels != 3 {
            return Err(PerceptError::Config(format!(
                "Target shape must have 3 channels, got {}",
                channels
            )));
        }

        let element_count = target.element_count().ok_or_else(|| {
            PerceptError::Config("Target shape overflows element count".to_string())
        })?;
        if element_count > 100_000_000 {
            return Err(PerceptError::Config(
                "Target shape too large (max 100M elements)".to_string(),
            ));
        }

        let resized = imageops::resize(rgb, target_w as u32, target_h as u32, FilterType::Triangle);

        let mut data = Vec::with_capacity(element_count);
        for pixel in resized.pixels() {
            data.push(pixel.0[0] as f32 / 255.0);
            data.push(pixel.0[1] as f32 / 255.0);
            data.push(pixel.0[2] as f32 / 255.0);
        }

        Tensor::new(target.clone(), data).map_err(PerceptError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn valid_frame(width: u32, height: u32) -> Frame {
        let mut data = vec![0u8; (width * height * 3) as usize];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = (i % 251) as u8 + 1;
        }
        Frame::new(width, height, vec![Bytes::from(data)])
    }

    fn corrupted_frame() -> Frame {
        Frame::new(0, 480, vec![Bytes::from(vec![1u8; 16])])
    }

    #[test]
    fn test_valid_frame_produces_tensor() {
        let mut pre = FramePreprocessor::new(10);
        let frame = valid_frame(32, 24);
        let tensor = pre
            .prepare(&frame, &TensorShape::image(16, 16, 3))
            .unwrap()
            .unwrap();
        assert_eq!(tensor.data.len(), 16 * 16 * 3);
        assert!(tensor.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_zero_dimensions_skipped() {
        let mut pre = FramePreprocessor::new(10);
        let result = pre
            .prepare(&corrupted_frame(), &TensorShape::image(16, 16, 3))
            .unwrap();
        assert!(result.is_none());
        assert_eq!(pre.corrupted_streak(), 1);
    }

    #[test]
    fn test_empty_plane_skipped() {
        let mut pre = FramePreprocessor::new(10);
        let frame = Frame::new(8, 8, vec![Bytes::new()]);
        let result = pre.prepare(&frame, &TensorShape::image(8, 8, 3)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_all_zero_buffer_skipped() {
        let mut pre = FramePreprocessor::new(10);
        let frame = Frame::new(8, 8, vec![Bytes::from(vec![0u8; 8 * 8 * 3])]);
        let result = pre.prepare(&frame, &TensorShape::image(8, 8, 3)).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_streak_escalates_exactly_once() {
        let mut pre = FramePreprocessor::new(10);
        let target = TensorShape::image(8, 8, 3);

        for i in 0..9 {
            let result = pre.prepare(&corrupted_frame(), &target).unwrap();
            assert!(result.is_none(), "frame {} should be skipped", i);
        }
        assert_eq!(pre.corrupted_streak(), 9);

        // Tenth corrupted frame escalates
        let err = pre.prepare(&corrupted_frame(), &target).unwrap_err();
        match err {
            PerceptError::CameraFeedCorrupted { consecutive } => assert_eq!(consecutive, 10),
            other => panic!("Expected CameraFeedCorrupted, got {:?}", other),
        }

        // Streak restarted; next corrupted frame is a plain skip again
        assert_eq!(pre.corrupted_streak(), 0);
        assert!(pre.prepare(&corrupted_frame(), &target).unwrap().is_none());
    }

    #[test]
    fn test_valid_frame_resets_streak() {
        let mut pre = FramePreprocessor::new(10);
        let target = TensorShape::image(8, 8, 3);

        for _ in 0..9 {
            let _ = pre.prepare(&corrupted_frame(), &target).unwrap();
        }
        assert_eq!(pre.corrupted_streak(), 9);

        let _ = pre.prepare(&valid_frame(8, 8), &target).unwrap().unwrap();
        assert_eq!(pre.corrupted_streak(), 0);

        // Streak starts over; no escalation on the next bad frame
        assert!(pre.prepare(&corrupted_frame(), &target).unwrap().is_none());
        assert_eq!(pre.corrupted_streak(), 1);
    }

    #[test]
    fn test_yuv420_conversion() {
        let width = 4u32;
        let height = 4u32;
        // Mid-gray luma, neutral chroma
        let y = Bytes::from(vec![128u8; 16]);
        let u = Bytes::from(vec![128u8; 4]);
        let v = Bytes::from(vec![128u8; 4]);
        let frame = Frame::new(width, height, vec![y, u, v]);

        let mut pre = FramePreprocessor::new(10);
        let tensor = pre
            .prepare(&frame, &TensorShape::image(4, 4, 3))
            .unwrap()
            .unwrap();
        // Neutral chroma means R == G == B == Y
        for chunk in tensor.data.chunks(3) {
            assert!((chunk[0] - chunk[1]).abs() < 0.02);
            assert!((chunk[1] - chunk[2]).abs() < 0.02);
            assert!((chunk[0] - 128.0 / 255.0).abs() < 0.02);
        }
    }

    #[test]
    fn test_short_chroma_plane_skipped() {
        let frame = Frame::new(
            4,
            4,
            vec![
                Bytes::from(vec![100u8; 16]),
                Bytes::from(vec![128u8; 1]), // needs 4
                Bytes::from(vec![128u8; 4]),
            ],
        );
        let mut pre = FramePreprocessor::new(10);
        let result = pre.prepare(&frame, &TensorShape::image(4, 4, 3)).unwrap();
        assert!(result.is_none());
    }
}
