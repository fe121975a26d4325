//! Captured video frames.
//!
//! A `Frame` is an RGB8 image handed from a capture device to the detection
//! model for a single tick. Frames are never persisted.

use anyhow::{anyhow, Result};
use std::time::Instant;

pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Per-device capture counter.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap packed RGB8 pixels. The buffer length must be `width * height * 3`.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 0).is_err());
        let frame = Frame::from_rgb(vec![0u8; 12], 2, 2, 7).unwrap();
        assert_eq!(frame.pixels().len(), 12);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        assert!(rgb_len(u32::MAX, u32::MAX).is_err());
        assert_eq!(rgb_len(640, 480).unwrap(), 921_600);
    }
}
