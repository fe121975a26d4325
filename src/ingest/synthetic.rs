//! Synthetic capture device for `stub://` URLs.
//!
//! Produces a slowly shifting RGB pattern. No frame is ready before
//! `connect()` or after `release()`.

use anyhow::Result;

use super::{CaptureConfig, CaptureDevice, CaptureStats};
use crate::frame::{rgb_len, Frame};

pub struct SyntheticCamera {
    config: CaptureConfig,
    connected: bool,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticCamera {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_pixels(&mut self) -> Result<Vec<u8>> {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; rgb_len(self.config.width, self.config.height)?];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("capture: connected to {} (synthetic)", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels()?;
        Frame::from_rgb(pixels, self.config.width, self.config.height, self.frame_count).map(Some)
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("capture: released {}", self.config.url);
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
