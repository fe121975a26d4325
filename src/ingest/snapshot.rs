//! HTTP snapshot capture device.
//!
//! Pulls one JPEG per request from the camera's snapshot endpoint and decodes
//! it in memory. A failed fetch is reported to the caller, which treats it as
//! "no frame ready" for that tick.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GenericImageView;
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use super::{CaptureConfig, CaptureDevice, CaptureStats};
use crate::frame::Frame;

const MAX_JPEG_BYTES: u64 = 5 * 1024 * 1024;

pub struct SnapshotCamera {
    config: CaptureConfig,
    url: Url,
    agent: Option<ureq::Agent>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl SnapshotCamera {
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse snapshot url")?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported snapshot scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        Ok(Self {
            config,
            url,
            agent: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn fetch_jpeg(&self, agent: &ureq::Agent) -> Result<Vec<u8>> {
        let response = agent
            .request_url("GET", &self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        Ok(bytes)
    }
}

impl CaptureDevice for SnapshotCamera {
    fn name(&self) -> &str {
        &self.config.url
    }

    fn connect(&mut self) -> Result<()> {
        self.agent = Some(ureq::AgentBuilder::new().timeout(self.config.timeout).build());
        log::info!("capture: polling snapshots from {}", self.url);
        Ok(())
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        let Some(agent) = self.agent.clone() else {
            return Ok(None);
        };
        let decoded = self
            .fetch_jpeg(&agent)
            .and_then(|bytes| decode_jpeg(&bytes, self.config.width, self.config.height));
        let (pixels, width, height) = match decoded {
            Ok(decoded) => decoded,
            Err(e) => {
                self.last_error = Some(e.to_string());
                return Err(e);
            }
        };
        self.last_error = None;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(pixels, width, height, self.frame_count).map(Some)
    }

    fn release(&mut self) {
        if self.agent.take().is_some() {
            log::info!("capture: released {}", self.url);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.agent.is_none() {
            return false;
        }
        self.last_frame_at
            .map_or(true, |at| at.elapsed() <= Duration::from_secs(5))
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}

/// Decode to RGB8, scaled to the configured capture size when it differs.
fn decode_jpeg(bytes: &[u8], width: u32, height: u32) -> Result<(Vec<u8>, u32, u32)> {
    let mut image = image::load_from_memory(bytes).context("decode jpeg")?;
    if image.dimensions() != (width, height) {
        image = image.resize_exact(width, height, FilterType::Triangle);
    }
    let (width, height) = image.dimensions();
    Ok((image.into_rgb8().into_raw(), width, height))
}
