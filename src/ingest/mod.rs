//! Capture devices for live camera views.
//!
//! A capture device yields the current frame on demand. It is owned by
//! exactly one live session at a time and released when that session closes.
//!
//! - `stub://` URLs: synthetic frames (demos, tests)
//! - `http(s)://` URLs: JPEG snapshots (feature: ingest-http)
//!
//! Capture URLs may contain `{camera_id}`, substituted per camera.

#[cfg(feature = "ingest-http")]
pub mod snapshot;
pub mod synthetic;

use anyhow::Result;
use std::time::Duration;

use crate::frame::Frame;
use crate::records::Camera;

#[cfg(feature = "ingest-http")]
pub use snapshot::SnapshotCamera;
pub use synthetic::SyntheticCamera;

pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    fn connect(&mut self) -> Result<()>;

    /// The current frame, or `None` when no frame is ready yet.
    fn current_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying device. Called once, when the session ends.
    fn release(&mut self);

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> CaptureStats;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "stub://webcam".to_string(),
            width: 640,
            height: 480,
            timeout: Duration::from_secs(5),
        }
    }
}

impl CaptureConfig {
    pub fn for_camera(&self, camera_id: &str) -> CaptureConfig {
        CaptureConfig {
            url: self.url.replace("{camera_id}", camera_id),
            ..self.clone()
        }
    }
}

/// Open a capture device for `config.url`, picking the source by scheme.
pub fn open_capture(config: CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
    if config.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(config)));
    }
    #[cfg(feature = "ingest-http")]
    {
        if config.url.starts_with("http://") || config.url.starts_with("https://") {
            return Ok(Box::new(SnapshotCamera::new(config)?));
        }
        anyhow::bail!("unsupported capture url '{}'", config.url)
    }
    #[cfg(not(feature = "ingest-http"))]
    {
        anyhow::bail!(
            "capture url '{}' requires the ingest-http feature",
            config.url
        )
    }
}

/// Opens one capture device per live session.
pub trait CaptureFactory: Send + Sync {
    fn open(&self, camera: &Camera) -> Result<Box<dyn CaptureDevice>>;
}

/// Factory that opens `config.url` with the camera id substituted.
#[derive(Clone, Debug, Default)]
pub struct UrlCaptureFactory {
    config: CaptureConfig,
}

impl UrlCaptureFactory {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }
}

impl CaptureFactory for UrlCaptureFactory {
    fn open(&self, camera: &Camera) -> Result<Box<dyn CaptureDevice>> {
        open_capture(self.config.for_camera(&camera.id))
    }
}
