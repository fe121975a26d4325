use anyhow::Result;

use crate::detect::result::Prediction;
use crate::frame::Frame;

/// Object-detection model backend.
///
/// Backends are loaded once per process and shared by every live session.
/// `detect` must not retain the frame beyond the call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Prediction>>;

    /// Optional warm-up hook, run once right after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
