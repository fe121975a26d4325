//! One tick of the live inference loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::detect::SharedModel;
use crate::ingest::CaptureDevice;
use crate::notify::{AudioCue, Notification, Notifier, Severity};
use crate::overlay::{caption_y, OverlaySurface};
use crate::timer::CancelToken;

pub const DEFAULT_WATCHED_CLASS: &str = "bottle";
pub const DEFAULT_ALERT_THRESHOLD: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertPolicy {
    /// Class whose per-tick count drives alerting.
    pub watched_class: String,
    /// Alert when a tick counts at least this many watched objects.
    pub threshold: usize,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            watched_class: DEFAULT_WATCHED_CLASS.to_string(),
            threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl AlertPolicy {
    fn alert(&self, watched: usize) -> Notification {
        let mut title: String = self
            .watched_class
            .chars()
            .take(1)
            .flat_map(char::to_uppercase)
            .collect();
        title.extend(self.watched_class.chars().skip(1));
        Notification::new(
            Severity::Warning,
            format!("{} alert", title),
            format!("{} {}s detected", watched, self.watched_class),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NoFrame,
    ModelNotReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Skipped(SkipReason),
    /// Inference finished after the session was closed; nothing was drawn.
    Discarded,
    Completed { watched: usize, alerted: bool },
}

#[derive(Debug, Default)]
pub struct SessionStats {
    ticks: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
    inference_errors: AtomicU64,
    completed: AtomicU64,
    alerts: AtomicU64,
    frames_captured: AtomicU64,
    device_healthy: AtomicBool,
    last_frame_age_ms: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    pub ticks: u64,
    pub skipped: u64,
    pub discarded: u64,
    pub inference_errors: u64,
    pub completed: u64,
    pub alerts: u64,
    /// Frames the capture device has produced, as reported by the device.
    pub frames_captured: u64,
    /// Device health as of the last tick that read a frame.
    pub device_healthy: bool,
    /// Capture-to-result latency of the last inferred frame.
    pub last_frame_age_ms: u64,
}

impl SessionStats {
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            device_healthy: self.device_healthy.load(Ordering::Relaxed),
            last_frame_age_ms: self.last_frame_age_ms.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Owns the capture device and overlay for one live session.
///
/// Dropping the runner releases both.
pub(crate) struct TickRunner {
    camera_id: String,
    device: Box<dyn CaptureDevice>,
    overlay: Box<dyn OverlaySurface>,
    model: SharedModel,
    policy: AlertPolicy,
    notifier: Arc<dyn Notifier>,
    audio: Arc<dyn AudioCue>,
    stats: Arc<SessionStats>,
}

pub(crate) struct TickResources {
    pub notifier: Arc<dyn Notifier>,
    pub audio: Arc<dyn AudioCue>,
    pub stats: Arc<SessionStats>,
}

impl TickRunner {
    pub(crate) fn new(
        camera_id: impl Into<String>,
        device: Box<dyn CaptureDevice>,
        overlay: Box<dyn OverlaySurface>,
        model: SharedModel,
        policy: AlertPolicy,
        resources: TickResources,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            device,
            overlay,
            model,
            policy,
            notifier: resources.notifier,
            audio: resources.audio,
            stats: resources.stats,
        }
    }

    pub(crate) fn tick(&mut self, cancel: &CancelToken) -> TickOutcome {
        SessionStats::bump(&self.stats.ticks);

        if !self.model.is_ready() {
            return self.skip(SkipReason::ModelNotReady);
        }
        let next = self.device.current_frame();
        self.record_device();
        let frame = match next {
            Ok(Some(frame)) => frame,
            Ok(None) => return self.skip(SkipReason::NoFrame),
            Err(e) => {
                log::debug!("camera {}: no frame this tick: {:#}", self.camera_id, e);
                return self.skip(SkipReason::NoFrame);
            }
        };

        self.overlay.resize(frame.width, frame.height);
        self.overlay.clear();

        let predictions = match self.model.detect(&frame) {
            Ok(Some(predictions)) => predictions,
            Ok(None) => return self.skip(SkipReason::ModelNotReady),
            Err(e) => {
                log::debug!(
                    "camera {}: inference failed on frame {}: {:#}",
                    self.camera_id,
                    frame.sequence,
                    e
                );
                SessionStats::bump(&self.stats.inference_errors);
                Vec::new()
            }
        };
        let age_ms = u64::try_from(frame.age_ms()).unwrap_or(u64::MAX);
        self.stats.last_frame_age_ms.store(age_ms, Ordering::Relaxed);
        drop(frame);

        if cancel.is_cancelled() {
            SessionStats::bump(&self.stats.discarded);
            return TickOutcome::Discarded;
        }

        let mut watched = 0;
        for prediction in predictions
            .iter()
            .filter(|p| p.class_label == self.policy.watched_class)
        {
            watched += 1;
            let rect = prediction.bounding_box;
            self.overlay.stroke_rect(rect);
            self.overlay
                .fill_text(&prediction.caption(), rect.x, caption_y(rect.y));
        }

        let alerted = watched >= self.policy.threshold;
        if alerted {
            log::info!(
                "camera {}: {} {} objects in frame, alerting",
                self.camera_id,
                watched,
                self.policy.watched_class
            );
            self.notifier.notify(self.policy.alert(watched));
            self.audio.play();
            SessionStats::bump(&self.stats.alerts);
        }
        SessionStats::bump(&self.stats.completed);
        TickOutcome::Completed { watched, alerted }
    }

    fn record_device(&self) {
        let capture = self.device.stats();
        self.stats
            .frames_captured
            .store(capture.frames_captured, Ordering::Relaxed);
        self.stats
            .device_healthy
            .store(self.device.is_healthy(), Ordering::Relaxed);
    }

    fn skip(&self, reason: SkipReason) -> TickOutcome {
        SessionStats::bump(&self.stats.skipped);
        TickOutcome::Skipped(reason)
    }
}

impl Drop for TickRunner {
    fn drop(&mut self) {
        self.device.release();
        self.overlay.release();
        log::debug!(
            "camera {}: capture device and overlay released",
            self.camera_id
        );
    }
}
