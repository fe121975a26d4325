//! Live inference sessions.
//!
//! At most one session is active per monitor. Opening a camera closes the
//! previous session first, and its capture device is released before the new
//! device connects. Closing a session stops its timer and waits for the
//! in-flight tick to finish; that tick discards its results.

mod tick;

pub use tick::{
    AlertPolicy, SessionStats, SessionStatsSnapshot, SkipReason, TickOutcome,
    DEFAULT_ALERT_THRESHOLD, DEFAULT_WATCHED_CLASS,
};

use anyhow::{anyhow, Context, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::detect::{ModelStatus, SharedModel};
use crate::ingest::CaptureDevice;
use crate::notify::{AudioCue, Notification, Notifier, Severity};
use crate::overlay::OverlaySurface;
use crate::records::Camera;
use crate::timer::{PeriodicHandle, PeriodicTask};

use tick::{TickResources, TickRunner};

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub tick_period: Duration,
    pub policy: AlertPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_period: DEFAULT_TICK_PERIOD,
            policy: AlertPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No model load started, no session open.
    Idle,
    ModelLoading,
    /// Model ready, no session open.
    Ready,
    Capturing,
    /// A session was open and has been closed.
    Closed,
    /// The model failed to load; sessions cannot be opened.
    Degraded,
}

/// Point-in-time view of the active session, for health logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionHealth {
    pub camera_id: String,
    /// Capture source the device reported when it connected.
    pub source: String,
    /// Name of the inference timer thread.
    pub worker: String,
    /// False once the timer thread has exited without being closed.
    pub worker_alive: bool,
    pub uptime: Duration,
    pub stats: SessionStatsSnapshot,
}

struct LiveSession {
    camera: Camera,
    source: String,
    timer: PeriodicHandle,
    stats: Arc<SessionStats>,
    opened_at: Instant,
}

#[derive(Default)]
struct MonitorSlot {
    active: Option<LiveSession>,
    closed_any: bool,
}

pub struct LiveMonitor {
    model: SharedModel,
    notifier: Arc<dyn Notifier>,
    audio: Arc<dyn AudioCue>,
    config: SessionConfig,
    slot: Mutex<MonitorSlot>,
    live_timers: Arc<AtomicUsize>,
}

impl LiveMonitor {
    pub fn new(
        model: SharedModel,
        notifier: Arc<dyn Notifier>,
        audio: Arc<dyn AudioCue>,
        config: SessionConfig,
    ) -> Self {
        Self {
            model,
            notifier,
            audio,
            config,
            slot: Mutex::new(MonitorSlot::default()),
            live_timers: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn model(&self) -> &SharedModel {
        &self.model
    }

    /// Start a live session on `camera`, replacing any active one.
    ///
    /// Fails with an error notification when the model failed to load or the
    /// device cannot connect. A model that is still loading is not an error;
    /// ticks are skipped until it is ready.
    pub fn open(
        &self,
        camera: &Camera,
        mut device: Box<dyn CaptureDevice>,
        overlay: Box<dyn OverlaySurface>,
    ) -> Result<()> {
        let mut slot = self.lock_slot();
        self.ensure_model_usable(camera)?;

        if let Some(previous) = slot.active.take() {
            self.shutdown(previous)?;
            slot.closed_any = true;
        }

        if let Err(e) = device.connect() {
            device.release();
            log::warn!("camera {}: capture connect failed: {:#}", camera.id, e);
            self.notifier.notify(Notification::new(
                Severity::Error,
                "Camera unavailable",
                format!("Could not access the camera feed for {}", camera.name),
            ));
            return Err(e).with_context(|| format!("failed to connect camera {}", camera.id));
        }

        let source = device.stats().source;
        let stats = Arc::new(SessionStats::default());
        let mut runner = TickRunner::new(
            camera.id.clone(),
            device,
            overlay,
            self.model.clone(),
            self.config.policy.clone(),
            TickResources {
                notifier: self.notifier.clone(),
                audio: self.audio.clone(),
                stats: stats.clone(),
            },
        );
        let timer = PeriodicTask::new(format!("live-{}", camera.id), self.config.tick_period)
            .track_live(self.live_timers.clone())
            .spawn(move |token| {
                runner.tick(token);
            })?;

        log::info!(
            "live view opened for camera {} ({}) from {}, tick every {:?}",
            camera.id,
            camera.name,
            source,
            self.config.tick_period
        );
        slot.active = Some(LiveSession {
            camera: camera.clone(),
            source,
            timer,
            stats,
            opened_at: Instant::now(),
        });
        Ok(())
    }

    /// Reject a live view up front when the model failed to load.
    ///
    /// Raises the model-failure error notification on every rejected attempt.
    pub fn ensure_model_usable(&self, camera: &Camera) -> Result<()> {
        if let ModelStatus::Failed(reason) = self.model.status() {
            self.notifier.notify(Notification::new(
                Severity::Error,
                "Error",
                "Object detection is unavailable: the model failed to load",
            ));
            return Err(anyhow!(
                "cannot open live view for camera {}: model failed to load: {}",
                camera.id,
                reason
            ));
        }
        Ok(())
    }

    /// Close the active session. Returns whether one was open.
    pub fn close(&self) -> Result<bool> {
        let mut slot = self.lock_slot();
        match slot.active.take() {
            Some(session) => {
                slot.closed_any = true;
                self.shutdown(session)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn state(&self) -> SessionState {
        let slot = self.lock_slot();
        if slot.active.is_some() {
            return SessionState::Capturing;
        }
        match self.model.status() {
            ModelStatus::Failed(_) => SessionState::Degraded,
            _ if slot.closed_any => SessionState::Closed,
            ModelStatus::Unloaded => SessionState::Idle,
            ModelStatus::Loading => SessionState::ModelLoading,
            ModelStatus::Ready => SessionState::Ready,
        }
    }

    pub fn active_camera(&self) -> Option<Camera> {
        self.lock_slot()
            .active
            .as_ref()
            .map(|session| session.camera.clone())
    }

    /// Live inference timers across all sessions of this monitor.
    pub fn active_timers(&self) -> usize {
        self.live_timers.load(Ordering::SeqCst)
    }

    pub fn session_stats(&self) -> Option<SessionStatsSnapshot> {
        self.lock_slot()
            .active
            .as_ref()
            .map(|session| session.stats.snapshot())
    }

    pub fn health(&self) -> Option<SessionHealth> {
        self.lock_slot().active.as_ref().map(|session| SessionHealth {
            camera_id: session.camera.id.clone(),
            source: session.source.clone(),
            worker: session.timer.name().to_string(),
            worker_alive: !session.timer.is_finished(),
            uptime: session.opened_at.elapsed(),
            stats: session.stats.snapshot(),
        })
    }

    fn shutdown(&self, session: LiveSession) -> Result<()> {
        let LiveSession {
            camera,
            timer,
            stats,
            opened_at,
            ..
        } = session;
        let worker = timer.name().to_string();
        timer.stop()?;
        let stats = stats.snapshot();
        log::info!(
            "live view closed for camera {} ({}) after {}s: {} ticks, {} skipped, {} discarded, {} alerts",
            camera.id,
            worker,
            opened_at.elapsed().as_secs(),
            stats.ticks,
            stats.skipped,
            stats.discarded,
            stats.alerts
        );
        Ok(())
    }

    fn lock_slot(&self) -> MutexGuard<'_, MonitorSlot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for LiveMonitor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("failed to close live view: {:#}", e);
        }
    }
}
