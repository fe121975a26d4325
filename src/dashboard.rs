//! Dashboard wiring.
//!
//! A `Dashboard` owns the registry synchronizer, the live monitor, the map
//! viewport and the overlay for as long as the dashboard view is active.
//! `deactivate` (or drop) closes the live session and cancels both sync
//! timers; no fetch starts after it returns.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::detect::SharedModel;
use crate::gateway::RegistryGateway;
use crate::ingest::CaptureFactory;
use crate::marker::{derive_marker_state, MarkerState};
use crate::notify::{AudioCue, Notification, Notifier, Severity};
use crate::overlay::DrawList;
use crate::records::{Camera, WasteDetection};
use crate::session::{LiveMonitor, SessionConfig, SessionState};
use crate::sync::{Registry, RegistrySync, SyncConfig, SyncHandle};
use crate::view::Viewport;

#[derive(Clone, Debug, Default)]
pub struct DashboardOptions {
    pub sync: SyncConfig,
    pub session: SessionConfig,
    pub viewport: Viewport,
}

/// External collaborators of a dashboard.
pub struct DashboardDeps {
    pub gateway: Arc<dyn RegistryGateway>,
    pub captures: Arc<dyn CaptureFactory>,
    pub model: SharedModel,
    pub notifier: Arc<dyn Notifier>,
    pub audio: Arc<dyn AudioCue>,
}

pub struct Dashboard {
    sync: Arc<RegistrySync>,
    registry: Arc<Registry>,
    monitor: LiveMonitor,
    captures: Arc<dyn CaptureFactory>,
    notifier: Arc<dyn Notifier>,
    overlay: DrawList,
    viewport: Mutex<Viewport>,
    timers: Mutex<Option<SyncHandle>>,
}

impl Dashboard {
    pub fn new(deps: DashboardDeps, options: DashboardOptions) -> Self {
        let sync = Arc::new(RegistrySync::new(
            deps.gateway,
            deps.notifier.clone(),
            options.sync,
        ));
        let registry = sync.registry();
        let monitor = LiveMonitor::new(
            deps.model,
            deps.notifier.clone(),
            deps.audio,
            options.session,
        );
        Self {
            sync,
            registry,
            monitor,
            captures: deps.captures,
            notifier: deps.notifier,
            overlay: DrawList::new(),
            viewport: Mutex::new(options.viewport),
            timers: Mutex::new(None),
        }
    }

    /// Start the registry refresh timers. Both fetch immediately.
    pub fn activate(&self) -> Result<()> {
        let mut timers = lock(&self.timers);
        if timers.is_some() {
            return Ok(());
        }
        *timers = Some(self.sync.spawn()?);
        log::info!("dashboard active");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        lock(&self.timers).is_some()
    }

    /// Close the live view and stop syncing.
    pub fn deactivate(&self) -> Result<()> {
        let closed = self.monitor.close();
        let stopped = match lock(&self.timers).take() {
            Some(timers) => {
                let stopped = timers.stop();
                log::info!("dashboard inactive");
                stopped
            }
            None => Ok(()),
        };
        closed.map(|_| ()).and(stopped)
    }

    pub fn cameras(&self) -> Arc<Vec<Camera>> {
        self.registry.cameras()
    }

    pub fn detections(&self) -> Arc<Vec<WasteDetection>> {
        self.registry.detections()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn markers(&self) -> BTreeMap<String, MarkerState> {
        derive_marker_state(&self.registry.cameras(), &self.registry.detections())
    }

    /// Recenter the map on a camera and open its live view.
    ///
    /// The viewport moves even when the live view cannot be opened.
    pub fn select_camera(&self, camera_id: &str) -> Result<Camera> {
        let camera = self
            .registry
            .camera(camera_id)
            .ok_or_else(|| anyhow!("unknown camera '{}'", camera_id))?;

        if lock(&self.viewport).recenter(camera.coordinates) {
            log::debug!(
                "map recentered on {} ({}, {})",
                camera.id,
                camera.coordinates.latitude,
                camera.coordinates.longitude
            );
        }
        if !camera.status.is_online() {
            log::warn!("camera {} is {:?}; opening anyway", camera.id, camera.status);
        }

        self.monitor.ensure_model_usable(&camera)?;
        let device = match self.captures.open(&camera) {
            Ok(device) => device,
            Err(e) => {
                self.notifier.notify(Notification::new(
                    Severity::Error,
                    "Camera unavailable",
                    format!("Could not access the camera feed for {}", camera.name),
                ));
                return Err(e.context(format!("failed to open capture for {}", camera.id)));
            }
        };
        self.monitor
            .open(&camera, device, Box::new(self.overlay.clone()))?;
        Ok(camera)
    }

    pub fn close_live_view(&self) -> Result<bool> {
        self.monitor.close()
    }

    pub fn viewport(&self) -> Viewport {
        *lock(&self.viewport)
    }

    /// The overlay drawn by the live session.
    pub fn overlay(&self) -> &DrawList {
        &self.overlay
    }

    pub fn monitor(&self) -> &LiveMonitor {
        &self.monitor
    }

    pub fn session_state(&self) -> SessionState {
        self.monitor.state()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Err(e) = self.deactivate() {
            log::error!("dashboard shutdown failed: {:#}", e);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
