//! Registry synchronizer.
//!
//! Keeps the camera registry and the detection feed fresh. The two
//! collections refresh independently on their own timers; a failed fetch
//! keeps the previous snapshot. Camera failures are surfaced to the operator,
//! detection failures are only logged.

use anyhow::Result;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::gateway::RegistryGateway;
use crate::notify::{Notification, Notifier, Severity};
use crate::records::{Camera, WasteDetection};
use crate::timer::{PeriodicHandle, PeriodicTask};

pub const DEFAULT_CAMERA_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DETECTION_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_DETECTION_LIMIT: usize = 50;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub camera_interval: Duration,
    pub detection_interval: Duration,
    pub detection_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            camera_interval: DEFAULT_CAMERA_INTERVAL,
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            detection_limit: DEFAULT_DETECTION_LIMIT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub camera_refreshes: u64,
    pub camera_failures: u64,
    pub detection_refreshes: u64,
    pub detection_failures: u64,
}

/// In-memory camera and detection snapshots.
///
/// Readers get cheap `Arc` clones. Only [`RegistrySync`] replaces them.
#[derive(Debug, Default)]
pub struct Registry {
    cameras: RwLock<Arc<Vec<Camera>>>,
    detections: RwLock<Arc<Vec<WasteDetection>>>,
    stats: RwLock<RegistryStats>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cameras(&self) -> Arc<Vec<Camera>> {
        match self.cameras.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn detections(&self) -> Arc<Vec<WasteDetection>> {
        match self.detections.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn camera(&self, id: &str) -> Option<Camera> {
        self.cameras().iter().find(|camera| camera.id == id).cloned()
    }

    pub fn stats(&self) -> RegistryStats {
        match self.stats.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn replace_cameras(&self, cameras: Vec<Camera>) {
        let mut guard = match self.cameras.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(cameras);
    }

    fn replace_detections(&self, detections: Vec<WasteDetection>) {
        let mut guard = match self.detections.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(detections);
    }

    fn record(&self, update: impl FnOnce(&mut RegistryStats)) {
        let mut guard = match self.stats.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut guard);
    }
}

/// Owns the write side of a [`Registry`].
pub struct RegistrySync {
    registry: Arc<Registry>,
    gateway: Arc<dyn RegistryGateway>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
}

impl RegistrySync {
    pub fn new(
        gateway: Arc<dyn RegistryGateway>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            gateway,
            notifier,
            config,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Fetch the camera list once. Returns true when the snapshot was replaced.
    pub fn refresh_cameras(&self) -> bool {
        match self.gateway.fetch_cameras() {
            Ok(cameras) => {
                log::debug!("camera registry refreshed: {} cameras", cameras.len());
                self.registry.replace_cameras(cameras);
                self.registry.record(|s| s.camera_refreshes += 1);
                true
            }
            Err(e) => {
                log::warn!("camera refresh failed, keeping previous snapshot: {:#}", e);
                self.registry.record(|s| s.camera_failures += 1);
                self.notifier.notify(Notification::new(
                    Severity::Warning,
                    "Cameras unavailable",
                    "Failed to load cameras",
                ));
                false
            }
        }
    }

    /// Fetch the most recent detections once. Returns true when the snapshot
    /// was replaced.
    pub fn refresh_detections(&self) -> bool {
        match self.gateway.fetch_detections(self.config.detection_limit) {
            Ok(detections) => {
                log::debug!("detection feed refreshed: {} detections", detections.len());
                self.registry.replace_detections(detections);
                self.registry.record(|s| s.detection_refreshes += 1);
                true
            }
            Err(e) => {
                log::warn!("detection refresh failed, keeping previous snapshot: {:#}", e);
                self.registry.record(|s| s.detection_failures += 1);
                false
            }
        }
    }

    /// Start both refresh timers. Dropping or stopping the handle cancels them.
    pub fn spawn(self: &Arc<Self>) -> Result<SyncHandle> {
        let cameras = {
            let sync = self.clone();
            PeriodicTask::new("camera-sync", self.config.camera_interval).spawn(move |token| {
                if !token.is_cancelled() {
                    sync.refresh_cameras();
                }
            })?
        };
        let detections = {
            let sync = self.clone();
            PeriodicTask::new("detection-sync", self.config.detection_interval).spawn(
                move |token| {
                    if !token.is_cancelled() {
                        sync.refresh_detections();
                    }
                },
            )?
        };
        Ok(SyncHandle {
            cameras,
            detections,
        })
    }
}

#[derive(Debug)]
pub struct SyncHandle {
    cameras: PeriodicHandle,
    detections: PeriodicHandle,
}

impl SyncHandle {
    pub fn stop(self) -> Result<()> {
        let SyncHandle {
            cameras,
            detections,
        } = self;
        let cameras_result = cameras.stop();
        let detections_result = detections.stop();
        cameras_result.and(detections_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::records::{CameraStatus, Coordinates, DetectionStatus};
    use anyhow::anyhow;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    fn camera(id: &str) -> Camera {
        Camera {
            id: id.to_string(),
            name: id.to_uppercase(),
            location: "Recife".to_string(),
            coordinates: Coordinates::new(-8.05, -34.88),
            status: CameraStatus::Online,
            last_detection: None,
        }
    }

    fn detection(id: &str) -> WasteDetection {
        WasteDetection {
            id: id.to_string(),
            camera_id: "c1".to_string(),
            timestamp: Utc::now(),
            status: DetectionStatus::Open,
            waste_type: None,
            blockchain_hash: None,
            coordinates: None,
            detection_area: None,
            image_url: None,
        }
    }

    /// Gateway that replays scripted responses, then repeats the last one.
    #[derive(Default)]
    struct ScriptedGateway {
        cameras: Mutex<VecDeque<Result<Vec<Camera>>>>,
        detections: Mutex<VecDeque<Result<Vec<WasteDetection>>>>,
        camera_calls: AtomicUsize,
        detection_limits: Mutex<Vec<usize>>,
    }

    impl RegistryGateway for ScriptedGateway {
        fn fetch_cameras(&self) -> Result<Vec<Camera>> {
            self.camera_calls.fetch_add(1, Ordering::SeqCst);
            self.cameras
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted response")))
        }

        fn fetch_detections(&self, limit: usize) -> Result<Vec<WasteDetection>> {
            self.detection_limits.lock().unwrap().push(limit);
            self.detections
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow!("no scripted response")))
        }
    }

    #[test]
    fn camera_failure_keeps_snapshot_and_warns_once() {
        let gateway = Arc::new(ScriptedGateway::default());
        {
            let mut cams = gateway.cameras.lock().unwrap();
            cams.push_back(Ok(vec![camera("c1"), camera("c2")]));
            cams.push_back(Err(anyhow!("connection refused")));
            cams.push_back(Ok(vec![camera("c3")]));
        }
        let notifier = RecordingNotifier::new();
        let sync = RegistrySync::new(gateway, Arc::new(notifier.clone()), SyncConfig::default());
        let registry = sync.registry();

        assert!(sync.refresh_cameras());
        let before = registry.cameras();

        assert!(!sync.refresh_cameras());
        assert_eq!(registry.cameras(), before);
        assert_eq!(notifier.count(Severity::Warning), 1);

        assert!(sync.refresh_cameras());
        let ids: Vec<_> = registry.cameras().iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec!["c3"]);
        assert_eq!(notifier.notifications().len(), 1);

        let stats = registry.stats();
        assert_eq!(stats.camera_refreshes, 2);
        assert_eq!(stats.camera_failures, 1);
    }

    #[test]
    fn detection_failure_is_silent_and_keeps_snapshot() {
        let gateway = Arc::new(ScriptedGateway::default());
        {
            let mut dets = gateway.detections.lock().unwrap();
            dets.push_back(Ok(vec![detection("d1")]));
            dets.push_back(Err(anyhow!("timeout")));
        }
        let notifier = RecordingNotifier::new();
        let sync = RegistrySync::new(
            gateway.clone(),
            Arc::new(notifier.clone()),
            SyncConfig::default(),
        );

        assert!(sync.refresh_detections());
        assert!(!sync.refresh_detections());
        assert_eq!(sync.registry().detections().len(), 1);
        assert!(notifier.notifications().is_empty());
        assert_eq!(
            *gateway.detection_limits.lock().unwrap(),
            vec![DEFAULT_DETECTION_LIMIT, DEFAULT_DETECTION_LIMIT]
        );
        assert_eq!(sync.registry().stats().detection_failures, 1);
    }

    #[test]
    fn spawned_sync_refreshes_immediately_and_stops() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway
            .cameras
            .lock()
            .unwrap()
            .push_back(Ok(vec![camera("c1")]));
        gateway
            .detections
            .lock()
            .unwrap()
            .push_back(Ok(vec![detection("d1")]));
        let sync = Arc::new(RegistrySync::new(
            gateway.clone(),
            Arc::new(RecordingNotifier::new()),
            SyncConfig::default(),
        ));
        let registry = sync.registry();
        let handle = sync.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while (registry.cameras().is_empty() || registry.detections().is_empty())
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        handle.stop().unwrap();

        assert_eq!(registry.cameras().len(), 1);
        assert_eq!(registry.detections().len(), 1);
        let calls = gateway.camera_calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(gateway.camera_calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn registry_lookup_by_id() {
        let gateway = Arc::new(ScriptedGateway::default());
        gateway
            .cameras
            .lock()
            .unwrap()
            .push_back(Ok(vec![camera("c1"), camera("c2")]));
        let sync = RegistrySync::new(
            gateway,
            Arc::new(RecordingNotifier::new()),
            SyncConfig::default(),
        );
        sync.refresh_cameras();
        assert_eq!(sync.registry().camera("c2").unwrap().name, "C2");
        assert!(sync.registry().camera("c9").is_none());
    }
}
