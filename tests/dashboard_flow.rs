use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::Utc;

use waste_watch::detect::StubBackend;
use waste_watch::notify::RecordingNotifier;
use waste_watch::overlay::Shape;
use waste_watch::session::SessionState;
use waste_watch::{
    AlertPolicy, AudioCue, BoundingBox, Camera, CameraStatus, CaptureConfig, Coordinates,
    Dashboard, DashboardDeps, DashboardOptions, DetectionStatus, MarkerIcon, Prediction,
    RegistryGateway, SessionConfig, Severity, SharedModel, SyncConfig, UrlCaptureFactory,
    Viewport, WasteDetection,
};

/// Backend double. The second camera fetch fails; everything else succeeds.
#[derive(Default)]
struct FlakyBackend {
    camera_calls: AtomicUsize,
    detection_calls: AtomicUsize,
}

impl RegistryGateway for FlakyBackend {
    fn fetch_cameras(&self) -> Result<Vec<Camera>> {
        let call = self.camera_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == 2 {
            return Err(anyhow!("503 service unavailable"));
        }
        Ok(vec![
            camera("camera_01", -8.1127, -34.8915),
            camera("camera_02", -8.0631, -34.8711),
        ])
    }

    fn fetch_detections(&self, limit: usize) -> Result<Vec<WasteDetection>> {
        self.detection_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(limit, 50);
        Ok(vec![
            detection("det_001", "camera_01", DetectionStatus::Resolved),
            detection("det_002", "camera_02", DetectionStatus::Open),
            detection("det_003", "camera_77", DetectionStatus::Open),
        ])
    }
}

#[derive(Default)]
struct CountingCue(AtomicUsize);

impl AudioCue for CountingCue {
    fn play(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn camera(id: &str, latitude: f64, longitude: f64) -> Camera {
    Camera {
        id: id.to_string(),
        name: format!("Camera {}", id),
        location: "Recife".to_string(),
        coordinates: Coordinates::new(latitude, longitude),
        status: CameraStatus::Online,
        last_detection: None,
    }
}

fn detection(id: &str, camera_id: &str, status: DetectionStatus) -> WasteDetection {
    WasteDetection {
        id: id.to_string(),
        camera_id: camera_id.to_string(),
        timestamp: Utc::now(),
        status,
        waste_type: None,
        blockchain_hash: None,
        coordinates: None,
        detection_area: None,
        image_url: None,
    }
}

fn bottles(n: usize) -> Vec<Prediction> {
    (0..n)
        .map(|i| {
            Prediction::new(
                "bottle",
                BoundingBox::new(10.0 + i as f32 * 30.0, 40.0, 25.0, 60.0),
                0.75,
            )
        })
        .collect()
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

struct Fixture {
    dashboard: Dashboard,
    backend: Arc<FlakyBackend>,
    notifier: RecordingNotifier,
    cue: Arc<CountingCue>,
}

fn fixture(script: Vec<Vec<Prediction>>) -> Fixture {
    let backend = Arc::new(FlakyBackend::default());
    let notifier = RecordingNotifier::new();
    let cue = Arc::new(CountingCue::default());
    let dashboard = Dashboard::new(
        DashboardDeps {
            gateway: backend.clone(),
            captures: Arc::new(UrlCaptureFactory::new(CaptureConfig {
                url: "stub://camera/{camera_id}".to_string(),
                width: 320,
                height: 240,
                ..CaptureConfig::default()
            })),
            model: SharedModel::ready(StubBackend::scripted(script)),
            notifier: Arc::new(notifier.clone()),
            audio: cue.clone(),
        },
        DashboardOptions {
            sync: SyncConfig {
                camera_interval: Duration::from_millis(20),
                detection_interval: Duration::from_millis(20),
                ..SyncConfig::default()
            },
            session: SessionConfig {
                tick_period: Duration::from_millis(10),
                policy: AlertPolicy::default(),
            },
            viewport: Viewport::default(),
        },
    );
    Fixture {
        dashboard,
        backend,
        notifier,
        cue,
    }
}

#[test]
fn markers_follow_open_detections_and_survive_sync_failures() {
    let f = fixture(Vec::new());
    f.dashboard.activate().unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        f.backend.camera_calls.load(Ordering::SeqCst) >= 3
            && !f.dashboard.detections().is_empty()
    }));

    let markers = f.dashboard.markers();
    assert_eq!(markers.len(), 2);
    assert_eq!(markers["camera_01"].icon(), MarkerIcon::Default);
    assert_eq!(markers["camera_02"].icon(), MarkerIcon::Alert);
    assert!(!markers.contains_key("camera_77"));

    f.dashboard.deactivate().unwrap();
    let camera_warnings = f
        .notifier
        .notifications()
        .iter()
        .filter(|n| n.title == "Cameras unavailable")
        .count();
    assert_eq!(camera_warnings, 1);
    assert_eq!(f.dashboard.registry().stats().camera_failures, 1);
    assert_eq!(f.dashboard.cameras().len(), 2);
}

#[test]
fn no_fetch_starts_after_deactivate() {
    let f = fixture(Vec::new());
    f.dashboard.activate().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        f.backend.detection_calls.load(Ordering::SeqCst) >= 2
    }));
    f.dashboard.deactivate().unwrap();

    let cameras = f.backend.camera_calls.load(Ordering::SeqCst);
    let detections = f.backend.detection_calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(f.backend.camera_calls.load(Ordering::SeqCst), cameras);
    assert_eq!(f.backend.detection_calls.load(Ordering::SeqCst), detections);
}

#[test]
fn live_view_draws_boxes_and_alerts_at_threshold() {
    let f = fixture(vec![bottles(5)]);
    f.dashboard.activate().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !f.dashboard.cameras().is_empty()
    }));

    let selected = f.dashboard.select_camera("camera_02").unwrap();
    assert_eq!(f.dashboard.viewport().center(), selected.coordinates);
    assert_eq!(f.dashboard.viewport().zoom(), 13);
    assert_eq!(f.dashboard.session_state(), SessionState::Capturing);

    // The worker clears and redraws every tick; wait for a fully drawn one.
    let mut shapes = Vec::new();
    assert!(wait_until(Duration::from_secs(5), || {
        shapes = f.dashboard.overlay().shapes();
        shapes.len() == 10 && f.cue.0.load(Ordering::SeqCst) >= 2
    }));
    assert!(shapes.contains(&Shape::Text {
        text: "bottle (75.0%)".to_string(),
        x: 10.0,
        y: 35.0,
        color: "red",
        font: "16px sans-serif",
    }));
    assert_eq!(f.dashboard.overlay().size(), (320, 240));

    f.dashboard.close_live_view().unwrap();
    let alerts = f
        .notifier
        .notifications()
        .into_iter()
        .filter(|n| n.title == "Bottle alert")
        .collect::<Vec<_>>();
    assert!(alerts.len() >= 2);
    assert!(alerts
        .iter()
        .all(|n| n.severity == Severity::Warning && n.description == "5 bottles detected"));
    assert_eq!(alerts.len(), f.cue.0.load(Ordering::SeqCst));

    assert_eq!(f.dashboard.session_state(), SessionState::Closed);
    assert_eq!(f.dashboard.monitor().active_timers(), 0);
    assert!(f.dashboard.overlay().shapes().is_empty());
}

#[test]
fn switching_cameras_keeps_one_live_session() {
    let f = fixture(vec![bottles(1)]);
    f.dashboard.activate().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        f.dashboard.cameras().len() == 2
    }));

    f.dashboard.select_camera("camera_01").unwrap();
    f.dashboard.select_camera("camera_02").unwrap();
    f.dashboard.select_camera("camera_01").unwrap();

    assert_eq!(f.dashboard.monitor().active_timers(), 1);
    assert_eq!(
        f.dashboard.monitor().active_camera().unwrap().id,
        "camera_01"
    );
    assert_eq!(f.dashboard.overlay().releases(), 2);
    assert!(f.dashboard.select_camera("camera_99").is_err());
    assert_eq!(
        f.dashboard.monitor().active_camera().unwrap().id,
        "camera_01"
    );

    f.dashboard.deactivate().unwrap();
    assert_eq!(f.dashboard.monitor().active_timers(), 0);
    assert_eq!(f.cue.0.load(Ordering::SeqCst), 0);
}
