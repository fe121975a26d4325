use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use waste_watch::config::DashboardConfig;
use waste_watch::ModelSource;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "WASTE_WATCH_CONFIG",
        "WASTE_WATCH_API_URL",
        "WASTE_WATCH_MODEL_PATH",
        "WASTE_WATCH_CAPTURE_URL",
        "WASTE_WATCH_ALERT_THRESHOLD",
        "WASTE_WATCH_DETECTION_LIMIT",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DashboardConfig::load().expect("load config");

    assert_eq!(cfg.api.base_url, "http://localhost:8000/api");
    assert_eq!(cfg.api.timeout, Duration::from_secs(10));
    assert_eq!(cfg.sync.camera_interval, Duration::from_secs(30));
    assert_eq!(cfg.sync.detection_interval, Duration::from_secs(30));
    assert_eq!(cfg.sync.detection_limit, 50);
    assert_eq!(cfg.inference.tick, Duration::from_millis(200));
    assert_eq!(cfg.inference.watched_class, "bottle");
    assert_eq!(cfg.inference.alert_threshold, 5);
    assert_eq!(cfg.capture.url, "stub://webcam");
    assert_eq!(cfg.map.zoom, 13);
    assert!(matches!(cfg.model_source(), ModelSource::Stub { .. }));
    assert!(cfg.model_source().is_simulated());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "api": { "base_url": "http://backend.local:8000/api", "timeout_ms": 4000 },
            "sync": {
                "camera_interval_secs": 60,
                "detection_interval_secs": 15,
                "detection_limit": 20
            },
            "inference": {
                "tick_ms": 500,
                "watched_class": "cup",
                "alert_threshold": 8,
                "min_confidence": 0.6
            },
            "capture": {
                "url": "http://cams.local/{camera_id}/snapshot.jpg",
                "width": 320,
                "height": 240
            },
            "map": { "center": { "latitude": -8.06, "longitude": -34.95 }, "zoom": 14 }
        }"#,
    );

    std::env::set_var("WASTE_WATCH_CONFIG", file.path());
    std::env::set_var("WASTE_WATCH_ALERT_THRESHOLD", "3");
    std::env::set_var("WASTE_WATCH_DETECTION_LIMIT", "100");
    std::env::set_var("WASTE_WATCH_MODEL_PATH", "/models/ssd_mobilenet.onnx");

    let cfg = DashboardConfig::load().expect("load config");

    assert_eq!(cfg.api.base_url, "http://backend.local:8000/api");
    assert_eq!(cfg.api.timeout, Duration::from_millis(4000));
    assert_eq!(cfg.sync.camera_interval, Duration::from_secs(60));
    assert_eq!(cfg.sync.detection_interval, Duration::from_secs(15));
    assert_eq!(cfg.sync.detection_limit, 100);
    assert_eq!(cfg.inference.tick, Duration::from_millis(500));
    assert_eq!(cfg.inference.watched_class, "cup");
    assert_eq!(cfg.inference.alert_threshold, 3);
    assert_eq!(
        cfg.capture().for_camera("camera_02").url,
        "http://cams.local/camera_02/snapshot.jpg"
    );
    assert_eq!(cfg.viewport().center().latitude, -8.06);
    assert_eq!(cfg.viewport().zoom(), 14);
    assert_eq!(
        cfg.model_source(),
        ModelSource::Onnx {
            path: PathBuf::from("/models/ssd_mobilenet.onnx"),
            width: 320,
            height: 240,
            min_confidence: 0.6,
        }
    );
    assert!(!cfg.model_source().is_simulated());

    clear_env();
}

#[test]
fn env_api_url_overrides_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "api": { "base_url": "http://from-file:8000/api" } }"#);
    std::env::set_var("WASTE_WATCH_CONFIG", file.path());
    std::env::set_var("WASTE_WATCH_API_URL", "https://from-env.example/api/");

    let cfg = DashboardConfig::load().expect("load config");
    assert_eq!(cfg.api.base_url, "https://from-env.example/api");

    clear_env();
}

#[test]
fn rejects_out_of_range_detection_limit() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WASTE_WATCH_DETECTION_LIMIT", "250");
    let err = DashboardConfig::load().unwrap_err();
    assert!(err.to_string().contains("detection limit"));

    std::env::set_var("WASTE_WATCH_DETECTION_LIMIT", "lots");
    assert!(DashboardConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_zero_threshold_and_malformed_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("WASTE_WATCH_ALERT_THRESHOLD", "0");
    assert!(DashboardConfig::load().is_err());
    std::env::remove_var("WASTE_WATCH_ALERT_THRESHOLD");

    let file = write_config("{ not json");
    std::env::set_var("WASTE_WATCH_CONFIG", file.path());
    let err = DashboardConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    std::env::set_var("WASTE_WATCH_CONFIG", "/nonexistent/waste_watch.json");
    assert!(DashboardConfig::load().is_err());

    clear_env();
}
