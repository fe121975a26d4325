use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{is_coco_label, ModelSource};
use crate::gateway::{GatewayConfig, DEFAULT_BASE_URL};
use crate::ingest::CaptureConfig;
use crate::records::Coordinates;
use crate::session::{AlertPolicy, SessionConfig, DEFAULT_ALERT_THRESHOLD, DEFAULT_WATCHED_CLASS};
use crate::sync::{SyncConfig, DEFAULT_DETECTION_LIMIT};
use crate::view::{Viewport, DEFAULT_CENTER, DEFAULT_ZOOM};

const DEFAULT_API_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CAMERA_INTERVAL_SECS: u64 = 30;
const DEFAULT_DETECTION_INTERVAL_SECS: u64 = 30;
const DEFAULT_TICK_MS: u64 = 200;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
const DEFAULT_CAPTURE_URL: &str = "stub://webcam";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_STUB_SEED: u64 = 7;
/// Upper bound the backend accepts for `limit`.
const MAX_DETECTION_LIMIT: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct DashboardConfigFile {
    api: Option<ApiConfigFile>,
    sync: Option<SyncConfigFile>,
    inference: Option<InferenceConfigFile>,
    capture: Option<CaptureConfigFile>,
    map: Option<MapConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SyncConfigFile {
    camera_interval_secs: Option<u64>,
    detection_interval_secs: Option<u64>,
    detection_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    model_path: Option<PathBuf>,
    tick_ms: Option<u64>,
    watched_class: Option<String>,
    alert_threshold: Option<usize>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct MapConfigFile {
    center: Option<Coordinates>,
    zoom: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api: ApiSettings,
    pub sync: SyncSettings,
    pub inference: InferenceSettings,
    pub capture: CaptureSettings,
    pub map: MapSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub camera_interval: Duration,
    pub detection_interval: Duration,
    pub detection_limit: usize,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    /// ONNX model on disk. Without one the stub detector is used.
    pub model_path: Option<PathBuf>,
    pub tick: Duration,
    pub watched_class: String,
    pub alert_threshold: usize,
    pub min_confidence: f32,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct MapSettings {
    pub center: Coordinates,
    pub zoom: u8,
}

impl DashboardConfig {
    /// Load from `WASTE_WATCH_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("WASTE_WATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DashboardConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let sync = file.sync.unwrap_or_default();
        let inference = file.inference.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let map = file.map.unwrap_or_default();

        Self {
            api: ApiSettings {
                base_url: api.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                timeout: Duration::from_millis(api.timeout_ms.unwrap_or(DEFAULT_API_TIMEOUT_MS)),
            },
            sync: SyncSettings {
                camera_interval: Duration::from_secs(
                    sync.camera_interval_secs
                        .unwrap_or(DEFAULT_CAMERA_INTERVAL_SECS),
                ),
                detection_interval: Duration::from_secs(
                    sync.detection_interval_secs
                        .unwrap_or(DEFAULT_DETECTION_INTERVAL_SECS),
                ),
                detection_limit: sync.detection_limit.unwrap_or(DEFAULT_DETECTION_LIMIT),
            },
            inference: InferenceSettings {
                model_path: inference.model_path,
                tick: Duration::from_millis(inference.tick_ms.unwrap_or(DEFAULT_TICK_MS)),
                watched_class: inference
                    .watched_class
                    .unwrap_or_else(|| DEFAULT_WATCHED_CLASS.to_string()),
                alert_threshold: inference.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD),
                min_confidence: inference.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
            },
            capture: CaptureSettings {
                url: capture
                    .url
                    .unwrap_or_else(|| DEFAULT_CAPTURE_URL.to_string()),
                width: capture.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            },
            map: MapSettings {
                center: map.center.unwrap_or(DEFAULT_CENTER),
                zoom: map.zoom.unwrap_or(DEFAULT_ZOOM),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WASTE_WATCH_API_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("WASTE_WATCH_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.inference.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var("WASTE_WATCH_CAPTURE_URL") {
            if !url.trim().is_empty() {
                self.capture.url = url;
            }
        }
        if let Ok(threshold) = std::env::var("WASTE_WATCH_ALERT_THRESHOLD") {
            self.inference.alert_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("WASTE_WATCH_ALERT_THRESHOLD must be a positive integer")
            })?;
        }
        if let Ok(limit) = std::env::var("WASTE_WATCH_DETECTION_LIMIT") {
            self.sync.detection_limit = limit.trim().parse().map_err(|_| {
                anyhow!("WASTE_WATCH_DETECTION_LIMIT must be an integer between 1 and 100")
            })?;
        }
        Ok(())
    }

    /// Check invariants. Called by `load`, and again after CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        let base = url::Url::parse(&self.api.base_url)
            .map_err(|e| anyhow!("invalid api base url '{}': {}", self.api.base_url, e))?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(anyhow!("api base url must use http or https"));
        }
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();

        if self.api.timeout.is_zero() {
            return Err(anyhow!("api timeout must be greater than zero"));
        }
        if self.sync.camera_interval.is_zero() || self.sync.detection_interval.is_zero() {
            return Err(anyhow!("sync intervals must be greater than zero"));
        }
        if !(1..=MAX_DETECTION_LIMIT).contains(&self.sync.detection_limit) {
            return Err(anyhow!(
                "detection limit must be between 1 and {}",
                MAX_DETECTION_LIMIT
            ));
        }
        if self.inference.tick.is_zero() {
            return Err(anyhow!("inference tick must be greater than zero"));
        }
        if self.inference.alert_threshold == 0 {
            return Err(anyhow!("alert threshold must be greater than zero"));
        }
        self.inference.watched_class = self.inference.watched_class.trim().to_string();
        if self.inference.watched_class.is_empty() {
            return Err(anyhow!("watched class must not be empty"));
        }
        if self.inference.model_path.is_some() && !is_coco_label(&self.inference.watched_class) {
            return Err(anyhow!(
                "watched class '{}' is not a label the detection model emits",
                self.inference.watched_class
            ));
        }
        if !(0.0..=1.0).contains(&self.inference.min_confidence) {
            return Err(anyhow!("min confidence must be within 0.0..=1.0"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be non-zero"));
        }
        Ok(())
    }

    pub fn gateway(&self) -> GatewayConfig {
        GatewayConfig {
            base_url: self.api.base_url.clone(),
            timeout: self.api.timeout,
        }
    }

    pub fn sync(&self) -> SyncConfig {
        SyncConfig {
            camera_interval: self.sync.camera_interval,
            detection_interval: self.sync.detection_interval,
            detection_limit: self.sync.detection_limit,
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            tick_period: self.inference.tick,
            policy: AlertPolicy {
                watched_class: self.inference.watched_class.clone(),
                threshold: self.inference.alert_threshold,
            },
        }
    }

    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            url: self.capture.url.clone(),
            width: self.capture.width,
            height: self.capture.height,
            ..CaptureConfig::default()
        }
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.map.center, self.map.zoom)
    }

    pub fn model_source(&self) -> ModelSource {
        match &self.inference.model_path {
            Some(path) => ModelSource::Onnx {
                path: path.clone(),
                width: self.capture.width,
                height: self.capture.height,
                min_confidence: self.inference.min_confidence,
            },
            None => ModelSource::Stub {
                seed: DEFAULT_STUB_SEED,
            },
        }
    }
}

fn read_config_file(path: &Path) -> Result<DashboardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
