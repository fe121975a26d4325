//! waste_watch - headless Waste Watch dashboard
//!
//! This binary:
//! 1. Loads the object detection model in the background
//! 2. Keeps the camera registry and detection feed in sync with the backend
//! 3. Periodically logs marker state (cameras with open detections)
//! 4. Optionally opens a live view on one camera and alerts when too many
//!    watched objects are in frame

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use waste_watch::notify::{Silent, TerminalBell};
use waste_watch::{
    AudioCue, Dashboard, DashboardConfig, DashboardDeps, DashboardOptions, HttpGateway,
    LogNotifier, MarkerIcon, ModelSource, ModelStatus, Notifier, SharedModel, UrlCaptureFactory,
};

#[path = "../ui.rs"]
mod ui;

const MODEL_WAIT: Duration = Duration::from_secs(30);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(
    name = "waste_watch",
    about = "Monitor cameras for illegal waste disposal and alert on live detections"
)]
struct Args {
    /// Backend API base URL (overrides config and WASTE_WATCH_API_URL)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Open a live view on this camera once the registry has loaded
    #[arg(long, value_name = "ID")]
    camera: Option<String>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long, value_name = "SECS")]
    seconds: Option<u64>,

    /// Ring the terminal bell on alerts
    #[arg(long)]
    bell: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let is_tty = std::io::stderr().is_terminal();
    let quiet_logs = log::max_level() < log::LevelFilter::Info;
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, quiet_logs);

    let mut cfg = {
        let _stage = ui.stage("Load configuration");
        DashboardConfig::load()?
    };
    if let Some(url) = &args.api_url {
        cfg.api.base_url = url.clone();
        cfg.validate()?;
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .map_err(|e| anyhow!("failed to install Ctrl-C handler: {}", e))?;
    }

    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let audio: Arc<dyn AudioCue> = if args.bell {
        Arc::new(TerminalBell)
    } else {
        Arc::new(Silent)
    };

    // Model loading runs alongside registry sync; neither waits on the other.
    let model = SharedModel::new();
    let source = cfg.model_source();
    let source_desc = describe_source(&source);
    if source.is_simulated() {
        log::warn!(
            "no inference.model_path configured; running the {}, live alerts are simulated",
            source_desc
        );
    }
    let _loader = model.load_in_background(move || source.load(), notifier.clone())?;

    let dashboard = Dashboard::new(
        DashboardDeps {
            gateway: Arc::new(HttpGateway::new(cfg.gateway())?),
            captures: Arc::new(UrlCaptureFactory::new(cfg.capture())),
            model: model.clone(),
            notifier,
            audio,
        },
        DashboardOptions {
            sync: cfg.sync(),
            session: cfg.session(),
            viewport: cfg.viewport(),
        },
    );
    dashboard.activate()?;
    log::info!(
        "waste_watch running against {} (cameras every {:?}, detections every {:?}, limit {})",
        cfg.api.base_url,
        cfg.sync.camera_interval,
        cfg.sync.detection_interval,
        cfg.sync.detection_limit
    );

    {
        let mut stage = ui.stage("Load detection model");
        stage.detail(&source_desc);
        match model.wait_settled(MODEL_WAIT) {
            ModelStatus::Ready => {}
            ModelStatus::Failed(reason) => {
                stage.fail(format!("live detection disabled: {}", reason));
            }
            ModelStatus::Loading | ModelStatus::Unloaded => {
                stage.fail("still loading; live views start detecting once it is ready");
            }
        }
    }

    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut pending_camera = args.camera.clone();
    let mut last_health_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        if let Some(camera_id) = pending_camera.as_deref() {
            if dashboard.registry().camera(camera_id).is_some() {
                match dashboard.select_camera(camera_id) {
                    Ok(camera) => log::info!(
                        "live view on {} at {}, map centred on ({}, {})",
                        camera.name,
                        camera.location,
                        camera.coordinates.latitude,
                        camera.coordinates.longitude
                    ),
                    Err(e) => log::error!("failed to open live view: {:#}", e),
                }
                pending_camera = None;
            } else if dashboard.registry().stats().camera_refreshes > 0 {
                log::error!("camera '{}' is not in the registry", camera_id);
                pending_camera = None;
            }
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            log_health(&dashboard);
            last_health_log = Instant::now();
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    log::info!("waste_watch shutting down");
    dashboard.deactivate()?;
    Ok(())
}

fn describe_source(source: &ModelSource) -> String {
    match source {
        ModelSource::Stub { seed } => format!("stub detector (seed {})", seed),
        ModelSource::Onnx { path, .. } => format!("ONNX model {}", path.display()),
    }
}

fn log_health(dashboard: &Dashboard) {
    let cameras = dashboard.cameras();
    let markers = dashboard.markers();
    let alerting: Vec<&str> = markers
        .iter()
        .filter(|(_, state)| state.icon() == MarkerIcon::Alert)
        .map(|(id, _)| id.as_str())
        .collect();
    let stats = dashboard.registry().stats();
    log::info!(
        "health: {} cameras ({} online), {} detections, alerting [{}], sync failures cameras={} detections={}",
        cameras.len(),
        cameras.iter().filter(|c| c.status.is_online()).count(),
        dashboard.detections().len(),
        alerting.join(", "),
        stats.camera_failures,
        stats.detection_failures
    );
    if let Some(health) = dashboard.monitor().health() {
        log::info!(
            "live view {} up {}s: capture health={} frames={} url={}, {} ticks, {} skipped, {} alerts, last frame {}ms",
            health.camera_id,
            health.uptime.as_secs(),
            health.stats.device_healthy,
            health.stats.frames_captured,
            health.source,
            health.stats.ticks,
            health.stats.skipped,
            health.stats.alerts,
            health.stats.last_frame_age_ms
        );
        if !health.worker_alive {
            log::error!(
                "live view {}: inference worker {} has exited",
                health.camera_id,
                health.worker
            );
        }
    }
}
