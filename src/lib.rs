//! Waste Watch monitoring engine
//!
//! Live camera monitoring for illegal waste disposal: keeps the camera
//! registry and the detection feed in sync with the monitoring backend,
//! derives per-camera map markers, and runs on-device object detection on
//! the selected camera, alerting the operator when too many watched objects
//! are in frame.
//!
//! # Module Structure
//!
//! - `records`: Camera and detection records, backend wire format
//! - `gateway`: Read-only HTTP client for the backend
//! - `sync`: Periodic registry refresh over shared snapshots
//! - `marker`: Marker state derived from cameras and detections
//! - `session`: Live inference sessions and threshold alerts
//! - `detect`: Detection model handle and backends
//! - `ingest`: Capture devices
//! - `overlay`, `view`, `notify`: Operator-facing surfaces
//! - `dashboard`: Wires everything for one active dashboard
//! - `config`: JSON file + environment configuration

pub mod config;
pub mod dashboard;
pub mod detect;
pub mod frame;
pub mod gateway;
pub mod ingest;
pub mod marker;
pub mod notify;
pub mod overlay;
pub mod records;
pub mod session;
pub mod sync;
pub mod timer;
pub mod view;

pub use config::DashboardConfig;
pub use dashboard::{Dashboard, DashboardDeps, DashboardOptions};
pub use detect::{BoundingBox, DetectorBackend, ModelSource, ModelStatus, Prediction, SharedModel};
pub use frame::Frame;
pub use gateway::{GatewayConfig, HttpGateway, RegistryGateway};
pub use ingest::{CaptureConfig, CaptureDevice, CaptureFactory, UrlCaptureFactory};
pub use marker::{derive_marker_state, MarkerIcon, MarkerState};
pub use notify::{AudioCue, LogNotifier, Notification, Notifier, Severity};
pub use overlay::{DrawList, OverlaySurface};
pub use records::{Camera, CameraStatus, Coordinates, DetectionStatus, WasteDetection};
pub use session::{AlertPolicy, LiveMonitor, SessionConfig, SessionHealth, SessionState};
pub use sync::{Registry, RegistrySync, SyncConfig, SyncHandle};
pub use timer::{CancelToken, PeriodicHandle, PeriodicTask};
pub use view::Viewport;
