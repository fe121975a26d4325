//! Map marker state derived from the camera registry and detection feed.

use std::collections::BTreeMap;

use crate::records::{Camera, WasteDetection};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkerState {
    pub has_open_alert: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerIcon {
    Default,
    Alert,
}

impl MarkerState {
    pub fn icon(self) -> MarkerIcon {
        if self.has_open_alert {
            MarkerIcon::Alert
        } else {
            MarkerIcon::Default
        }
    }
}

/// Derive per-camera marker state.
///
/// A camera is flagged when at least one loaded detection references it and is
/// still open. Detections for unknown cameras are ignored. Empty inputs yield
/// an empty map.
pub fn derive_marker_state(
    cameras: &[Camera],
    detections: &[WasteDetection],
) -> BTreeMap<String, MarkerState> {
    cameras
        .iter()
        .map(|camera| {
            let has_open_alert = detections
                .iter()
                .any(|d| d.camera_id == camera.id && d.status.is_open());
            (camera.id.clone(), MarkerState { has_open_alert })
        })
        .collect()
}
