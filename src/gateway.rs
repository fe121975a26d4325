//! Remote data gateway.
//!
//! Read-only client for the two list endpoints the dashboard consumes:
//! `GET /cameras` and `GET /waste-detections?limit=N`. No write endpoint is
//! ever called from here.

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::records::{Camera, WasteDetection};

/// Source of camera and detection snapshots.
///
/// Implementations must be callable from the synchronizer worker threads.
pub trait RegistryGateway: Send + Sync {
    fn fetch_cameras(&self) -> Result<Vec<Camera>>;

    /// Fetch the `limit` most recent detections, newest first.
    fn fetch_detections(&self, limit: usize) -> Result<Vec<WasteDetection>>;
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Base API URL, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP+JSON gateway backed by `ureq`.
pub struct HttpGateway {
    agent: ureq::Agent,
    cameras_url: Url,
    detections_url: Url,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let base = config.base_url.trim_end_matches('/');
        let cameras_url = Url::parse(&format!("{}/cameras", base))
            .with_context(|| format!("invalid api base url '{}'", config.base_url))?;
        let detections_url = Url::parse(&format!("{}/waste-detections", base))
            .with_context(|| format!("invalid api base url '{}'", config.base_url))?;
        match cameras_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported api scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            agent,
            cameras_url,
            detections_url,
        })
    }

    fn get_list<T: DeserializeOwned>(&self, url: &Url) -> Result<Vec<T>> {
        let response = self
            .agent
            .request_url("GET", url)
            .set("Accept", "application/json")
            .call()
            .map_err(|e| anyhow!("GET {} failed: {}", url, e))?;
        let body = response
            .into_string()
            .with_context(|| format!("read response body from {}", url))?;
        decode_list(url.as_str(), &body)
    }
}

/// Decode a JSON array record by record.
///
/// A body that is not a JSON array is an error. Elements that do not decode
/// (unknown status labels, missing fields, bad timestamps) are logged and
/// skipped so one bad row cannot freeze the whole snapshot.
pub(crate) fn decode_list<T: DeserializeOwned>(source: &str, body: &str) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(body).with_context(|| format!("invalid json from {}", source))?;
    let total = values.len();
    let mut records = Vec::with_capacity(total);
    for (index, value) in values.into_iter().enumerate() {
        let id = value
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!(
                "skipping record #{} (id {}) from {}: {}",
                index,
                id,
                source,
                e
            ),
        }
    }
    if records.len() < total {
        log::warn!(
            "{}: kept {} of {} records",
            source,
            records.len(),
            total
        );
    }
    Ok(records)
}

impl RegistryGateway for HttpGateway {
    fn fetch_cameras(&self) -> Result<Vec<Camera>> {
        self.get_list(&self.cameras_url)
    }

    fn fetch_detections(&self, limit: usize) -> Result<Vec<WasteDetection>> {
        let mut url = self.detections_url.clone();
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string());
        self.get_list(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::DetectionStatus;

    #[test]
    fn rejects_non_http_base_url() {
        let cfg = GatewayConfig {
            base_url: "ftp://example.com/api".to_string(),
            ..GatewayConfig::default()
        };
        assert!(HttpGateway::new(cfg).is_err());
    }

    #[test]
    fn builds_endpoint_urls_from_base() {
        let cfg = GatewayConfig {
            base_url: "http://localhost:8000/api/".to_string(),
            ..GatewayConfig::default()
        };
        let gateway = HttpGateway::new(cfg).unwrap();
        assert_eq!(gateway.cameras_url.as_str(), "http://localhost:8000/api/cameras");
        assert_eq!(
            gateway.detections_url.as_str(),
            "http://localhost:8000/api/waste-detections"
        );
    }

    #[test]
    fn unknown_status_skips_only_that_record() {
        let body = r#"[
            {"id":"det_1","camera_id":"camera_01","timestamp":"2023-05-20T14:30:00","status":"Aberto"},
            {"id":"det_2","camera_id":"camera_01","timestamp":"2023-05-20T14:31:00","status":"Cancelado"},
            {"id":"det_3","camera_id":"camera_02","timestamp":"2023-05-20T14:32:00","status":"Concluído"}
        ]"#;
        let detections: Vec<WasteDetection> = decode_list("test", body).unwrap();
        let ids: Vec<_> = detections.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["det_1", "det_3"]);
        assert_eq!(detections[0].status, DetectionStatus::Open);
        assert_eq!(detections[1].status, DetectionStatus::Resolved);
    }

    #[test]
    fn non_array_body_is_an_error() {
        assert!(decode_list::<Camera>("test", r#"{"cameras": []}"#).is_err());
        assert!(decode_list::<Camera>("test", "<html>").is_err());
        assert!(decode_list::<Camera>("test", "[]").unwrap().is_empty());
    }
}
