//! Camera and detection records as served by the monitoring backend.
//!
//! Records are read-only snapshots. The backend labels statuses in
//! Portuguese; both those labels and the English names are accepted on input,
//! and the English names are written on output.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraStatus {
    Online,
    Offline,
    #[serde(alias = "Manutenção", alias = "Manutencao")]
    Maintenance,
}

impl CameraStatus {
    pub fn is_online(self) -> bool {
        matches!(self, CameraStatus::Online)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub location: String,
    pub coordinates: Coordinates,
    pub status: CameraStatus,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_detection: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionStatus {
    #[serde(alias = "Aberto")]
    Open,
    #[serde(alias = "Em Atendimento")]
    InProgress,
    #[serde(alias = "Concluído", alias = "Concluido")]
    Resolved,
}

impl DetectionStatus {
    /// True while the detection still needs an operator.
    pub fn is_open(self) -> bool {
        matches!(self, DetectionStatus::Open)
    }
}

/// A waste-disposal detection reported by the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WasteDetection {
    pub id: String,
    pub camera_id: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub status: DetectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waste_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| anyhow::anyhow!("invalid timestamp '{}': {}", raw, e))?;
    Ok(naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.map(|value| parse_timestamp(&value).map_err(serde::de::Error::custom))
        .transpose()
}
