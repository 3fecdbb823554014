use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// One report from the carrier's device.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub point: GeoPoint,
    pub speed_kmh: Option<f64>,
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PingSource {
    Device,
    Heartbeat,
}

impl PingSource {
    pub fn as_label(self) -> &'static str {
        match self {
            PingSource::Device => "device",
            PingSource::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPing {
    pub id: Uuid,
    pub deal_id: Uuid,
    pub carrier_id: Uuid,
    pub point: GeoPoint,
    pub speed_kmh: Option<f64>,
    pub heading: Option<f64>,
    pub source: PingSource,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSummary {
    pub deal_id: Uuid,
    pub pings: usize,
    pub distance_km: f64,
    pub last: Option<LocationPing>,
    pub recent: Vec<LocationPing>,
    pub session_active: bool,
}
