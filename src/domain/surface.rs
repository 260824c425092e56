// Surface station and observation domain models
use serde::{Deserialize, Serialize};

/// An ASOS station; immutable once fetched and shared through the station cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsosStation {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub network: String,
    pub elevation_meters: Option<f64>,
}

/// One surface report. `None` means the sensor reading is missing, not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceObservation {
    pub station: String,
    pub lat: f64,
    pub lon: f64,
    pub utc_valid_ms: i64,
    /// End of the window in which this is the station's current report.
    pub valid_until_ms: i64,
    pub tmpf: Option<f64>,
    pub dwpf: Option<f64>,
    pub drct: Option<f64>,
    pub sknt: Option<f64>,
    pub gust: Option<f64>,
    pub mslp: Option<f64>,
    pub skyc1: Option<String>,
}
