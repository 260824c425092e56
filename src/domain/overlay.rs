// Overlay domain models - hazard records and per-source display state
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::surface::SurfaceObservation;

/// GeoJSON geometry, passed through untouched to the rendering layer.
pub type Geometry = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlaySource {
    Warnings,
    Watches,
    Discussions,
    Outlooks,
    Reports,
    SurfaceObs,
    DamageTracks,
}

impl OverlaySource {
    pub const ALL: [OverlaySource; 7] = [
        OverlaySource::Warnings,
        OverlaySource::Watches,
        OverlaySource::Discussions,
        OverlaySource::Outlooks,
        OverlaySource::Reports,
        OverlaySource::SurfaceObs,
        OverlaySource::DamageTracks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverlaySource::Warnings => "warnings",
            OverlaySource::Watches => "watches",
            OverlaySource::Discussions => "discussions",
            OverlaySource::Outlooks => "outlooks",
            OverlaySource::Reports => "reports",
            OverlaySource::SurfaceObs => "surface_obs",
            OverlaySource::DamageTracks => "damage_tracks",
        }
    }

    /// Damage tracks have no validity window and are never time-filtered.
    pub fn is_time_bounded(&self) -> bool {
        !matches!(self, OverlaySource::DamageTracks)
    }

    fn default_opacity(&self) -> f32 {
        match self {
            OverlaySource::Outlooks => 0.35,
            OverlaySource::Watches | OverlaySource::Discussions => 0.5,
            _ => 0.8,
        }
    }
}

impl fmt::Display for OverlaySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverlaySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OverlaySource::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| format!("unknown overlay source '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarningRecord {
    pub wfo: String,
    pub phenomena: String,
    pub significance: String,
    pub event_id: u32,
    pub issue_ms: i64,
    pub expire_ms: i64,
    pub geometry: Geometry,
}

impl WarningRecord {
    /// VTEC code such as `TO.W`.
    pub fn code(&self) -> String {
        format!("{}.{}", self.phenomena, self.significance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchRecord {
    pub number: u32,
    pub watch_type: String,
    pub issue_ms: i64,
    pub expire_ms: i64,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionRecord {
    pub year: i32,
    pub number: u32,
    pub issue_ms: i64,
    pub expire_ms: i64,
    pub concerning: Option<String>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlookRecord {
    pub day: NaiveDate,
    pub cycle: u16,
    pub label: String,
    pub issue_ms: i64,
    pub expire_ms: i64,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub type_code: String,
    pub type_text: String,
    pub valid_ms: i64,
    pub expire_ms: i64,
    pub magnitude: Option<f64>,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub wfo: Option<String>,
    pub remark: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageTrackRecord {
    pub object_id: String,
    pub event_id: Option<String>,
    pub ef_rating: Option<String>,
    pub storm_date: Option<NaiveDate>,
    pub length_miles: Option<f64>,
    pub width_yards: Option<f64>,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverlayRecord {
    Warning(WarningRecord),
    Watch(WatchRecord),
    Discussion(DiscussionRecord),
    Outlook(OutlookRecord),
    Report(ReportRecord),
    Observation(SurfaceObservation),
    DamageTrack(DamageTrackRecord),
}

impl OverlayRecord {
    /// Stable composite identifier, unique within one fetch result.
    pub fn id(&self) -> String {
        match self {
            OverlayRecord::Warning(w) => format!(
                "{}-{}-{}-{:04}-{}",
                w.wfo, w.phenomena, w.significance, w.event_id, w.issue_ms
            ),
            OverlayRecord::Watch(w) => format!("{}-{:04}-{}", w.watch_type, w.number, w.issue_ms),
            OverlayRecord::Discussion(d) => format!("{}-{:04}", d.year, d.number),
            OverlayRecord::Outlook(o) => format!("{}-{:04}-{}", o.day, o.cycle, o.label),
            OverlayRecord::Report(r) => format!(
                "{}-{}-{:.4}-{:.4}",
                r.valid_ms, r.type_code, r.lat, r.lon
            ),
            OverlayRecord::Observation(o) => format!("{}-{}", o.station, o.utc_valid_ms),
            OverlayRecord::DamageTrack(d) => d.object_id.clone(),
        }
    }

    /// `(issue, expire)` in UTC ms, or `None` for records without a validity window.
    pub fn validity(&self) -> Option<(i64, i64)> {
        match self {
            OverlayRecord::Warning(w) => Some((w.issue_ms, w.expire_ms)),
            OverlayRecord::Watch(w) => Some((w.issue_ms, w.expire_ms)),
            OverlayRecord::Discussion(d) => Some((d.issue_ms, d.expire_ms)),
            OverlayRecord::Outlook(o) => Some((o.issue_ms, o.expire_ms)),
            OverlayRecord::Report(r) => Some((r.valid_ms, r.expire_ms)),
            OverlayRecord::Observation(o) => Some((o.utc_valid_ms, o.valid_until_ms)),
            OverlayRecord::DamageTrack(_) => None,
        }
    }

    /// Half-open activity test: `issue <= t < expire`.
    pub fn is_active_at(&self, t: i64) -> bool {
        match self.validity() {
            Some((issue, expire)) => issue <= t && t < expire,
            None => true,
        }
    }
}

/// Per-source state held by the overlay store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySourceState {
    pub records: Vec<OverlayRecord>,
    pub loading: bool,
    pub error: Option<String>,
    pub visible: bool,
    pub time_synced: bool,
    pub opacity: f32,
}

impl OverlaySourceState {
    pub fn new(source: OverlaySource) -> Self {
        Self {
            records: Vec::new(),
            loading: false,
            error: None,
            visible: true,
            time_synced: source.is_time_bounded(),
            opacity: source.default_opacity(),
        }
    }

    /// Drop fetched data but keep display preferences.
    pub fn reset(&mut self) {
        self.records.clear();
        self.loading = false;
        self.error = None;
    }
}
