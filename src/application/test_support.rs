// In-memory HazardFeed double with scripted responses and call counters
use crate::application::hazard_feed::{DamagePage, DamageQuery, FeedError, HazardFeed};
use crate::domain::event::EventRange;
use crate::domain::overlay::{
    DamageTrackRecord, DiscussionRecord, OutlookRecord, ReportRecord, WarningRecord, WatchRecord,
};
use crate::domain::surface::{AsosStation, SurfaceObservation};
use crate::infrastructure::wire;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct ScriptedFeed {
    pub warnings: Vec<WarningRecord>,
    pub watches: Vec<WatchRecord>,
    pub reports: Vec<ReportRecord>,
    /// Returned for every instant inside their validity window
    pub discussions: Vec<DiscussionRecord>,
    pub outlooks: HashMap<u16, Result<Vec<OutlookRecord>, FeedError>>,
    pub damage_pages: Vec<Result<DamagePage, FeedError>>,
    pub networks: HashMap<String, Vec<AsosStation>>,
    pub observations: HashMap<(String, NaiveDate), Vec<SurfaceObservation>>,
    /// Endpoint names that fail with a 503
    pub failing: HashSet<&'static str>,
    pub failing_instants: HashSet<i64>,
    pub delay: Option<Duration>,
    /// Raw upstream bodies decoded by the real wire parsers, keyed by endpoint
    pub bodies: HashMap<&'static str, String>,
    pub calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedFeed {
    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    async fn enter(&self, endpoint: &'static str) -> Result<(), FeedError> {
        *self.calls.lock().unwrap().entry(endpoint).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(endpoint) {
            return Err(FeedError::Status {
                status: 503,
                body: format!("{} unavailable", endpoint),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl HazardFeed for ScriptedFeed {
    async fn warnings(&self, _range: EventRange) -> Result<Vec<WarningRecord>, FeedError> {
        self.enter("warnings").await?;
        if let Some(body) = self.bodies.get("warnings") {
            return wire::parse_warnings(body);
        }
        Ok(self.warnings.clone())
    }

    async fn watches(&self, _range: EventRange) -> Result<Vec<WatchRecord>, FeedError> {
        self.enter("watches").await?;
        if let Some(body) = self.bodies.get("watches") {
            return wire::parse_watches(body);
        }
        Ok(self.watches.clone())
    }

    async fn storm_reports(&self, _range: EventRange) -> Result<Vec<ReportRecord>, FeedError> {
        self.enter("reports").await?;
        if let Some(body) = self.bodies.get("reports") {
            return wire::parse_reports(body);
        }
        Ok(self.reports.clone())
    }

    async fn discussions_at(&self, instant_ms: i64) -> Result<Vec<DiscussionRecord>, FeedError> {
        self.enter("discussions").await?;
        if self.failing_instants.contains(&instant_ms) {
            return Err(FeedError::Transport("connection reset".to_string()));
        }
        Ok(self
            .discussions
            .iter()
            .filter(|d| d.issue_ms <= instant_ms && instant_ms < d.expire_ms)
            .cloned()
            .collect())
    }

    async fn outlook(&self, _day: NaiveDate, cycle: u16) -> Result<Vec<OutlookRecord>, FeedError> {
        self.enter("outlooks").await?;
        self.outlooks
            .get(&cycle)
            .cloned()
            .unwrap_or_else(|| Err(FeedError::Unavailable("404 Not Found".to_string())))
    }

    async fn damage_page(&self, query: &DamageQuery) -> Result<DamagePage, FeedError> {
        self.enter("damage").await?;
        let index = query.offset / query.limit.max(1);
        self.damage_pages
            .get(index)
            .cloned()
            .unwrap_or_else(|| Ok(DamagePage::default()))
    }

    async fn station_network(&self, network: &str) -> Result<Vec<AsosStation>, FeedError> {
        self.enter("networks").await?;
        Ok(self.networks.get(network).cloned().unwrap_or_default())
    }

    async fn station_day(
        &self,
        station: &AsosStation,
        day: NaiveDate,
    ) -> Result<Vec<SurfaceObservation>, FeedError> {
        self.enter("station_day").await?;
        self.observations
            .get(&(station.id.clone(), day))
            .cloned()
            .ok_or_else(|| FeedError::Unavailable(format!("no history for {} {}", station.id, day)))
    }
}

pub fn warning(event_id: u32, code: (&str, &str), issue_ms: i64, expire_ms: i64) -> WarningRecord {
    WarningRecord {
        wfo: "OUN".to_string(),
        phenomena: code.0.to_string(),
        significance: code.1.to_string(),
        event_id,
        issue_ms,
        expire_ms,
        geometry: serde_json::Value::Null,
    }
}

pub fn watch(number: u32, watch_type: &str, issue_ms: i64, expire_ms: i64) -> WatchRecord {
    WatchRecord {
        number,
        watch_type: watch_type.to_string(),
        issue_ms,
        expire_ms,
        geometry: serde_json::Value::Null,
    }
}

pub fn report(type_code: &str, valid_ms: i64) -> ReportRecord {
    ReportRecord {
        type_code: type_code.to_string(),
        type_text: "TORNADO".to_string(),
        valid_ms,
        expire_ms: valid_ms,
        magnitude: None,
        city: Some("Moore".to_string()),
        county: Some("Cleveland".to_string()),
        state: Some("OK".to_string()),
        wfo: Some("OUN".to_string()),
        remark: None,
        lat: 35.33,
        lon: -97.49,
    }
}

pub fn discussion(number: u32, issue_ms: i64, expire_ms: i64) -> DiscussionRecord {
    DiscussionRecord {
        year: 2013,
        number,
        issue_ms,
        expire_ms,
        concerning: Some("Tornado Watch likely".to_string()),
        geometry: serde_json::Value::Null,
    }
}

pub fn outlook(cycle: u16, label: &str) -> OutlookRecord {
    OutlookRecord {
        day: NaiveDate::from_ymd_opt(2013, 5, 20).unwrap(),
        cycle,
        label: label.to_string(),
        issue_ms: 0,
        expire_ms: i64::MAX,
        geometry: serde_json::Value::Null,
    }
}

pub fn damage_track(object_id: &str) -> DamageTrackRecord {
    DamageTrackRecord {
        object_id: object_id.to_string(),
        event_id: None,
        ef_rating: Some("EF4".to_string()),
        storm_date: NaiveDate::from_ymd_opt(2013, 5, 20),
        length_miles: None,
        width_yards: None,
        geometry: serde_json::Value::Null,
    }
}

pub fn station(id: &str, network: &str, lat: f64, lon: f64) -> AsosStation {
    AsosStation {
        id: id.to_string(),
        name: id.to_string(),
        lat,
        lon,
        network: network.to_string(),
        elevation_meters: Some(390.0),
    }
}

pub fn observation(station: &str, utc_valid_ms: i64, tmpf: Option<f64>) -> SurfaceObservation {
    SurfaceObservation {
        station: station.to_string(),
        lat: 35.0,
        lon: -97.0,
        utc_valid_ms,
        valid_until_ms: utc_valid_ms,
        tmpf,
        dwpf: None,
        drct: None,
        sknt: None,
        gust: None,
        mslp: None,
        skyc1: None,
    }
}
