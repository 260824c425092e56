// Upstream wire formats - GeoJSON collections and observation histories
use crate::application::hazard_feed::{DamagePage, FeedError};
use crate::domain::event::CONVECTIVE_DAY_OFFSET_HOURS;
use crate::domain::overlay::{
    DamageTrackRecord, DiscussionRecord, OutlookRecord, ReportRecord, WarningRecord, WatchRecord,
};
use crate::domain::surface::{AsosStation, SurfaceObservation};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%MZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y%m%d%H%M",
];

/// Parse any of the timestamp spellings the upstreams use into UTC ms.
pub fn parse_utc_ms(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.timestamp_millis());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Decode a JSON body; anything that is not a JSON document is an upstream notice.
pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, FeedError> {
    let trimmed = body.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        let preview: String = trimmed.chars().take(120).collect();
        return Err(FeedError::Unavailable(preview));
    }
    serde_json::from_str(trimmed).map_err(|e| FeedError::Malformed(e.to_string()))
}

// Lenient field decoders

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() && s != "M" => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_to_utc_ms(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_utc_ms(s),
        _ => None,
    }
}

fn de_opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(value_to_f64(&Value::deserialize(deserializer)?))
}

fn de_opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(value_to_string(&Value::deserialize(deserializer)?))
}

fn de_opt_utc_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    Ok(value_to_utc_ms(&Value::deserialize(deserializer)?))
}

fn de_utc_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_utc_ms(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp {}", value)))
}

fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    value_to_f64(&value)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64)
        .map(|n| n as u32)
        .ok_or_else(|| serde::de::Error::custom(format!("expected an unsigned number, got {}", value)))
}

/// ArcGIS date fields arrive as epoch ms; other services send ISO dates.
fn de_opt_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.date_naive()),
        Value::String(s) => NaiveDate::parse_from_str(s.get(..10).unwrap_or(s.as_str()), "%Y-%m-%d").ok(),
        _ => None,
    })
}

// GeoJSON envelope

#[derive(Debug, Deserialize)]
pub struct RawFeature {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub geometry: Value,
    #[serde(default)]
    pub properties: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectionProperties {
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Option<Vec<RawFeature>>,
    #[serde(default, rename = "exceededTransferLimit")]
    pub exceeded_transfer_limit: Option<bool>,
    #[serde(default)]
    pub properties: Option<CollectionProperties>,
    /// ArcGIS reports query errors inside a 200 response
    #[serde(default)]
    pub error: Option<Value>,
}

impl FeatureCollection {
    pub fn exceeded_transfer_limit(&self) -> bool {
        self.exceeded_transfer_limit
            .or_else(|| {
                self.properties
                    .as_ref()
                    .and_then(|p| p.exceeded_transfer_limit)
            })
            .unwrap_or(false)
    }

    /// Decode each feature's properties, skipping the ones that do not fit.
    fn map_features<P, R>(self, what: &'static str, mut build: impl FnMut(P, RawFeature) -> Option<R>) -> Vec<R>
    where
        P: DeserializeOwned,
    {
        let features = self.features.unwrap_or_default();
        let total = features.len();
        let records: Vec<R> = features
            .into_iter()
            .filter_map(|mut feature| {
                let properties = std::mem::take(&mut feature.properties);
                match serde_json::from_value::<P>(properties) {
                    Ok(props) => build(props, feature),
                    Err(e) => {
                        tracing::debug!(what, error = %e, "Skipping malformed feature");
                        None
                    }
                }
            })
            .collect();

        if records.len() < total {
            tracing::debug!(what, total, kept = records.len(), "Dropped unusable features");
        }
        records
    }

    /// Decode every feature or fail the whole response.
    fn strict_features<P, R>(
        self,
        what: &'static str,
        mut build: impl FnMut(P, RawFeature) -> Option<R>,
    ) -> Result<Vec<R>, FeedError>
    where
        P: DeserializeOwned,
    {
        if let Some(error) = &self.error {
            return Err(FeedError::Malformed(format!("{} service error: {}", what, error)));
        }
        let features = self
            .features
            .ok_or_else(|| FeedError::Malformed(format!("{} response has no features", what)))?;

        features
            .into_iter()
            .enumerate()
            .map(|(index, mut feature)| {
                let properties = std::mem::take(&mut feature.properties);
                let props = serde_json::from_value::<P>(properties)
                    .map_err(|e| FeedError::Malformed(format!("{} feature {}: {}", what, index, e)))?;
                build(props, feature).ok_or_else(|| {
                    FeedError::Malformed(format!("{} feature {} is incomplete", what, index))
                })
            })
            .collect()
    }
}

fn point_lat_lon(geometry: &Value) -> Option<(f64, f64)> {
    let coordinates = geometry.get("coordinates")?.as_array()?;
    let lon = coordinates.first().and_then(value_to_f64)?;
    let lat = coordinates.get(1).and_then(value_to_f64)?;
    Some((lat, lon))
}

// Feature properties per product

#[derive(Debug, Deserialize)]
struct WarningProps {
    wfo: String,
    phenomena: String,
    significance: String,
    #[serde(alias = "eventid", deserialize_with = "de_u32")]
    event_id: u32,
    #[serde(deserialize_with = "de_utc_ms")]
    issue: i64,
    #[serde(deserialize_with = "de_utc_ms")]
    expire: i64,
}

#[derive(Debug, Deserialize)]
struct WatchProps {
    #[serde(alias = "num", deserialize_with = "de_u32")]
    number: u32,
    #[serde(rename = "type")]
    watch_type: String,
    #[serde(deserialize_with = "de_utc_ms")]
    issue: i64,
    #[serde(deserialize_with = "de_utc_ms")]
    expire: i64,
}

#[derive(Debug, Deserialize)]
struct ReportProps {
    #[serde(deserialize_with = "de_utc_ms")]
    valid: i64,
    #[serde(rename = "type")]
    type_code: String,
    #[serde(default, alias = "typetext")]
    type_text: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    magnitude: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    city: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    county: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    state: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    wfo: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    remark: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DiscussionProps {
    #[serde(default)]
    year: Option<i32>,
    #[serde(alias = "product_num", alias = "num", deserialize_with = "de_u32")]
    number: u32,
    #[serde(deserialize_with = "de_utc_ms")]
    issue: i64,
    #[serde(deserialize_with = "de_utc_ms")]
    expire: i64,
    #[serde(default, deserialize_with = "de_opt_string")]
    concerning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OutlookProps {
    #[serde(rename = "LABEL", alias = "label")]
    label: String,
    #[serde(default, rename = "VALID", alias = "valid", deserialize_with = "de_opt_utc_ms")]
    valid: Option<i64>,
    #[serde(default, rename = "EXPIRE", alias = "expire", deserialize_with = "de_opt_utc_ms")]
    expire: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DamageProps {
    #[serde(default, alias = "OBJECTID", alias = "objectid", deserialize_with = "de_opt_string")]
    object_id: Option<String>,
    #[serde(default, alias = "EVENT_ID", deserialize_with = "de_opt_string")]
    event_id: Option<String>,
    #[serde(default, alias = "efscale", alias = "EFSCALE", deserialize_with = "de_opt_string")]
    ef_rating: Option<String>,
    #[serde(default, alias = "stormdate", alias = "STORMDATE", deserialize_with = "de_opt_date")]
    storm_date: Option<NaiveDate>,
    #[serde(default, alias = "length", alias = "LENGTH", deserialize_with = "de_opt_f64")]
    length_miles: Option<f64>,
    #[serde(default, alias = "width", alias = "WIDTH", deserialize_with = "de_opt_f64")]
    width_yards: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StationProps {
    #[serde(default, deserialize_with = "de_opt_string")]
    sid: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    sname: Option<String>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    elevation: Option<f64>,
}

pub fn parse_warnings(body: &str) -> Result<Vec<WarningRecord>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    collection.strict_features("warning", |p: WarningProps, feature| {
        Some(WarningRecord {
            wfo: p.wfo,
            phenomena: p.phenomena,
            significance: p.significance,
            event_id: p.event_id,
            issue_ms: p.issue,
            expire_ms: p.expire,
            geometry: feature.geometry,
        })
    })
}

pub fn parse_watches(body: &str) -> Result<Vec<WatchRecord>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    collection.strict_features("watch", |p: WatchProps, feature| {
        Some(WatchRecord {
            number: p.number,
            watch_type: p.watch_type,
            issue_ms: p.issue,
            expire_ms: p.expire,
            geometry: feature.geometry,
        })
    })
}

/// Reports come back with `expire == valid`; the pipeline assigns display windows.
pub fn parse_reports(body: &str) -> Result<Vec<ReportRecord>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    collection.strict_features("report", |p: ReportProps, feature| {
        let (lat, lon) = match (p.lat, p.lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => point_lat_lon(&feature.geometry)?,
        };
        Some(ReportRecord {
            type_text: p.type_text.unwrap_or_else(|| p.type_code.clone()),
            type_code: p.type_code,
            valid_ms: p.valid,
            expire_ms: p.valid,
            magnitude: p.magnitude,
            city: p.city,
            county: p.county,
            state: p.state,
            wfo: p.wfo,
            remark: p.remark,
            lat,
            lon,
        })
    })
}

pub fn parse_discussions(body: &str) -> Result<Vec<DiscussionRecord>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    Ok(collection.map_features("discussion", |p: DiscussionProps, feature| {
        let year = match p.year {
            Some(year) => year,
            None => DateTime::<Utc>::from_timestamp_millis(p.issue)?.year(),
        };
        Some(DiscussionRecord {
            year,
            number: p.number,
            issue_ms: p.issue,
            expire_ms: p.expire,
            concerning: p.concerning,
            geometry: feature.geometry,
        })
    }))
}

/// Outlook polygons for one convective day and cycle. Missing validity falls
/// back to the convective day itself, 12Z to 12Z.
pub fn parse_outlook(body: &str, day: NaiveDate, cycle: u16) -> Result<Vec<OutlookRecord>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    let day_start = day
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp_millis()
        + CONVECTIVE_DAY_OFFSET_HOURS * 3_600_000;
    let day_end = day_start + 24 * 3_600_000;

    Ok(collection.map_features("outlook", |p: OutlookProps, feature| {
        Some(OutlookRecord {
            day,
            cycle,
            label: p.label,
            issue_ms: p.valid.unwrap_or(day_start),
            expire_ms: p.expire.unwrap_or(day_end),
            geometry: feature.geometry,
        })
    }))
}

pub fn parse_damage_page(body: &str) -> Result<DamagePage, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    if let Some(error) = &collection.error {
        return Err(FeedError::Malformed(format!("feature service error: {}", error)));
    }
    let exceeded_transfer_limit = collection.exceeded_transfer_limit();
    let records = collection.map_features("damage track", |p: DamageProps, feature| {
        let object_id = p.object_id.or_else(|| value_to_string(&feature.id))?;
        Some(DamageTrackRecord {
            object_id,
            event_id: p.event_id,
            ef_rating: p.ef_rating,
            storm_date: p.storm_date,
            length_miles: p.length_miles,
            width_yards: p.width_yards,
            geometry: feature.geometry,
        })
    });
    Ok(DamagePage {
        records,
        exceeded_transfer_limit,
    })
}

pub fn parse_station_network(body: &str, network: &str) -> Result<Vec<AsosStation>, FeedError> {
    let collection: FeatureCollection = decode_json(body)?;
    Ok(collection.map_features("station", |p: StationProps, feature| {
        let id = p.sid.or_else(|| value_to_string(&feature.id))?;
        let (lat, lon) = point_lat_lon(&feature.geometry)?;
        Some(AsosStation {
            name: p.sname.unwrap_or_else(|| id.clone()),
            id,
            lat,
            lon,
            network: network.to_string(),
            elevation_meters: p.elevation,
        })
    }))
}

// Observation history

/// Station-day history in either row or column orientation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ObHistory {
    Columnar {
        columns: Vec<String>,
        data: Vec<Vec<Value>>,
    },
    Records {
        #[serde(default)]
        data: Vec<Map<String, Value>>,
    },
}

impl ObHistory {
    fn into_rows(self) -> Vec<Map<String, Value>> {
        match self {
            ObHistory::Records { data } => data,
            ObHistory::Columnar { columns, data } => data
                .into_iter()
                .map(|row| columns.iter().cloned().zip(row).collect())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObRow {
    #[serde(deserialize_with = "de_utc_ms")]
    utc_valid: i64,
    #[serde(default, deserialize_with = "de_opt_f64")]
    tmpf: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    dwpf: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    drct: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    sknt: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    gust: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_f64")]
    mslp: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    skyc1: Option<String>,
}

/// Observations for one station; `valid_until_ms` is left equal to the report
/// time for the pipeline to close.
pub fn parse_ob_history(body: &str, station: &AsosStation) -> Result<Vec<SurfaceObservation>, FeedError> {
    let history: ObHistory = decode_json(body)?;
    let rows = history.into_rows();
    let total = rows.len();

    let observations: Vec<SurfaceObservation> = rows
        .into_iter()
        .filter_map(|row| serde_json::from_value::<ObRow>(Value::Object(row)).ok())
        .map(|row| SurfaceObservation {
            station: station.id.clone(),
            lat: station.lat,
            lon: station.lon,
            utc_valid_ms: row.utc_valid,
            valid_until_ms: row.utc_valid,
            tmpf: row.tmpf,
            dwpf: row.dwpf,
            drct: row.drct,
            sknt: row.sknt,
            gust: row.gust,
            mslp: row.mslp,
            skyc1: row.skyc1,
        })
        .collect();

    if observations.len() < total {
        tracing::debug!(
            station = %station.id,
            total,
            kept = observations.len(),
            "Skipped observation rows without a valid time"
        );
    }
    Ok(observations)
}
