use crate::domain::timeline::RadarSite;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub endpoints: EndpointSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default = "default_site")]
    pub default_site: RadarSite,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub listen_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream URLs. `outlook_url` takes `${year}`, `${date}` and `${cycle}`;
/// `station_network_url` takes `${network}`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointSettings {
    pub warnings_url: String,
    pub watches_url: String,
    pub reports_url: String,
    pub discussions_url: String,
    pub outlook_url: String,
    pub damage_url: String,
    pub station_network_url: String,
    pub station_day_url: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            warnings_url: "https://mesonet.agron.iastate.edu/geojson/sbw.geojson".to_string(),
            watches_url: "https://mesonet.agron.iastate.edu/geojson/watches.geojson".to_string(),
            reports_url: "https://mesonet.agron.iastate.edu/geojson/lsr.geojson".to_string(),
            discussions_url: "https://mesonet.agron.iastate.edu/geojson/spc_mcd.geojson".to_string(),
            outlook_url: "https://www.spc.noaa.gov/products/outlook/archive/${year}/day1otlk_${date}_${cycle}_cat.nolyr.geojson"
                .to_string(),
            damage_url: "https://services.dat.noaa.gov/arcgis/rest/services/nws_damageassessmenttoolkit/DamageViewer/FeatureServer/1/query"
                .to_string(),
            station_network_url: "https://mesonet.agron.iastate.edu/geojson/network/${network}.geojson"
                .to_string(),
            station_day_url: "https://mesonet.agron.iastate.edu/api/1/obhistory.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchSettings {
    pub request_timeout_secs: u64,
    /// Outlook issuance cycles, latest first.
    pub outlook_cycles: Vec<u16>,
    pub discussion_sample_minutes: i64,
    pub discussion_concurrency: usize,
    pub station_day_concurrency: usize,
    pub station_radius_km: f64,
    pub max_stations_per_site: usize,
    pub damage_page_size: usize,
    pub damage_max_pages: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            outlook_cycles: vec![2000, 1630, 1300, 1200, 100],
            discussion_sample_minutes: 30,
            discussion_concurrency: 3,
            station_day_concurrency: 5,
            station_radius_km: 150.0,
            max_stations_per_site: 40,
            damage_page_size: 1000,
            damage_max_pages: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PlaybackSettings {
    pub frame_interval_ms: u64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}

fn default_site() -> RadarSite {
    RadarSite {
        id: "KTLX".to_string(),
        lat: 35.333,
        lon: -97.278,
        timezone: "America/Chicago".to_string(),
    }
}

/// Read `config/overlays.*` if present, then `OVERLAY__SECTION__KEY` overrides.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/overlays").required(false))
        .add_source(
            config::Environment::with_prefix("OVERLAY")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("fetch.outlook_cycles")
                .try_parsing(true),
        )
        .build()
        .context("reading overlay configuration")?;

    settings
        .try_deserialize()
        .context("decoding overlay configuration")
}

/// Replace `${name}` placeholders in a URL template
pub fn fill_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
