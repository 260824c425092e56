// HTTP implementation of the hazard feed
use crate::application::hazard_feed::{DamagePage, DamageQuery, FeedError, HazardFeed};
use crate::domain::event::{EventRange, to_utc};
use crate::domain::overlay::{
    DiscussionRecord, OutlookRecord, ReportRecord, WarningRecord, WatchRecord,
};
use crate::domain::surface::{AsosStation, SurfaceObservation};
use crate::infrastructure::config::{EndpointSettings, fill_template};
use crate::infrastructure::wire;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::time::Duration;

const ISO_MINUTE: &str = "%Y-%m-%dT%H:%MZ";

#[derive(Debug, Clone)]
pub struct HttpHazardFeed {
    client: reqwest::Client,
    endpoints: EndpointSettings,
}

impl HttpHazardFeed {
    pub fn new(endpoints: EndpointSettings, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, endpoints })
    }

    async fn get_text(&self, url: &str) -> Result<String, FeedError> {
        tracing::debug!(url, "Fetching upstream");
        let response = self
            .client
            .get(url)
            .header("Accept", "application/geo+json, application/json")
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }

    async fn get_range(&self, base: &str, range: EventRange) -> Result<String, FeedError> {
        let url = with_query(
            base,
            &[
                ("sts", range.start().format(ISO_MINUTE).to_string()),
                ("ets", range.end().format(ISO_MINUTE).to_string()),
            ],
        );
        self.get_text(&url).await
    }
}

/// Append URL-encoded query pairs to `base`.
pub fn with_query(base: &str, pairs: &[(&str, String)]) -> String {
    let query = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

fn damage_where_clause(query: &DamageQuery) -> String {
    format!(
        "stormdate >= DATE '{}' AND stormdate <= DATE '{}'",
        query.from.format("%Y-%m-%d"),
        query.to.format("%Y-%m-%d")
    )
}

#[async_trait]
impl HazardFeed for HttpHazardFeed {
    async fn warnings(&self, range: EventRange) -> Result<Vec<WarningRecord>, FeedError> {
        let body = self.get_range(&self.endpoints.warnings_url, range).await?;
        wire::parse_warnings(&body)
    }

    async fn watches(&self, range: EventRange) -> Result<Vec<WatchRecord>, FeedError> {
        let body = self.get_range(&self.endpoints.watches_url, range).await?;
        wire::parse_watches(&body)
    }

    async fn storm_reports(&self, range: EventRange) -> Result<Vec<ReportRecord>, FeedError> {
        let body = self.get_range(&self.endpoints.reports_url, range).await?;
        wire::parse_reports(&body)
    }

    async fn discussions_at(&self, instant_ms: i64) -> Result<Vec<DiscussionRecord>, FeedError> {
        let valid = to_utc(instant_ms).format(ISO_MINUTE).to_string();
        let url = with_query(&self.endpoints.discussions_url, &[("valid", valid)]);
        let body = self.get_text(&url).await?;
        wire::parse_discussions(&body)
    }

    async fn outlook(&self, day: NaiveDate, cycle: u16) -> Result<Vec<OutlookRecord>, FeedError> {
        let vars = HashMap::from([
            ("year", day.year().to_string()),
            ("date", day.format("%Y%m%d").to_string()),
            ("cycle", format!("{:04}", cycle)),
        ]);
        let url = fill_template(&self.endpoints.outlook_url, &vars);
        let body = self.get_text(&url).await?;
        wire::parse_outlook(&body, day, cycle)
    }

    async fn damage_page(&self, query: &DamageQuery) -> Result<DamagePage, FeedError> {
        let url = with_query(
            &self.endpoints.damage_url,
            &[
                ("where", damage_where_clause(query)),
                ("outFields", "*".to_string()),
                ("f", "geojson".to_string()),
                ("resultOffset", query.offset.to_string()),
                ("resultRecordCount", query.limit.to_string()),
            ],
        );
        let body = self.get_text(&url).await?;
        wire::parse_damage_page(&body)
    }

    async fn station_network(&self, network: &str) -> Result<Vec<AsosStation>, FeedError> {
        let vars = HashMap::from([("network", network.to_string())]);
        let url = fill_template(&self.endpoints.station_network_url, &vars);
        let body = self.get_text(&url).await?;
        wire::parse_station_network(&body, network)
    }

    async fn station_day(
        &self,
        station: &AsosStation,
        day: NaiveDate,
    ) -> Result<Vec<SurfaceObservation>, FeedError> {
        let url = with_query(
            &self.endpoints.station_day_url,
            &[
                ("station", station.id.clone()),
                ("network", station.network.clone()),
                ("date", day.format("%Y-%m-%d").to_string()),
            ],
        );
        let body = self.get_text(&url).await?;
        wire::parse_ob_history(&body, station)
    }
}
