// Feed trait for the upstream hazard and observation providers
use crate::domain::event::EventRange;
use crate::domain::overlay::{
    DamageTrackRecord, DiscussionRecord, OutlookRecord, ReportRecord, WarningRecord, WatchRecord,
};
use crate::domain::surface::{AsosStation, SurfaceObservation};
use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// Upstream answered with a non-success status
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Network failure before a response arrived
    #[error("request failed: {0}")]
    Transport(String),
    /// Response arrived but could not be decoded
    #[error("malformed response: {0}")]
    Malformed(String),
    /// Upstream sent a plain-text notice instead of structured data
    #[error("data unavailable: {0}")]
    Unavailable(String),
    /// A pipeline-level condition, e.g. every partition failed
    #[error("{0}")]
    Pipeline(String),
}

/// One page request against the damage-survey feature service.
#[derive(Debug, Clone, PartialEq)]
pub struct DamageQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DamagePage {
    pub records: Vec<DamageTrackRecord>,
    /// Upstream signalled more rows beyond this page.
    pub exceeded_transfer_limit: bool,
}

#[async_trait]
pub trait HazardFeed: Send + Sync {
    /// Storm-based warnings issued within the range
    async fn warnings(&self, range: EventRange) -> Result<Vec<WarningRecord>, FeedError>;

    /// Convective watches issued within the range
    async fn watches(&self, range: EventRange) -> Result<Vec<WatchRecord>, FeedError>;

    /// Local storm reports valid within the range
    async fn storm_reports(&self, range: EventRange) -> Result<Vec<ReportRecord>, FeedError>;

    /// Mesoscale discussions active at one instant (the upstream has no range query)
    async fn discussions_at(&self, instant_ms: i64) -> Result<Vec<DiscussionRecord>, FeedError>;

    /// Categorical outlook for one convective day and issuance cycle (HHMM)
    async fn outlook(&self, day: NaiveDate, cycle: u16) -> Result<Vec<OutlookRecord>, FeedError>;

    /// One page of damage survey tracks
    async fn damage_page(&self, query: &DamageQuery) -> Result<DamagePage, FeedError>;

    /// Station list for a state network such as `OK_ASOS`
    async fn station_network(&self, network: &str) -> Result<Vec<AsosStation>, FeedError>;

    /// All observations for one station on one UTC day
    async fn station_day(
        &self,
        station: &AsosStation,
        day: NaiveDate,
    ) -> Result<Vec<SurfaceObservation>, FeedError>;
}
