// Source fetch pipelines - one retrieval strategy per overlay source
pub mod damage_track;
pub mod discussion;
pub mod outlook;
pub mod range_query;
pub mod surface_obs;

use crate::application::hazard_feed::{FeedError, HazardFeed};
use crate::application::station_cache::StationCache;
use crate::domain::event::EventRange;
use crate::domain::overlay::{OverlayRecord, OverlaySource};
use crate::domain::timeline::RadarSite;
use crate::infrastructure::config::FetchSettings;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;

/// Parameters shared by every pipeline of one orchestration run.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub range: EventRange,
    /// The 12Z-to-12Z day outlooks are organised by
    pub convective_day: NaiveDate,
    /// Radar sites surface stations are discovered around
    pub sites: Vec<RadarSite>,
}

impl PipelineContext {
    pub fn new(range: EventRange, sites: Vec<RadarSite>) -> Self {
        Self {
            range,
            convective_day: range.convective_day(),
            sites,
        }
    }
}

#[async_trait]
pub trait OverlayPipeline: Send + Sync {
    fn source(&self) -> OverlaySource;

    /// Turn the context into a deduplicated record list, or a failure message.
    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError>;
}

/// Build one pipeline per overlay source.
pub fn build_pipelines(
    feed: Arc<dyn HazardFeed>,
    cache: StationCache,
    settings: &FetchSettings,
) -> Vec<Arc<dyn OverlayPipeline>> {
    vec![
        Arc::new(range_query::WarningsPipeline::new(feed.clone())),
        Arc::new(range_query::WatchesPipeline::new(feed.clone())),
        Arc::new(range_query::ReportsPipeline::new(feed.clone())),
        Arc::new(outlook::OutlookPipeline::new(
            feed.clone(),
            settings.outlook_cycles.clone(),
        )),
        Arc::new(discussion::DiscussionPipeline::new(
            feed.clone(),
            settings.discussion_sample_minutes * 60_000,
            settings.discussion_concurrency,
        )),
        Arc::new(damage_track::DamageTrackPipeline::new(
            feed.clone(),
            settings.damage_page_size,
            settings.damage_max_pages,
        )),
        Arc::new(surface_obs::SurfaceObsPipeline::new(
            feed,
            cache,
            surface_obs::StationSearch {
                radius_km: settings.station_radius_km,
                max_stations: settings.max_stations_per_site,
            },
            settings.station_day_concurrency,
        )),
    ]
}

/// Keep the first record for each identifier, preserving order.
pub fn dedup_by_id(records: Vec<OverlayRecord>) -> Vec<OverlayRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.id()))
        .collect()
}
