// Damage track pipeline - paginated cursor query over a widened date range
use super::{OverlayPipeline, PipelineContext, dedup_by_id};
use crate::application::hazard_feed::{DamageQuery, FeedError, HazardFeed};
use crate::domain::overlay::{OverlayRecord, OverlaySource};
use async_trait::async_trait;
use std::sync::Arc;

/// Surveys near a range boundary may be dated a day outside it.
pub const DATE_WIDENING_DAYS: i64 = 1;

pub struct DamageTrackPipeline {
    feed: Arc<dyn HazardFeed>,
    page_size: usize,
    max_pages: usize,
}

impl DamageTrackPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>, page_size: usize, max_pages: usize) -> Self {
        Self {
            feed,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }
}

#[async_trait]
impl OverlayPipeline for DamageTrackPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::DamageTracks
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let (from, to) = ctx.range.widened_dates(DATE_WIDENING_DAYS);
        let mut records = Vec::new();
        let mut query = DamageQuery {
            from,
            to,
            offset: 0,
            limit: self.page_size,
        };

        for page_number in 0..self.max_pages {
            let page = match self.feed.damage_page(&query).await {
                Ok(page) => page,
                Err(e) if page_number == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(page_number, error = %e, "Damage page failed, keeping earlier pages");
                    break;
                }
            };

            let received = page.records.len();
            records.extend(page.records.into_iter().map(OverlayRecord::DamageTrack));

            if !page.exceeded_transfer_limit || received == 0 {
                break;
            }
            if page_number + 1 == self.max_pages {
                tracing::warn!(pages = self.max_pages, "Damage paging stopped at page ceiling");
            }
            query.offset += received;
        }

        tracing::debug!(%from, %to, count = records.len(), "Fetched damage tracks");
        Ok(dedup_by_id(records))
    }
}
