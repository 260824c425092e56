// Convective outlook pipeline - retry ladder over issuance cycles
use super::{OverlayPipeline, PipelineContext, dedup_by_id};
use crate::application::hazard_feed::{FeedError, HazardFeed};
use crate::domain::overlay::{OverlayRecord, OverlaySource};
use async_trait::async_trait;
use std::sync::Arc;

/// Day 1 issuance cycles, latest first.
pub const DEFAULT_CYCLES: &[u16] = &[2000, 1630, 1300, 1200, 100];

/// Labels of the categorical outlook.
pub const CATEGORICAL_LABELS: &[&str] = &["TSTM", "MRGL", "SLGT", "ENH", "MDT", "HIGH"];

pub struct OutlookPipeline {
    feed: Arc<dyn HazardFeed>,
    cycles: Vec<u16>,
}

impl OutlookPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>, cycles: Vec<u16>) -> Self {
        let cycles = if cycles.is_empty() {
            DEFAULT_CYCLES.to_vec()
        } else {
            cycles
        };
        Self { feed, cycles }
    }
}

#[async_trait]
impl OverlayPipeline for OutlookPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::Outlooks
    }

    /// Never fails: a day without any usable cycle is an empty, quiet result.
    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let day = ctx.convective_day;

        for &cycle in &self.cycles {
            match self.feed.outlook(day, cycle).await {
                Ok(outlooks) => {
                    let categorical: Vec<OverlayRecord> = outlooks
                        .into_iter()
                        .filter(|o| CATEGORICAL_LABELS.contains(&o.label.as_str()))
                        .map(OverlayRecord::Outlook)
                        .collect();

                    if !categorical.is_empty() {
                        tracing::debug!(%day, cycle, count = categorical.len(), "Using outlook cycle");
                        return Ok(dedup_by_id(categorical));
                    }
                    tracing::debug!(%day, cycle, "Outlook cycle has no categorical features");
                }
                Err(e) => {
                    tracing::debug!(%day, cycle, error = %e, "Outlook cycle unavailable");
                }
            }
        }

        tracing::info!(%day, "No outlook cycle available");
        Ok(Vec::new())
    }
}
