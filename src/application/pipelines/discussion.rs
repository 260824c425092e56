// Mesoscale discussion pipeline - time-sampled fan-out with reissue resolution
use super::{OverlayPipeline, PipelineContext};
use crate::application::hazard_feed::{FeedError, HazardFeed};
use crate::application::worker_pool::run_bounded;
use crate::domain::overlay::{DiscussionRecord, OverlayRecord, OverlaySource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DiscussionPipeline {
    feed: Arc<dyn HazardFeed>,
    interval_ms: i64,
    concurrency: usize,
}

impl DiscussionPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>, interval_ms: i64, concurrency: usize) -> Self {
        Self {
            feed,
            interval_ms,
            concurrency,
        }
    }
}

#[async_trait]
impl OverlayPipeline for DiscussionPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::Discussions
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let instants = ctx.range.sample_instants(self.interval_ms);
        let sample_count = instants.len();
        let feed = &self.feed;

        let outcome = run_bounded(instants, self.concurrency, |instant| async move {
            feed.discussions_at(instant).await
        })
        .await;

        if outcome.failures > 0 {
            tracing::debug!(
                failures = outcome.failures,
                samples = sample_count,
                "Skipped failed discussion samples"
            );
        }

        let merged = merge_reissues(outcome.results.into_iter().flatten());
        Ok(merged.into_iter().map(OverlayRecord::Discussion).collect())
    }
}

/// Keep one discussion per `(year, number)`: the one issued last.
pub fn merge_reissues(records: impl IntoIterator<Item = DiscussionRecord>) -> Vec<DiscussionRecord> {
    let mut latest: HashMap<(i32, u32), DiscussionRecord> = HashMap::new();
    for record in records {
        let key = (record.year, record.number);
        match latest.get(&key) {
            Some(existing) if existing.issue_ms >= record.issue_ms => {}
            _ => {
                latest.insert(key, record);
            }
        }
    }

    let mut merged: Vec<DiscussionRecord> = latest.into_values().collect();
    merged.sort_by_key(|d| (d.issue_ms, d.year, d.number));
    merged
}
