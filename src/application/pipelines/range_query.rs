// Single-shot range query pipelines: warnings, watches, local storm reports
use super::{OverlayPipeline, PipelineContext, dedup_by_id};
use crate::application::hazard_feed::{FeedError, HazardFeed};
use crate::domain::overlay::{OverlayRecord, OverlaySource};
use async_trait::async_trait;
use std::sync::Arc;

/// Phenomenon/significance pairs shown as warnings.
pub const WARNING_CODES: &[(&str, &str)] = &[
    ("TO", "W"),
    ("SV", "W"),
    ("FF", "W"),
    ("MA", "W"),
    ("EW", "W"),
];

pub const WATCH_TYPES: &[&str] = &["TOR", "SVR"];

/// Tornado, funnel, waterspout, hail, gust, wind damage, marine wind, flash flood.
pub const REPORT_TYPES: &[&str] = &["T", "C", "W", "H", "G", "D", "M", "F"];

/// How long a storm report stays on the map after its valid time.
pub const REPORT_DISPLAY_MS: i64 = 60 * 60 * 1000;

pub struct WarningsPipeline {
    feed: Arc<dyn HazardFeed>,
}

impl WarningsPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl OverlayPipeline for WarningsPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::Warnings
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let warnings = self.feed.warnings(ctx.range).await?;
        let fetched = warnings.len();

        let records: Vec<OverlayRecord> = warnings
            .into_iter()
            .filter(|w| {
                WARNING_CODES
                    .iter()
                    .any(|(p, s)| w.phenomena == *p && w.significance == *s)
            })
            .map(OverlayRecord::Warning)
            .collect();

        tracing::debug!(fetched, kept = records.len(), "Filtered warnings");
        Ok(dedup_by_id(records))
    }
}

pub struct WatchesPipeline {
    feed: Arc<dyn HazardFeed>,
}

impl WatchesPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl OverlayPipeline for WatchesPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::Watches
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let watches = self.feed.watches(ctx.range).await?;
        let records = watches
            .into_iter()
            .filter(|w| WATCH_TYPES.contains(&w.watch_type.as_str()))
            .map(OverlayRecord::Watch)
            .collect();
        Ok(dedup_by_id(records))
    }
}

pub struct ReportsPipeline {
    feed: Arc<dyn HazardFeed>,
}

impl ReportsPipeline {
    pub fn new(feed: Arc<dyn HazardFeed>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl OverlayPipeline for ReportsPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::Reports
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let reports = self.feed.storm_reports(ctx.range).await?;
        let mut records: Vec<OverlayRecord> = reports
            .into_iter()
            .filter(|r| REPORT_TYPES.contains(&r.type_code.as_str()))
            .map(|mut r| {
                r.expire_ms = r.valid_ms + REPORT_DISPLAY_MS;
                OverlayRecord::Report(r)
            })
            .collect();
        records.sort_by_key(|r| r.validity().map(|(issue, _)| issue));
        Ok(dedup_by_id(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{ScriptedFeed, report, warning, watch};
    use crate::domain::event::EventRange;

    fn ctx() -> PipelineContext {
        PipelineContext::new(EventRange::new(0, 10_000).unwrap(), vec![])
    }

    #[tokio::test]
    async fn test_warnings_keep_only_listed_codes() {
        let feed = ScriptedFeed {
            warnings: vec![
                warning(21, ("TO", "W"), 0, 100),
                warning(22, ("SV", "W"), 0, 100),
                warning(23, ("TO", "A"), 0, 100),
                warning(24, ("WS", "W"), 0, 100),
                warning(21, ("TO", "W"), 0, 100),
            ],
            ..Default::default()
        };
        let pipeline = WarningsPipeline::new(Arc::new(feed));

        let records = pipeline.resolve(&ctx()).await.unwrap();
        let ids: Vec<String> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["OUN-TO-W-0021-0", "OUN-SV-W-0022-0"]);
    }

    #[tokio::test]
    async fn test_watches_failure_propagates() {
        let mut feed = ScriptedFeed {
            watches: vec![watch(235, "TOR", 0, 100)],
            ..Default::default()
        };
        feed.failing.insert("watches");
        let pipeline = WatchesPipeline::new(Arc::new(feed));

        let err = pipeline.resolve(&ctx()).await.unwrap_err();
        assert!(matches!(err, FeedError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_malformed_upstream_body_fails_source() {
        let mut feed = ScriptedFeed::default();
        feed.bodies.insert(
            "warnings",
            r#"{"features": [{"properties": {"wfo": "OUN", "phenomena": "TO"}}]}"#.to_string(),
        );
        feed.bodies.insert("watches", r#"{"error": {"code": 500}}"#.to_string());
        feed.bodies.insert("reports", "{}".to_string());
        let feed = Arc::new(feed);

        let warnings = WarningsPipeline::new(feed.clone()).resolve(&ctx()).await;
        assert!(matches!(warnings, Err(FeedError::Malformed(_))));

        let watches = WatchesPipeline::new(feed.clone()).resolve(&ctx()).await;
        assert!(matches!(watches, Err(FeedError::Malformed(_))));

        let reports = ReportsPipeline::new(feed).resolve(&ctx()).await;
        assert!(matches!(reports, Err(FeedError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_watches_drop_unknown_types() {
        let feed = ScriptedFeed {
            watches: vec![watch(235, "TOR", 0, 100), watch(236, "PDS", 0, 100)],
            ..Default::default()
        };
        let records = WatchesPipeline::new(Arc::new(feed)).resolve(&ctx()).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_reports_get_display_window() {
        let feed = ScriptedFeed {
            reports: vec![report("T", 5_000), report("Z", 1_000), report("H", 2_000)],
            ..Default::default()
        };
        let records = ReportsPipeline::new(Arc::new(feed)).resolve(&ctx()).await.unwrap();

        let windows: Vec<Option<(i64, i64)>> = records.iter().map(|r| r.validity()).collect();
        assert_eq!(
            windows,
            vec![
                Some((2_000, 2_000 + REPORT_DISPLAY_MS)),
                Some((5_000, 5_000 + REPORT_DISPLAY_MS)),
            ]
        );
    }
}
