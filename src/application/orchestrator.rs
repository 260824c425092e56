// Overlay orchestration - detects event range changes and runs every pipeline
use crate::application::overlay_store::{OverlaySnapshot, OverlayStore};
use crate::application::pipelines::{OverlayPipeline, PipelineContext};
use crate::application::time_window::visible_records;
use crate::domain::event::EventRange;
use crate::domain::overlay::{OverlayRecord, OverlaySource, OverlaySourceState};
use crate::domain::timeline::{RadarSite, Timeline};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::task::{JoinHandle, JoinSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Started { generation: u64 },
    Unchanged,
}

#[derive(Default)]
struct RunState {
    /// Range and active site ids of the last load
    last_load: Option<(EventRange, Vec<String>)>,
    in_flight: Option<JoinHandle<()>>,
}

/// Owns the decision to (re)fetch overlays and exposes the consumer API.
#[derive(Clone)]
pub struct OverlayService {
    store: Arc<OverlayStore>,
    pipelines: Arc<Vec<Arc<dyn OverlayPipeline>>>,
    timeline: Arc<RwLock<Timeline>>,
    run: Arc<Mutex<RunState>>,
}

impl OverlayService {
    pub fn new(
        store: Arc<OverlayStore>,
        pipelines: Vec<Arc<dyn OverlayPipeline>>,
        default_site: RadarSite,
    ) -> Self {
        Self {
            store,
            pipelines: Arc::new(pipelines),
            timeline: Arc::new(RwLock::new(Timeline::single_site(default_site))),
            run: Arc::new(Mutex::new(RunState::default())),
        }
    }

    pub fn store(&self) -> &Arc<OverlayStore> {
        &self.store
    }

    /// Start a fetch run for `range` unless the same range is already loaded
    /// around the same radar sites.
    ///
    /// A run still in flight for an older range is aborted and its late
    /// writes are rejected by the store's generation check.
    pub fn load_event(&self, range: EventRange) -> LoadOutcome {
        let sites = self.sites();
        let load_key = (range, sites.iter().map(|site| site.id.clone()).collect::<Vec<_>>());
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.last_load.as_ref() == Some(&load_key) {
            tracing::debug!(?range, "Event range and sites unchanged, skipping fetch");
            return LoadOutcome::Unchanged;
        }

        if let Some(previous) = run.in_flight.take() {
            if !previous.is_finished() {
                tracing::info!("Superseding in-flight overlay run");
                previous.abort();
            }
        }
        run.last_load = Some(load_key);

        let sources: Vec<OverlaySource> = self.pipelines.iter().map(|p| p.source()).collect();
        let generation = self.store.begin_generation(range, &sources);
        let ctx = PipelineContext::new(range, sites);

        tracing::info!(
            generation,
            start_ms = range.start_ms,
            end_ms = range.end_ms,
            convective_day = %ctx.convective_day,
            "Loading overlays for event"
        );

        run.in_flight = Some(tokio::spawn(run_pipelines(
            generation,
            ctx,
            self.pipelines.clone(),
            self.store.clone(),
        )));
        LoadOutcome::Started { generation }
    }

    /// Clear all overlay state and forget the range so a reload fetches again.
    pub fn unload_event(&self) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = run.in_flight.take() {
            previous.abort();
        }
        run.last_load = None;
        self.store.clear();
        tracing::info!("Overlay state cleared");
    }

    /// Replace the timeline and load (or unload) the event range it spans.
    pub fn set_timeline(&self, timeline: Timeline) -> Option<LoadOutcome> {
        let range = timeline.event_range();
        *self.timeline.write().unwrap_or_else(PoisonError::into_inner) = timeline;
        match range {
            Some(range) => Some(self.load_event(range)),
            None => {
                self.unload_event();
                None
            }
        }
    }

    pub fn overlay_state(&self, source: OverlaySource) -> OverlaySourceState {
        self.store.state(source)
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.store.snapshot()
    }

    pub fn visible_records(&self, source: OverlaySource, t: i64) -> Vec<OverlayRecord> {
        visible_records(source, &self.store.state(source), t)
    }

    pub fn resolve_site_for_frame(&self, frame_index: usize) -> RadarSite {
        self.timeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .site_for_frame(frame_index)
            .clone()
    }

    pub fn handoff_markers(&self) -> Vec<usize> {
        self.timeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handoff_markers()
    }

    /// Resolves once no source is loading.
    pub async fn settled(&self) -> OverlaySnapshot {
        let mut rx = self.store.subscribe();
        match rx.wait_for(|snapshot| !snapshot.is_loading()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.store.snapshot(),
        }
    }

    fn sites(&self) -> Vec<RadarSite> {
        self.timeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active_sites()
    }
}

/// Run every pipeline in its own task and settle each source as it finishes.
async fn run_pipelines(
    generation: u64,
    ctx: PipelineContext,
    pipelines: Arc<Vec<Arc<dyn OverlayPipeline>>>,
    store: Arc<OverlayStore>,
) {
    let started = Instant::now();
    let ctx = Arc::new(ctx);
    let mut pending: BTreeSet<OverlaySource> = BTreeSet::new();
    let mut tasks = JoinSet::new();

    for pipeline in pipelines.iter().cloned() {
        let ctx = ctx.clone();
        pending.insert(pipeline.source());
        tasks.spawn(async move {
            let source = pipeline.source();
            let started = Instant::now();
            let result = pipeline.resolve(&ctx).await;
            (source, result, started.elapsed())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((source, result, elapsed)) => {
                pending.remove(&source);
                let outcome = match result {
                    Ok(records) => {
                        tracing::info!(
                            generation,
                            %source,
                            count = records.len(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Overlay source loaded"
                        );
                        Ok(records)
                    }
                    Err(e) => {
                        tracing::warn!(generation, %source, error = %e, "Overlay source failed");
                        Err(e.to_string())
                    }
                };
                if !store.settle(generation, source, outcome) {
                    tracing::debug!(generation, %source, "Discarded stale overlay result");
                }
            }
            Err(join_err) => {
                tracing::error!(generation, error = %join_err, "Overlay pipeline task panicked");
            }
        }
    }

    // Sources whose task died without reporting still need their flag cleared.
    for source in pending {
        store.settle(generation, source, Err(format!("{} pipeline aborted", source)));
    }

    tracing::info!(
        generation,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Overlay run settled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipelines::build_pipelines;
    use crate::application::station_cache::StationCache;
    use crate::application::test_support::{
        ScriptedFeed, damage_track, discussion, observation, outlook, report, station, warning,
        watch,
    };
    use crate::application::hazard_feed::{DamagePage, FeedError};
    use crate::domain::timeline::Segment;
    use crate::infrastructure::config::FetchSettings;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::time::Duration;

    const START: i64 = 1_369_072_800_000; // 2013-05-20T18:00Z
    const END: i64 = 1_369_083_600_000; // 2013-05-20T21:00Z

    fn ktlx() -> RadarSite {
        RadarSite {
            id: "KTLX".to_string(),
            lat: 35.33,
            lon: -97.28,
            timezone: "America/Chicago".to_string(),
        }
    }

    fn populated_feed() -> ScriptedFeed {
        let mut feed = ScriptedFeed {
            warnings: vec![warning(21, ("TO", "W"), START, END)],
            watches: vec![watch(235, "TOR", START, END)],
            reports: vec![report("T", START + 60_000)],
            discussions: vec![discussion(734, START - 60_000, END)],
            damage_pages: vec![Ok(DamagePage {
                records: vec![damage_track("moore")],
                exceeded_transfer_limit: false,
            })],
            ..Default::default()
        };
        feed.outlooks.insert(2000, Ok(vec![outlook(2000, "HIGH")]));
        feed.networks.insert(
            "OK_ASOS".to_string(),
            vec![station("OKC", "OK_ASOS", 35.39, -97.60)],
        );
        feed.observations.insert(
            ("OKC".to_string(), NaiveDate::from_ymd_opt(2013, 5, 20).unwrap()),
            vec![observation("OKC", START, Some(82.0))],
        );
        feed
    }

    fn service_with(feed: Arc<ScriptedFeed>) -> OverlayService {
        let pipelines = build_pipelines(feed, StationCache::new(), &FetchSettings::default());
        OverlayService::new(Arc::new(OverlayStore::new()), pipelines, ktlx())
    }

    fn range() -> EventRange {
        EventRange::new(START, END).unwrap()
    }

    #[tokio::test]
    async fn test_same_range_fetches_once() {
        let feed = Arc::new(populated_feed());
        let service = service_with(feed.clone());

        assert!(matches!(service.load_event(range()), LoadOutcome::Started { .. }));
        service.settled().await;
        assert_eq!(service.load_event(range()), LoadOutcome::Unchanged);
        service.settled().await;

        assert_eq!(feed.calls("warnings"), 1);
        assert_eq!(feed.calls("watches"), 1);
        assert_eq!(feed.calls("reports"), 1);
        assert_eq!(feed.calls("damage"), 1);
    }

    #[tokio::test]
    async fn test_reload_after_unload_fetches_again() {
        let feed = Arc::new(populated_feed());
        let service = service_with(feed.clone());

        service.load_event(range());
        service.settled().await;
        service.unload_event();
        assert!(service.overlay_state(OverlaySource::Warnings).records.is_empty());

        assert!(matches!(service.load_event(range()), LoadOutcome::Started { .. }));
        service.settled().await;
        assert_eq!(feed.calls("warnings"), 2);
    }

    #[tokio::test]
    async fn test_watches_failure_is_isolated() {
        let mut feed = populated_feed();
        feed.failing.insert("watches");
        let service = service_with(Arc::new(feed));

        service.load_event(range());
        let snapshot = service.settled().await;

        let watches = snapshot.state(OverlaySource::Watches);
        assert!(!watches.loading);
        assert!(watches.records.is_empty());
        assert!(watches.error.as_deref().unwrap_or_default().contains("503"));

        for source in [
            OverlaySource::Warnings,
            OverlaySource::Discussions,
            OverlaySource::Outlooks,
            OverlaySource::Reports,
            OverlaySource::SurfaceObs,
            OverlaySource::DamageTracks,
        ] {
            let state = snapshot.state(source);
            assert!(!state.loading, "{} still loading", source);
            assert!(state.error.is_none(), "{} errored: {:?}", source, state.error);
            assert!(!state.records.is_empty(), "{} has no records", source);
        }
    }

    #[tokio::test]
    async fn test_new_range_supersedes_running_load() {
        let feed = Arc::new(ScriptedFeed {
            warnings: vec![warning(21, ("TO", "W"), START, END)],
            delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let service = service_with(feed.clone());

        let first = service.load_event(range());
        let later = EventRange::new(START + 3_600_000, END + 3_600_000).unwrap();
        let second = service.load_event(later);

        assert_eq!(first, LoadOutcome::Started { generation: 1 });
        assert_eq!(second, LoadOutcome::Started { generation: 2 });

        let snapshot = service.settled().await;
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.range, Some(later));
        assert_eq!(snapshot.state(OverlaySource::Warnings).records.len(), 1);
    }

    struct PanickingPipeline;

    #[async_trait]
    impl OverlayPipeline for PanickingPipeline {
        fn source(&self) -> OverlaySource {
            OverlaySource::Watches
        }

        async fn resolve(&self, _ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
            panic!("parser bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_pipeline_still_clears_loading() {
        let service = OverlayService::new(
            Arc::new(OverlayStore::new()),
            vec![Arc::new(PanickingPipeline)],
            ktlx(),
        );

        service.load_event(range());
        let snapshot = service.settled().await;
        let watches = snapshot.state(OverlaySource::Watches);
        assert!(!watches.loading);
        assert!(watches.error.is_some());
    }

    #[tokio::test]
    async fn test_timeline_drives_loading_and_site_resolution() {
        let feed = Arc::new(populated_feed());
        let service = service_with(feed.clone());

        let mut kinx = ktlx();
        kinx.id = "KINX".to_string();
        let timeline = Timeline {
            frames: vec![START, START + 1_000, END],
            segments: vec![
                Segment {
                    id: "a".to_string(),
                    site: ktlx(),
                    start_ms: START,
                    end_ms: START + 999,
                },
                Segment {
                    id: "b".to_string(),
                    site: kinx,
                    start_ms: START + 1_000,
                    end_ms: END,
                },
            ],
            selected_site: ktlx(),
        };

        assert!(matches!(service.set_timeline(timeline), Some(LoadOutcome::Started { .. })));
        service.settled().await;

        assert_eq!(service.resolve_site_for_frame(0).id, "KTLX");
        assert_eq!(service.resolve_site_for_frame(1).id, "KINX");
        assert_eq!(service.handoff_markers(), vec![1, 2]);

        let empty = Timeline::single_site(ktlx());
        assert_eq!(service.set_timeline(empty), None);
        assert_eq!(service.snapshot().range, None);
    }

    #[tokio::test]
    async fn test_same_range_with_new_sites_reloads() {
        let feed = Arc::new(populated_feed());
        let service = service_with(feed.clone());

        let single = Timeline {
            frames: vec![START, END],
            segments: Vec::new(),
            selected_site: ktlx(),
        };
        assert!(matches!(service.set_timeline(single.clone()), Some(LoadOutcome::Started { .. })));
        service.settled().await;
        assert_eq!(service.set_timeline(single), Some(LoadOutcome::Unchanged));

        let mut kinx = ktlx();
        kinx.id = "KINX".to_string();
        let multi = Timeline {
            frames: vec![START, END],
            segments: vec![Segment {
                id: "b".to_string(),
                site: kinx,
                start_ms: START,
                end_ms: END,
            }],
            selected_site: ktlx(),
        };
        assert!(matches!(service.set_timeline(multi), Some(LoadOutcome::Started { generation: 2 })));
        service.settled().await;
        assert_eq!(feed.calls("warnings"), 2);
    }

    #[tokio::test]
    async fn test_visible_records_follow_playback_time() {
        let feed = Arc::new(populated_feed());
        let service = service_with(feed);
        service.load_event(range());
        service.settled().await;

        assert_eq!(service.visible_records(OverlaySource::Warnings, START).len(), 1);
        assert!(service.visible_records(OverlaySource::Warnings, END).is_empty());
        // Damage tracks ignore time entirely.
        assert_eq!(service.visible_records(OverlaySource::DamageTracks, 0).len(), 1);
    }
}
