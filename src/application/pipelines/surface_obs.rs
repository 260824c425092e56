// Surface observation pipeline - spatial station discovery, then bounded station-day fetches
use super::{OverlayPipeline, PipelineContext};
use crate::application::hazard_feed::{FeedError, HazardFeed};
use crate::application::station_cache::StationCache;
use crate::application::worker_pool::run_bounded;
use crate::domain::geo_index::{haversine_km, networks_within};
use crate::domain::overlay::{OverlayRecord, OverlaySource};
use crate::domain::surface::{AsosStation, SurfaceObservation};
use crate::domain::timeline::RadarSite;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

/// A report stops being "current" after this long without a newer one.
pub const OBS_STALE_MS: i64 = 90 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct StationSearch {
    pub radius_km: f64,
    pub max_stations: usize,
}

pub struct SurfaceObsPipeline {
    feed: Arc<dyn HazardFeed>,
    cache: StationCache,
    search: StationSearch,
    concurrency: usize,
}

impl SurfaceObsPipeline {
    pub fn new(
        feed: Arc<dyn HazardFeed>,
        cache: StationCache,
        search: StationSearch,
        concurrency: usize,
    ) -> Self {
        Self {
            feed,
            cache,
            search,
            concurrency,
        }
    }

    /// Phase 1: stations within the search radius of every site, deduplicated.
    async fn discover_stations(&self, sites: &[RadarSite]) -> Result<Vec<AsosStation>, FeedError> {
        let mut stations: Vec<AsosStation> = Vec::new();
        let mut seen = HashSet::new();
        let mut attempted = 0;
        let mut failed = 0;

        for site in sites {
            let networks = networks_within(site.lat, site.lon, self.search.radius_km);
            let mut candidates: Vec<(f64, AsosStation)> = Vec::new();

            for network in networks {
                if !self.cache.contains(network) {
                    attempted += 1;
                    match self.feed.station_network(network).await {
                        Ok(list) => {
                            self.cache.insert_if_absent(network, list);
                        }
                        Err(e) => {
                            failed += 1;
                            tracing::warn!(network, error = %e, "Station network fetch failed");
                            continue;
                        }
                    }
                }

                let Some(list) = self.cache.get(network) else { continue };
                candidates.extend(list.iter().filter_map(|station| {
                    let distance = haversine_km(site.lat, site.lon, station.lat, station.lon);
                    (distance <= self.search.radius_km).then(|| (distance, station.clone()))
                }));
            }

            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut kept = 0;
            for (_, station) in candidates {
                if kept == self.search.max_stations {
                    break;
                }
                if !seen.insert(station.id.clone()) {
                    continue;
                }
                kept += 1;
                stations.push(station);
            }
            tracing::debug!(site = %site.id, kept, "Discovered surface stations");
        }

        if attempted > 0 && failed == attempted && stations.is_empty() {
            return Err(FeedError::Pipeline(format!(
                "all {} station network requests failed",
                attempted
            )));
        }
        Ok(stations)
    }
}

#[async_trait]
impl OverlayPipeline for SurfaceObsPipeline {
    fn source(&self) -> OverlaySource {
        OverlaySource::SurfaceObs
    }

    async fn resolve(&self, ctx: &PipelineContext) -> Result<Vec<OverlayRecord>, FeedError> {
        let stations = self.discover_stations(&ctx.sites).await?;
        if stations.is_empty() {
            return Ok(Vec::new());
        }

        // Phase 2: every (station, day) pair through the bounded pool.
        let days = ctx.range.calendar_days();
        let jobs: Vec<(AsosStation, chrono::NaiveDate)> = stations
            .iter()
            .flat_map(|station| days.iter().map(move |day| (station.clone(), *day)))
            .collect();
        let job_count = jobs.len();
        let feed = &self.feed;

        let outcome = run_bounded(jobs, self.concurrency, |(station, day)| async move {
            feed.station_day(&station, day).await
        })
        .await;

        tracing::debug!(
            jobs = job_count,
            failed = outcome.failures,
            "Fetched station-day histories"
        );

        let observations = finalize_observations(outcome.results.into_iter().flatten());
        Ok(observations.into_iter().map(OverlayRecord::Observation).collect())
    }
}

/// Deduplicate by `(station, time)`, sort by station then time, and close each
/// report's window at the station's next report or after [`OBS_STALE_MS`].
pub fn finalize_observations(
    observations: impl IntoIterator<Item = SurfaceObservation>,
) -> Vec<SurfaceObservation> {
    let mut sorted: Vec<SurfaceObservation> = observations.into_iter().collect();
    sorted.sort_by(|a, b| {
        a.station
            .cmp(&b.station)
            .then(a.utc_valid_ms.cmp(&b.utc_valid_ms))
    });
    sorted.dedup_by(|b, a| a.station == b.station && a.utc_valid_ms == b.utc_valid_ms);

    let next_times: Vec<Option<i64>> = sorted
        .iter()
        .enumerate()
        .map(|(i, ob)| {
            sorted
                .get(i + 1)
                .filter(|next| next.station == ob.station)
                .map(|next| next.utc_valid_ms)
        })
        .collect();

    for (ob, next) in sorted.iter_mut().zip(next_times) {
        let stale_at = ob.utc_valid_ms + OBS_STALE_MS;
        ob.valid_until_ms = next.map_or(stale_at, |next| next.min(stale_at));
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{ScriptedFeed, observation, station};
    use crate::domain::event::EventRange;
    use chrono::NaiveDate;

    const MAY_20_18Z: i64 = 1_369_072_800_000;
    const MAY_21_02Z: i64 = 1_369_101_600_000;

    fn ktlx() -> RadarSite {
        RadarSite {
            id: "KTLX".to_string(),
            lat: 35.33,
            lon: -97.28,
            timezone: "America/Chicago".to_string(),
        }
    }

    fn search() -> StationSearch {
        StationSearch {
            radius_km: 150.0,
            max_stations: 40,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2013, 5, d).unwrap()
    }

    fn scripted() -> ScriptedFeed {
        let mut feed = ScriptedFeed::default();
        feed.networks.insert(
            "OK_ASOS".to_string(),
            vec![
                station("OKC", "OK_ASOS", 35.39, -97.60),
                station("OUN", "OK_ASOS", 35.25, -97.47),
                // Boise City, far outside the radius.
                station("BCS", "OK_ASOS", 36.77, -102.51),
            ],
        );
        // The Texas partition also lists a station with a duplicate id.
        feed.networks.insert(
            "TX_ASOS".to_string(),
            vec![
                station("OUN", "TX_ASOS", 35.25, -97.47),
                station("RRV", "TX_ASOS", 34.25, -97.45),
            ],
        );
        feed
    }

    #[tokio::test]
    async fn test_discovery_filters_sorts_and_dedups() {
        let feed = Arc::new(scripted());
        let pipeline = SurfaceObsPipeline::new(feed, StationCache::new(), search(), 5);

        let stations = pipeline.discover_stations(&[ktlx()]).await.unwrap();
        let ids: Vec<&str> = stations.iter().map(|s| s.id.as_str()).collect();

        assert_eq!(ids.iter().filter(|id| **id == "OUN").count(), 1);
        assert!(!ids.contains(&"BCS"));
        assert_eq!(ids[0], "OUN");
        assert!(ids.contains(&"RRV"));
    }

    #[tokio::test]
    async fn test_cached_networks_are_not_refetched() {
        let feed = Arc::new(scripted());
        let cache = StationCache::new();
        let pipeline = SurfaceObsPipeline::new(feed.clone(), cache.clone(), search(), 5);

        pipeline.discover_stations(&[ktlx()]).await.unwrap();
        let first = feed.calls("networks");
        pipeline.discover_stations(&[ktlx()]).await.unwrap();

        assert!(first > 0);
        assert_eq!(feed.calls("networks"), first);
        assert!(cache.contains("OK_ASOS"));
    }

    #[tokio::test]
    async fn test_caps_station_count() {
        let feed = Arc::new(scripted());
        let capped = StationSearch {
            radius_km: 150.0,
            max_stations: 1,
        };
        let pipeline = SurfaceObsPipeline::new(feed, StationCache::new(), capped, 5);

        let stations = pipeline.discover_stations(&[ktlx()]).await.unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].id, "OUN");
    }

    #[tokio::test]
    async fn test_all_network_failures_fail_source() {
        let mut feed = scripted();
        feed.failing.insert("networks");
        let pipeline = SurfaceObsPipeline::new(Arc::new(feed), StationCache::new(), search(), 5);

        let ctx = PipelineContext::new(EventRange::new(MAY_20_18Z, MAY_21_02Z).unwrap(), vec![ktlx()]);
        assert!(matches!(
            pipeline.resolve(&ctx).await,
            Err(FeedError::Pipeline(_))
        ));
    }

    #[tokio::test]
    async fn test_station_days_cross_product_and_silent_drops() {
        let mut feed = scripted();
        let first = MAY_20_18Z;
        let second = MAY_20_18Z + 20 * 60_000;
        feed.observations.insert(
            ("OKC".to_string(), day(20)),
            vec![observation("OKC", second, Some(80.0)), observation("OKC", first, None)],
        );
        feed.observations.insert(
            ("OKC".to_string(), day(21)),
            vec![observation("OKC", second, Some(80.0))],
        );
        feed.observations.insert(
            ("OUN".to_string(), day(20)),
            vec![observation("OUN", first, Some(79.0))],
        );
        // RRV has no history at all and is dropped silently.
        let feed = Arc::new(feed);
        let pipeline = SurfaceObsPipeline::new(feed.clone(), StationCache::new(), search(), 5);

        let ctx = PipelineContext::new(EventRange::new(MAY_20_18Z, MAY_21_02Z).unwrap(), vec![ktlx()]);
        let records = pipeline.resolve(&ctx).await.unwrap();

        // Three stations across two days.
        assert_eq!(feed.calls("station_day"), 6);
        let ids: Vec<String> = records.iter().map(|r| r.id()).collect();
        assert_eq!(
            ids,
            vec![
                format!("OKC-{}", first),
                format!("OKC-{}", second),
                format!("OUN-{}", first),
            ]
        );
    }

    #[test]
    fn test_validity_closes_at_next_report_or_stale() {
        let obs = finalize_observations(vec![
            observation("OKC", 0, None),
            observation("OKC", 20 * 60_000, None),
            observation("OUN", 0, None),
        ]);

        assert_eq!(obs[0].valid_until_ms, 20 * 60_000);
        assert_eq!(obs[1].valid_until_ms, 20 * 60_000 + OBS_STALE_MS);
        assert_eq!(obs[2].valid_until_ms, OBS_STALE_MS);
        // A missing reading stays missing.
        assert_eq!(obs[0].tmpf, None);
    }
}
