// Application layer - Overlay orchestration, fetch pipelines and playback sync
pub mod hazard_feed;
pub mod orchestrator;
pub mod overlay_store;
pub mod pipelines;
pub mod station_cache;
pub mod time_window;
pub mod worker_pool;

#[cfg(test)]
pub mod test_support;
