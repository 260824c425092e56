// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::orchestrator::OverlayService;
use crate::application::overlay_store::OverlayStore;
use crate::application::pipelines::build_pipelines;
use crate::application::station_cache::StationCache;
use crate::application::time_window::PlaybackSync;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::http_feed::HttpHazardFeed;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    frame_site, get_overlay, handoff_markers, health_check, list_overlays, load_event,
    patch_overlay, set_playback, set_timeline, stream_overlays, stream_playback, unload_event,
    visible_overlay,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Load configuration
    let config = load_app_config()?;

    // Create feed (infrastructure layer)
    let feed = Arc::new(HttpHazardFeed::new(
        config.endpoints.clone(),
        Duration::from_secs(config.fetch.request_timeout_secs),
    )?);

    // Create services (application layer)
    let pipelines = build_pipelines(feed, StationCache::new(), &config.fetch);
    let store = Arc::new(OverlayStore::new());
    let (playback, _playback_task) = PlaybackSync::spawn(
        &store,
        Duration::from_millis(config.playback.frame_interval_ms),
    );
    let overlay_service = OverlayService::new(store, pipelines, config.default_site.clone());

    let state = Arc::new(AppState {
        overlay_service,
        playback,
    });

    // Build router (presentation layer)
    // Compression is handled in the response builders, so no CompressionLayer here
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/event", post(load_event).delete(unload_event))
        .route("/timeline", put(set_timeline))
        .route("/overlays", get(list_overlays))
        .route("/overlays/stream", get(stream_overlays))
        .route("/overlays/:source", get(get_overlay).patch(patch_overlay))
        .route("/overlays/:source/visible", get(visible_overlay))
        .route("/frames/handoffs", get(handoff_markers))
        .route("/frames/:index/site", get(frame_site))
        .route("/playback", post(set_playback))
        .route("/playback/stream", get(stream_playback))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.server.listen_addr))?;
    tracing::info!(%addr, "Starting hazard-overlay-sync service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
