// HTTP request handlers
use crate::application::orchestrator::LoadOutcome;
use crate::domain::event::EventRange;
use crate::domain::overlay::OverlaySource;
use crate::domain::timeline::Timeline;
use crate::infrastructure::chunked_json::stream_from_watch;
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRangeBody {
    pub start_ms: i64,
    pub end_ms: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPatch {
    pub visible: Option<bool>,
    pub time_synced: Option<bool>,
    pub opacity: Option<f32>,
}

#[derive(Deserialize)]
pub struct PlaybackPosition {
    pub t: i64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn respond<T: Serialize>(status: StatusCode, data: &T, headers: &HeaderMap) -> Response {
    match json_response(status, data, accepts_brotli(headers)).await {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}

async fn error(status: StatusCode, message: String, headers: &HeaderMap) -> Response {
    respond(status, &ErrorBody { error: message }, headers).await
}

fn parse_source(raw: &str) -> Result<OverlaySource, String> {
    raw.parse::<OverlaySource>()
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Load overlays for an event range
pub async fn load_event(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(body): Json<EventRangeBody>,
) -> Response {
    let range = match EventRange::new(body.start_ms, body.end_ms) {
        Ok(range) => range,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string(), &headers).await,
    };

    let outcome = state.overlay_service.load_event(range);
    let status = match outcome {
        LoadOutcome::Started { .. } => StatusCode::ACCEPTED,
        LoadOutcome::Unchanged => StatusCode::OK,
    };
    respond(status, &outcome, &headers).await
}

pub async fn unload_event(State(state): State<Arc<AppState>>) -> StatusCode {
    state.overlay_service.unload_event();
    StatusCode::NO_CONTENT
}

/// Replace the playback timeline; loads the range it spans
pub async fn set_timeline(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(timeline): Json<Timeline>,
) -> Response {
    let outcome = state.overlay_service.set_timeline(timeline);
    respond(StatusCode::OK, &outcome, &headers).await
}

pub async fn list_overlays(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    respond(StatusCode::OK, &state.overlay_service.snapshot(), &headers).await
}

/// Stream every store change (progressive loading)
pub async fn stream_overlays(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rx = state.overlay_service.store().subscribe();
    stream_from_watch(rx, accepts_brotli(&headers))
}

pub async fn get_overlay(
    Path(source): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match parse_source(&source) {
        Ok(source) => respond(StatusCode::OK, &state.overlay_service.overlay_state(source), &headers).await,
        Err(message) => error(StatusCode::NOT_FOUND, message, &headers).await,
    }
}

/// Update display preferences for one source
pub async fn patch_overlay(
    Path(source): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<DisplayPatch>,
) -> Response {
    let source = match parse_source(&source) {
        Ok(source) => source,
        Err(message) => return error(StatusCode::NOT_FOUND, message, &headers).await,
    };

    let store = state.overlay_service.store();
    if let Some(visible) = patch.visible {
        store.set_visible(source, visible);
    }
    if let Some(time_synced) = patch.time_synced {
        store.set_time_synced(source, time_synced);
    }
    if let Some(opacity) = patch.opacity {
        store.set_opacity(source, opacity);
    }
    tracing::debug!(%source, "Updated overlay display preferences");

    respond(StatusCode::OK, &store.state(source), &headers).await
}

pub async fn visible_overlay(
    Path(source): Path<String>,
    Query(position): Query<PlaybackPosition>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    match parse_source(&source) {
        Ok(source) => {
            let records = state.overlay_service.visible_records(source, position.t);
            respond(StatusCode::OK, &records, &headers).await
        }
        Err(message) => error(StatusCode::NOT_FOUND, message, &headers).await,
    }
}

pub async fn frame_site(
    Path(index): Path<usize>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let site = state.overlay_service.resolve_site_for_frame(index);
    respond(StatusCode::OK, &site, &headers).await
}

pub async fn handoff_markers(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    respond(StatusCode::OK, &state.overlay_service.handoff_markers(), &headers).await
}

pub async fn set_playback(
    State(state): State<Arc<AppState>>,
    Json(position): Json<PlaybackPosition>,
) -> StatusCode {
    state.playback.set_position(position.t);
    StatusCode::NO_CONTENT
}

/// Stream the throttled visible-overlay frames
pub async fn stream_playback(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    stream_from_watch(state.playback.subscribe(), accepts_brotli(&headers))
}
