// Application state for HTTP handlers
use crate::application::orchestrator::OverlayService;
use crate::application::time_window::PlaybackSync;

#[derive(Clone)]
pub struct AppState {
    pub overlay_service: OverlayService,
    pub playback: PlaybackSync,
}
