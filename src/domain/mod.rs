// Domain layer - Replay events, hazard overlays and surface data
pub mod event;
pub mod geo_index;
pub mod overlay;
pub mod surface;
pub mod timeline;
