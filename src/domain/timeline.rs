// Timeline domain model - frames, radar sites and multi-site segments
use serde::{Deserialize, Serialize};

use super::event::EventRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadarSite {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// IANA zone name used for local-time labels.
    pub timezone: String,
}

/// A sub-range of the event attributed to one radar site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub site: RadarSite,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Ordered frame timestamps plus the segments that own them.
///
/// Produced by the playback engine; segments are ordered and non-overlapping
/// but may be contiguous or gapped. An empty segment list means single-site mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub frames: Vec<i64>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub selected_site: RadarSite,
}

impl Timeline {
    pub fn single_site(site: RadarSite) -> Self {
        Self {
            frames: Vec::new(),
            segments: Vec::new(),
            selected_site: site,
        }
    }

    pub fn event_range(&self) -> Option<EventRange> {
        let start = *self.frames.iter().min()?;
        let end = *self.frames.iter().max()?;
        EventRange::new(start, end).ok()
    }

    /// Site authoritative for the frame, falling back to the selected site.
    pub fn site_for_frame(&self, frame_index: usize) -> &RadarSite {
        self.frames
            .get(frame_index)
            .map(|t| self.site_at(*t))
            .unwrap_or(&self.selected_site)
    }

    /// The last segment starting at or before `t` owns it when `t` is within its
    /// recorded end, so a shared boundary belongs to the later segment.
    pub fn site_at(&self, t: i64) -> &RadarSite {
        self.segments
            .iter()
            .rev()
            .find(|segment| segment.start_ms <= t)
            .filter(|segment| t <= segment.end_ms)
            .map(|segment| &segment.site)
            .unwrap_or(&self.selected_site)
    }

    /// Frame index of the first frame at or after each segment's end boundary.
    pub fn handoff_markers(&self) -> Vec<usize> {
        let mut markers: Vec<usize> = self
            .segments
            .iter()
            .filter_map(|segment| self.frames.iter().position(|t| *t >= segment.end_ms))
            .collect();
        markers.dedup();
        markers
    }

    /// Sites surface observations are discovered around, one per distinct site.
    pub fn active_sites(&self) -> Vec<RadarSite> {
        if self.segments.is_empty() {
            return vec![self.selected_site.clone()];
        }

        let mut sites: Vec<RadarSite> = Vec::new();
        for segment in &self.segments {
            if !sites.iter().any(|s| s.id == segment.site.id) {
                sites.push(segment.site.clone());
            }
        }
        sites
    }
}
