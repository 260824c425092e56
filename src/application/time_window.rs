// Time-window filter and frame-synchronised playback view
use crate::application::overlay_store::{OverlaySnapshot, OverlayStore};
use crate::domain::overlay::{OverlayRecord, OverlaySource, OverlaySourceState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Records of `state` to draw at playback time `t`.
///
/// Time-synced, time-bounded sources keep `issue <= t < expire`; unsynced
/// sources and sources without validity windows show everything. Hidden
/// sources show nothing.
pub fn visible_records(source: OverlaySource, state: &OverlaySourceState, t: i64) -> Vec<OverlayRecord> {
    if !state.visible {
        return Vec::new();
    }
    if !state.time_synced || !source.is_time_bounded() {
        return state.records.clone();
    }
    state
        .records
        .iter()
        .filter(|record| record.is_active_at(t))
        .cloned()
        .collect()
}

/// Visible subset of every source for one playback position.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleFrame {
    pub position: Option<i64>,
    pub generation: u64,
    /// Number of recomputations so far; positions arriving faster than the
    /// frame interval are coalesced and do not each bump this.
    pub recomputations: u64,
    pub overlays: BTreeMap<OverlaySource, Vec<OverlayRecord>>,
}

impl VisibleFrame {
    fn compute(snapshot: &OverlaySnapshot, position: Option<i64>, recomputations: u64) -> Self {
        let overlays = match position {
            Some(t) => snapshot
                .sources
                .iter()
                .map(|(source, state)| (*source, visible_records(*source, state, t)))
                .collect(),
            None => BTreeMap::new(),
        };
        Self {
            position,
            generation: snapshot.generation,
            recomputations,
            overlays,
        }
    }
}

/// Playback position input plus the throttled visible-overlay output.
#[derive(Clone)]
pub struct PlaybackSync {
    position_tx: Arc<watch::Sender<Option<i64>>>,
    frame_rx: watch::Receiver<VisibleFrame>,
}

impl PlaybackSync {
    /// Spawn the recompute task. It wakes on position or overlay changes,
    /// recomputes once from the latest values, then waits `frame_interval`
    /// so bursts collapse to their trailing value.
    pub fn spawn(store: &OverlayStore, frame_interval: Duration) -> (Self, JoinHandle<()>) {
        let (position_tx, mut position_rx) = watch::channel(None::<i64>);
        let (frame_tx, frame_rx) = watch::channel(VisibleFrame::default());
        let mut store_rx = store.subscribe();

        let handle = tokio::spawn(async move {
            let mut recomputations = 0u64;
            loop {
                tokio::select! {
                    changed = position_rx.changed() => if changed.is_err() { break },
                    changed = store_rx.changed() => if changed.is_err() { break },
                }

                let position = *position_rx.borrow_and_update();
                let snapshot = store_rx.borrow_and_update().clone();
                recomputations += 1;
                let frame = VisibleFrame::compute(&snapshot, position, recomputations);

                if frame_tx.send(frame).is_err() {
                    tracing::debug!("No playback subscribers left, stopping sync");
                    break;
                }
                tokio::time::sleep(frame_interval).await;
            }
        });

        (
            Self {
                position_tx: Arc::new(position_tx),
                frame_rx,
            },
            handle,
        )
    }

    pub fn set_position(&self, t: i64) {
        self.position_tx.send_replace(Some(t));
    }

    pub fn subscribe(&self) -> watch::Receiver<VisibleFrame> {
        self.frame_rx.clone()
    }

    pub fn current(&self) -> VisibleFrame {
        self.frame_rx.borrow().clone()
    }
}
