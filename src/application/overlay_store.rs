// Overlay state store - the single writable home for fetched overlay data
use crate::domain::event::EventRange;
use crate::domain::overlay::{OverlayRecord, OverlaySource, OverlaySourceState};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySnapshot {
    /// Bumped on every load or unload; writes tagged with an older value are stale.
    pub generation: u64,
    pub range: Option<EventRange>,
    pub sources: BTreeMap<OverlaySource, OverlaySourceState>,
}

impl OverlaySnapshot {
    fn empty() -> Self {
        Self {
            generation: 0,
            range: None,
            sources: OverlaySource::ALL
                .into_iter()
                .map(|source| (source, OverlaySourceState::new(source)))
                .collect(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.sources.values().any(|state| state.loading)
    }

    pub fn state(&self, source: OverlaySource) -> OverlaySourceState {
        self.sources
            .get(&source)
            .cloned()
            .unwrap_or_else(|| OverlaySourceState::new(source))
    }
}

/// Holds per-source state and publishes every change to subscribers.
pub struct OverlayStore {
    tx: watch::Sender<OverlaySnapshot>,
}

impl Default for OverlayStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(OverlaySnapshot::empty());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<OverlaySnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        self.tx.borrow().clone()
    }

    pub fn state(&self, source: OverlaySource) -> OverlaySourceState {
        self.tx.borrow().state(source)
    }

    /// Start a new generation for `range`: clear every source and mark the
    /// launched ones as loading. Returns the new generation.
    pub fn begin_generation(&self, range: EventRange, loading: &[OverlaySource]) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.range = Some(range);
            for (source, state) in snapshot.sources.iter_mut() {
                state.reset();
                state.loading = loading.contains(source);
            }
            generation = snapshot.generation;
        });
        generation
    }

    /// Forget the loaded event; any run still in flight becomes stale.
    pub fn clear(&self) {
        self.tx.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.range = None;
            for state in snapshot.sources.values_mut() {
                state.reset();
            }
        });
    }

    /// Record a pipeline outcome and clear its loading flag.
    ///
    /// Returns `false` and leaves the store untouched when `generation` is stale.
    pub fn settle(
        &self,
        generation: u64,
        source: OverlaySource,
        outcome: Result<Vec<OverlayRecord>, String>,
    ) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            let state = snapshot
                .sources
                .entry(source)
                .or_insert_with(|| OverlaySourceState::new(source));
            state.loading = false;
            match outcome {
                Ok(records) => {
                    state.records = records;
                    state.error = None;
                }
                Err(message) => {
                    state.records.clear();
                    state.error = Some(message);
                }
            }
            true
        })
    }

    pub fn set_visible(&self, source: OverlaySource, visible: bool) {
        self.update_display(source, |state| state.visible = visible);
    }

    pub fn set_time_synced(&self, source: OverlaySource, time_synced: bool) {
        self.update_display(source, |state| state.time_synced = time_synced);
    }

    pub fn set_opacity(&self, source: OverlaySource, opacity: f32) {
        let opacity = if opacity.is_nan() { 1.0 } else { opacity.clamp(0.0, 1.0) };
        self.update_display(source, |state| state.opacity = opacity);
    }

    fn update_display(&self, source: OverlaySource, apply: impl FnOnce(&mut OverlaySourceState)) {
        self.tx.send_modify(|snapshot| {
            let state = snapshot
                .sources
                .entry(source)
                .or_insert_with(|| OverlaySourceState::new(source));
            apply(state);
        });
    }
}
