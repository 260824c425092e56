// Process-wide station network cache
use crate::domain::surface::AsosStation;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Station lists keyed by network, shared read-only by every event load.
///
/// Entries are only ever inserted if absent; nothing is evicted or replaced.
#[derive(Clone, Default)]
pub struct StationCache {
    networks: Arc<RwLock<HashMap<String, Arc<Vec<AsosStation>>>>>,
}

impl StationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network: &str) -> Option<Arc<Vec<AsosStation>>> {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(network)
            .cloned()
    }

    pub fn contains(&self, network: &str) -> bool {
        self.networks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(network)
    }

    /// Insert the list unless the network is already cached; returns the cached list.
    pub fn insert_if_absent(&self, network: &str, stations: Vec<AsosStation>) -> Arc<Vec<AsosStation>> {
        self.networks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(network.to_string())
            .or_insert_with(|| Arc::new(stations))
            .clone()
    }
}
