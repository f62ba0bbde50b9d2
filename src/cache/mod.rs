use bevy::prelude::*;
use lru::LruCache;
use std::sync::{Arc, Mutex};
use std::num::NonZeroUsize;
use crate::params::ParameterSet;
use crate::scoring::ScoreResult;
use crate::station::AntennaId;

#[derive(Hash, PartialEq, Eq, Clone, Debug)]
pub struct CoverageKey {
    pub antenna_id: AntennaId,
    pub endpoint_id: String,
    pub params_fingerprint: String,
}

impl CoverageKey {
    pub fn new(antenna_id: AntennaId, endpoint_id: &str, params: &ParameterSet) -> Self {
        Self {
            antenna_id,
            endpoint_id: endpoint_id.to_string(),
            params_fingerprint: params.fingerprint(),
        }
    }
}

#[derive(Resource, Default, Debug, Clone, Copy, PartialEq)]
pub struct CoverageMetrics {
    pub computed: u32,
    pub cache_hits: u32,
}

/// Per-antenna coverage answers for the "show all coverages" view. Keyed by
/// the exact parameter values, so an edit is a miss rather than a stale hit.
#[derive(Resource, Clone)]
pub struct CoverageCache {
    cache: Arc<Mutex<LruCache<CoverageKey, ScoreResult>>>,
}

impl Default for CoverageCache {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl CoverageCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, key: &CoverageKey) -> Option<ScoreResult> {
        let mut cache = self.cache.lock().ok()?;
        cache.get(key).copied()
    }

    pub fn insert(&self, key: CoverageKey, score: ScoreResult) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, score);
        }
    }

    /// Forget everything cached for one antenna (e.g. after it is removed).
    pub fn evict_antenna(&self, antenna_id: AntennaId) {
        if let Ok(mut cache) = self.cache.lock() {
            let stale: Vec<CoverageKey> = cache
                .iter()
                .filter(|(k, _)| k.antenna_id == antenna_id)
                .map(|(k, _)| k.clone())
                .collect();
            for key in stale {
                cache.pop(&key);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
