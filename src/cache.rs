//! Plan cache - bounded LRU over compiled plans
//!
//! Compilation is deterministic, so identical requests reuse one shared
//! [`CompiledPlan`]. Condition transforms are opaque callables; they enter
//! the key by identity, meaning a freshly built closure with the same body
//! still misses. Callers who want hits hold onto their condition values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::LoadOptions;
use crate::plan::CompiledPlan;

/// Default maximum number of cached plans
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Cache key: everything compilation output depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey {
    pub root: String,
    pub loads: Vec<String>,
    pub options: LoadOptions,
    pub base_sql: String,
    /// Condition transforms by path and pointer identity
    pub condition_ids: Vec<(String, usize)>,
}

/// Counters exposed by [`PlanCache::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; zero before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<PlanCacheKey, (Arc<CompiledPlan>, u64)>,
    tick: u64,
    hits: u64,
    misses: u64,
    stores: u64,
    evictions: u64,
}

/// Bounded LRU cache of compiled plans
///
/// Interior mutability behind a single mutex; lookups are cheap relative to
/// compilation, so contention is not a concern here.
#[derive(Debug)]
pub struct PlanCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl PlanCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Look up a plan, refreshing its recency on a hit
    pub fn get(&self, key: &PlanCacheKey) -> Option<Arc<CompiledPlan>> {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        match inner.entries.get_mut(key) {
            Some((plan, last_used)) => {
                *last_used = tick;
                let plan = Arc::clone(plan);
                inner.hits += 1;
                Some(plan)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Insert a plan, evicting the least recently used entry at capacity
    pub fn store(&self, key: PlanCacheKey, plan: Arc<CompiledPlan>) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
            }
        }
        inner.entries.insert(key, (plan, tick));
        inner.stores += 1;
    }

    /// Drop every cached plan; counters survive
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            stores: inner.stores,
            evictions: inner.evictions,
            entries: inner.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
