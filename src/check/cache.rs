use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::types::{EntityRef, Result};

use super::chain::PropertySet;

const DEFAULT_SHARDS: usize = 64;

type Shard = RwLock<FxHashMap<EntityRef, Arc<PropertySet>>>;

/// Hit and miss counters of a [`CrossCheckCache`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CrossCheckCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Entries currently published.
    pub entries: u64,
}

/// Property sets materialized during one pass, shared across workers.
///
/// Entries are published once and never replaced: a second publish for the
/// same entity returns the value already stored, so every reader of an
/// entity observes one property set.
pub struct CrossCheckCache {
    shards: Vec<Shard>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for CrossCheckCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossCheckCache {
    /// Creates a cache with the default shard count.
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a cache with `shards` lock shards.
    pub fn with_shards(shards: usize) -> Self {
        let shard_count = shards.max(1);
        let mut shard_vec = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shard_vec.push(RwLock::new(FxHashMap::default()));
        }
        Self {
            shards: shard_vec,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the published set for `entity`, if any.
    pub fn get(&self, entity: EntityRef) -> Option<Arc<PropertySet>> {
        let found = self.shard_for(entity).read().get(&entity).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Publishes `set` unless a value is already present; returns the
    /// value that is published afterwards.
    pub fn publish(&self, entity: EntityRef, set: PropertySet) -> Arc<PropertySet> {
        let mut guard = self.shard_for(entity).write();
        guard
            .entry(entity)
            .or_insert_with(|| Arc::new(set))
            .clone()
    }

    /// Returns the published set, or loads and publishes one.
    ///
    /// `load` runs outside any lock. When two callers race, both may load
    /// but only the first publish is kept.
    pub fn get_or_load<F>(&self, entity: EntityRef, load: F) -> Result<Arc<PropertySet>>
    where
        F: FnOnce() -> Result<PropertySet>,
    {
        if let Some(found) = self.get(entity) {
            return Ok(found);
        }
        Ok(self.publish(entity, load()?))
    }

    /// Number of published entries.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns whether nothing was published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CrossCheckCacheStats {
        CrossCheckCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len() as u64,
        }
    }

    fn shard_for(&self, entity: EntityRef) -> &Shard {
        let idx = (entity.id as usize ^ entity.kind as usize) % self.shards.len();
        &self.shards[idx]
    }
}
