use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::index::IndexAccessors;
use crate::storage::RecordAccess;
use crate::types::{EntityKind, EntityRef};

use super::cache::{CrossCheckCache, CrossCheckCacheStats};
use super::entity::{EntityCheck, EntityChecker};
use super::options::CheckOptions;
use super::report::FindingSink;

/// Shared flag that stops workers from starting new entities.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Entity checks already running complete.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An entity that could not be checked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntityCheckError {
    /// Entity whose check failed.
    pub entity: EntityRef,
    /// Rendered error.
    pub message: String,
}

/// Statistics collected during a pass.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanSummary {
    /// In-use nodes checked.
    pub nodes_checked: u64,
    /// In-use relationships checked.
    pub relationships_checked: u64,
    /// Slots skipped because they were not in use.
    pub slots_skipped: u64,
    /// Entity/index pairs cross-checked.
    pub index_checks: u64,
    /// Work units processed.
    pub shards: u64,
    /// Whether the pass stopped early.
    pub cancelled: bool,
    /// Cross-check cache counters at the end of the pass.
    pub cache: CrossCheckCacheStats,
    /// Entities that could not be checked, ordered by entity.
    pub errors: Vec<EntityCheckError>,
}

#[derive(Default)]
struct ScanCounters {
    nodes_checked: AtomicU64,
    relationships_checked: AtomicU64,
    slots_skipped: AtomicU64,
    index_checks: AtomicU64,
    shards: AtomicU64,
    errors: Mutex<Vec<EntityCheckError>>,
}

/// Drives a full pass over the node store, then the relationship store.
pub struct ScanCoordinator<'a> {
    store: &'a dyn RecordAccess,
    indexes: Option<&'a dyn IndexAccessors>,
    options: &'a CheckOptions,
    cancel: CancelFlag,
}

impl<'a> ScanCoordinator<'a> {
    /// Creates a coordinator over `store` and, when present, its indexes.
    pub fn new(
        store: &'a dyn RecordAccess,
        indexes: Option<&'a dyn IndexAccessors>,
        options: &'a CheckOptions,
    ) -> Self {
        Self {
            store,
            indexes,
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Shares `cancel` with the caller.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Runs the pass, streaming findings to `sink`.
    ///
    /// Entities are checked independently: an entity that cannot be checked
    /// is recorded in the summary and the pass continues.
    pub fn run(&self, sink: &dyn FindingSink) -> ScanSummary {
        let started = Instant::now();
        let cache = CrossCheckCache::new();
        let checker = EntityChecker::new(self.store, self.indexes, &cache, self.options);
        let shards = self.plan_shards();
        let threads = self.options.threads.clamp(1, shards.len().max(1));
        info!(shards = shards.len(), threads, "check.scan.start");

        let cursor = AtomicUsize::new(0);
        let counters = ScanCounters::default();
        thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|| self.work(&checker, &shards, &cursor, &counters, sink));
            }
        });

        let mut errors = counters.errors.into_inner();
        errors.sort_by(|a, b| a.entity.cmp(&b.entity));
        let summary = ScanSummary {
            nodes_checked: counters.nodes_checked.into_inner(),
            relationships_checked: counters.relationships_checked.into_inner(),
            slots_skipped: counters.slots_skipped.into_inner(),
            index_checks: counters.index_checks.into_inner(),
            shards: counters.shards.into_inner(),
            cancelled: self.cancel.is_cancelled(),
            cache: cache.stats(),
            errors,
        };
        info!(
            nodes = summary.nodes_checked,
            relationships = summary.relationships_checked,
            errors = summary.errors.len(),
            cancelled = summary.cancelled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "check.scan.complete"
        );
        summary
    }

    fn plan_shards(&self) -> Vec<(EntityKind, Range<u64>)> {
        let mut kinds = vec![EntityKind::Node];
        if self.options.check_relationships {
            kinds.push(EntityKind::Relationship);
        }
        let shard_size = self.options.shard_size.max(1);
        let mut shards = Vec::new();
        for kind in kinds {
            let high_id = self.store.high_id(kind.into());
            let mut start = 0;
            while start < high_id {
                let end = start.saturating_add(shard_size).min(high_id);
                shards.push((kind, start..end));
                start = end;
            }
        }
        shards
    }

    fn work(
        &self,
        checker: &EntityChecker<'_>,
        shards: &[(EntityKind, Range<u64>)],
        cursor: &AtomicUsize,
        counters: &ScanCounters,
        sink: &dyn FindingSink,
    ) {
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let Some((kind, range)) = shards.get(cursor.fetch_add(1, Ordering::AcqRel)) else {
                return;
            };
            debug!(store = %kind, start = range.start, end = range.end, "check.scan.shard");
            for id in range.clone() {
                if self.cancel.is_cancelled() {
                    return;
                }
                let entity = EntityRef { kind: *kind, id };
                match checker.check_entity(entity, sink) {
                    Ok(EntityCheck::Skipped) => {
                        counters.slots_skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(EntityCheck::Checked { indexes_matched }) => {
                        let checked = match kind {
                            EntityKind::Node => &counters.nodes_checked,
                            EntityKind::Relationship => &counters.relationships_checked,
                        };
                        checked.fetch_add(1, Ordering::Relaxed);
                        counters
                            .index_checks
                            .fetch_add(u64::from(indexes_matched), Ordering::Relaxed);
                    }
                    Err(err) => {
                        warn!(%entity, error = %err, "check.entity.fatal");
                        counters.errors.lock().push(EntityCheckError {
                            entity,
                            message: err.to_string(),
                        });
                    }
                }
            }
            counters.shards.fetch_add(1, Ordering::Relaxed);
        }
    }
}
