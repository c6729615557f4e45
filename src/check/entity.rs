use std::sync::Arc;

use tracing::trace;

use crate::index::{IndexAccessors, IndexDescriptor, IndexReader};
use crate::storage::{EntityRecord, RecordAccess};
use crate::types::{EntityKind, EntityRef, PropValue, Result};

use super::cache::CrossCheckCache;
use super::chain::{ChainReader, PropertySet};
use super::matcher::matching;
use super::options::CheckOptions;
use super::report::{Finding, FindingSink};

/// Outcome of checking one entity slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityCheck {
    /// The slot is not in use.
    Skipped,
    /// The entity was checked.
    Checked {
        /// Index rules the entity matched.
        indexes_matched: u32,
    },
}

/// Validates one entity's chain and index entries.
pub struct EntityChecker<'a> {
    store: &'a dyn RecordAccess,
    indexes: Option<&'a dyn IndexAccessors>,
    cache: &'a CrossCheckCache,
    options: &'a CheckOptions,
}

impl<'a> EntityChecker<'a> {
    /// Creates a checker. Without `indexes` only chains are validated.
    pub fn new(
        store: &'a dyn RecordAccess,
        indexes: Option<&'a dyn IndexAccessors>,
        cache: &'a CrossCheckCache,
        options: &'a CheckOptions,
    ) -> Self {
        Self {
            store,
            indexes,
            cache,
            options,
        }
    }

    /// Checks `entity`, streaming findings to `sink`.
    ///
    /// Findings never abort the check. An error means the entity could not
    /// be checked at all: a record was unreadable or an index could not
    /// answer a query.
    pub fn check_entity(&self, entity: EntityRef, sink: &dyn FindingSink) -> Result<EntityCheck> {
        let record = self.store.entity(entity.kind, entity.id)?;
        if !record.in_use {
            return Ok(EntityCheck::Skipped);
        }
        let chain = self.chain_reader().read_chain(&record)?;
        let properties = self.cache.publish(entity, chain.properties());
        if self.options.check_property_chains {
            for defect in chain.defects() {
                sink.report(defect.to_finding(entity));
            }
        }
        let mut indexes_matched = 0;
        if self.options.check_indexes {
            if let Some(indexes) = self.indexes {
                indexes_matched = self.check_indexes(&record, &properties, indexes, sink)?;
            }
        }
        Ok(EntityCheck::Checked { indexes_matched })
    }

    fn chain_reader(&self) -> ChainReader<'a> {
        ChainReader::new(self.store).with_max_records(self.options.max_chain_length)
    }

    fn check_indexes(
        &self,
        record: &EntityRecord,
        properties: &PropertySet,
        indexes: &dyn IndexAccessors,
        sink: &dyn FindingSink,
    ) -> Result<u32> {
        let entity = record.entity_ref();
        let mut matched = 0;
        for descriptor in matching(record.kind, &record.labels, indexes.descriptors(), None, || {
            Ok(properties.key_set())
        }) {
            let descriptor = descriptor?;
            let Some(values) = properties.values_for(&descriptor.schema().props) else {
                continue;
            };
            matched += 1;
            let reader = indexes.reader(descriptor)?;
            match descriptor {
                IndexDescriptor::Unique { .. } => {
                    self.verify_indexed_uniquely(entity, descriptor, &values, reader.as_ref(), sink)?
                }
                IndexDescriptor::NonUnique { .. } => {
                    let count = reader.count_indexed(entity.id, &values)?;
                    report_index_count(entity, descriptor, &values, count, sink);
                }
            }
            trace!(%entity, index = %descriptor.id(), "check.entity.index");
        }
        Ok(matched)
    }

    fn verify_indexed_uniquely(
        &self,
        entity: EntityRef,
        descriptor: &IndexDescriptor,
        values: &[PropValue],
        reader: &dyn IndexReader,
        sink: &dyn FindingSink,
    ) -> Result<()> {
        let mut hits = reader.query_exact(values)?;
        if reader.may_return_false_positives() {
            hits = self.exact_hits(entity.kind, descriptor, values, hits)?;
        }
        let mut own = 0u64;
        for hit in hits {
            if hit == entity.id {
                own += 1;
            } else {
                sink.report(Finding::unique_index_not_unique(entity, descriptor, values, hit));
            }
        }
        report_index_count(entity, descriptor, values, own, sink);
        Ok(())
    }

    /// Drops hits whose stored values differ from `values`.
    fn exact_hits(
        &self,
        kind: EntityKind,
        descriptor: &IndexDescriptor,
        values: &[PropValue],
        hits: Vec<u64>,
    ) -> Result<Vec<u64>> {
        let mut exact = Vec::with_capacity(hits.len());
        for hit in hits {
            let props = self.properties_of(EntityRef { kind, id: hit })?;
            if props.values_for(&descriptor.schema().props).as_deref() == Some(values) {
                exact.push(hit);
            }
        }
        Ok(exact)
    }

    fn properties_of(&self, entity: EntityRef) -> Result<Arc<PropertySet>> {
        self.cache.get_or_load(entity, || {
            let record = self.store.entity(entity.kind, entity.id)?;
            if !record.in_use {
                return Ok(PropertySet::default());
            }
            Ok(self.chain_reader().read_chain(&record)?.properties())
        })
    }
}

fn report_index_count(
    entity: EntityRef,
    descriptor: &IndexDescriptor,
    values: &[PropValue],
    count: u64,
    sink: &dyn FindingSink,
) {
    match count {
        0 => sink.report(Finding::not_indexed(entity, descriptor, values)),
        1 => {}
        n => sink.report(Finding::indexed_multiple_times(entity, descriptor, values, n)),
    }
}
