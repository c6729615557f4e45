use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::check::{matching, ChainReader};
use crate::storage::RecordAccess;
use crate::types::{EntityKind, IndexId, PenumbraError, PropValue, Result, ValueKind};

use super::types::{IndexAccessors, IndexDescriptor, IndexReader};

/// Bytes of a string or byte value an approximate index keeps.
pub const APPROXIMATE_PREFIX_LEN: usize = 4;

/// One in-memory index: a multiset of `(value tuple, entity)` entries.
pub struct MemIndex {
    descriptor: IndexDescriptor,
    entries: RwLock<FxHashMap<Vec<PropValue>, Vec<u64>>>,
    unsupported: Vec<ValueKind>,
    approximate: bool,
    open_readers: AtomicUsize,
}

impl MemIndex {
    /// Creates an empty index for `descriptor`.
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self {
            descriptor,
            entries: RwLock::new(FxHashMap::default()),
            unsupported: Vec::new(),
            approximate: false,
            open_readers: AtomicUsize::new(0),
        }
    }

    /// Rejects exact queries over values of `kind` with `UnsupportedQuery`.
    pub fn reject_value_kind(mut self, kind: ValueKind) -> Self {
        if !self.unsupported.contains(&kind) {
            self.unsupported.push(kind);
        }
        self
    }

    /// Compares string and byte values by their first
    /// [`APPROXIMATE_PREFIX_LEN`] bytes only, so exact queries may return
    /// false positives.
    pub fn approximate(mut self, approximate: bool) -> Self {
        self.approximate = approximate;
        self
    }

    /// The rule this index serves.
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// Value kinds exact queries reject.
    pub fn unsupported_kinds(&self) -> &[ValueKind] {
        &self.unsupported
    }

    /// Whether exact queries compare truncated values.
    pub fn is_approximate(&self) -> bool {
        self.approximate
    }

    /// Adds an entry. Adding the same entry twice stores it twice.
    pub fn insert(&self, entity: u64, values: Vec<PropValue>) {
        self.entries.write().entry(values).or_default().push(entity);
    }

    /// Removes one occurrence of an entry.
    pub fn remove(&self, entity: u64, values: &[PropValue]) -> bool {
        let mut entries = self.entries.write();
        let Some(ids) = entries.get_mut(values) else {
            return false;
        };
        let Some(pos) = ids.iter().position(|id| *id == entity) else {
            return false;
        };
        ids.swap_remove(pos);
        if ids.is_empty() {
            entries.remove(values);
        }
        true
    }

    /// Every entry, ordered by entity id.
    pub fn entries(&self) -> Vec<(u64, Vec<PropValue>)> {
        let entries = self.entries.read();
        let mut out: Vec<(u64, Vec<PropValue>)> = entries
            .iter()
            .flat_map(|(values, ids)| ids.iter().map(move |id| (*id, values.clone())))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Number of readers currently open.
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::Acquire)
    }

    /// Opens a reader; it is released on drop.
    pub fn reader(&self) -> MemIndexReader<'_> {
        self.open_readers.fetch_add(1, Ordering::AcqRel);
        MemIndexReader { index: self }
    }

    fn check_supported(&self, values: &[PropValue]) -> Result<()> {
        if let Some(value) = values.iter().find(|v| self.unsupported.contains(&v.kind())) {
            return Err(PenumbraError::UnsupportedQuery(format!(
                "{} cannot answer exact queries over {:?} values",
                self.descriptor,
                value.kind()
            )));
        }
        Ok(())
    }
}

fn truncated(value: &PropValue) -> PropValue {
    match value {
        PropValue::Str(s) if s.len() > APPROXIMATE_PREFIX_LEN => {
            let mut end = APPROXIMATE_PREFIX_LEN;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            PropValue::Str(s[..end].to_owned())
        }
        PropValue::Bytes(b) if b.len() > APPROXIMATE_PREFIX_LEN => {
            PropValue::Bytes(b[..APPROXIMATE_PREFIX_LEN].to_vec())
        }
        other => other.clone(),
    }
}

fn lossy_eq(a: &[PropValue], b: &[PropValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| truncated(x) == truncated(y))
}

/// Reader over a [`MemIndex`].
pub struct MemIndexReader<'a> {
    index: &'a MemIndex,
}

impl IndexReader for MemIndexReader<'_> {
    fn query_exact(&self, values: &[PropValue]) -> Result<Vec<u64>> {
        self.index.check_supported(values)?;
        let entries = self.index.entries.read();
        if !self.index.approximate {
            return Ok(entries.get(values).cloned().unwrap_or_default());
        }
        let mut hits: Vec<u64> = entries
            .iter()
            .filter(|(stored, _)| lossy_eq(stored, values))
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        hits.sort_unstable();
        Ok(hits)
    }

    fn count_indexed(&self, entity: u64, values: &[PropValue]) -> Result<u64> {
        self.index.check_supported(values)?;
        let entries = self.index.entries.read();
        Ok(entries
            .get(values)
            .map(|ids| ids.iter().filter(|id| **id == entity).count() as u64)
            .unwrap_or(0))
    }

    fn may_return_false_positives(&self) -> bool {
        self.index.approximate
    }
}

impl Drop for MemIndexReader<'_> {
    fn drop(&mut self) {
        self.index.open_readers.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A set of in-memory indexes keyed by rule id.
#[derive(Default)]
pub struct MemIndexes {
    descriptors: Vec<IndexDescriptor>,
    indexes: FxHashMap<IndexId, MemIndex>,
}

impl MemIndexes {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an index. Rule ids must be unique.
    pub fn add(&mut self, index: MemIndex) -> Result<()> {
        let id = index.descriptor().id();
        if self.indexes.contains_key(&id) {
            return Err(PenumbraError::Invalid("duplicate index id"));
        }
        self.descriptors.push(index.descriptor().clone());
        self.indexes.insert(id, index);
        Ok(())
    }

    /// Registers an empty index for `descriptor`.
    pub fn create(&mut self, descriptor: IndexDescriptor) -> Result<&MemIndex> {
        let id = descriptor.id();
        self.add(MemIndex::new(descriptor))?;
        self.indexes
            .get(&id)
            .ok_or(PenumbraError::NotFound("index"))
    }

    /// Looks up an index by rule id.
    pub fn index(&self, id: IndexId) -> Option<&MemIndex> {
        self.indexes.get(&id)
    }

    /// Indexes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &MemIndex> + '_ {
        self.descriptors
            .iter()
            .filter_map(|descriptor| self.indexes.get(&descriptor.id()))
    }

    /// Sum of open readers over every index.
    pub fn open_readers(&self) -> usize {
        self.indexes.values().map(MemIndex::open_readers).sum()
    }

    /// Adds an entry for every in-use entity of `store` that matches a rule.
    /// Returns the number of entries added.
    pub fn populate(&self, store: &dyn RecordAccess) -> Result<u64> {
        let reader = ChainReader::new(store);
        let mut added = 0u64;
        for kind in [EntityKind::Node, EntityKind::Relationship] {
            for id in 0..store.high_id(kind.into()) {
                let record = store.entity(kind, id)?;
                if !record.in_use {
                    continue;
                }
                let props = reader.read_chain(&record)?.properties();
                for descriptor in matching(kind, &record.labels, &self.descriptors, None, || {
                    Ok(props.key_set())
                }) {
                    let descriptor = descriptor?;
                    let Some(values) = props.values_for(&descriptor.schema().props) else {
                        continue;
                    };
                    if let Some(index) = self.indexes.get(&descriptor.id()) {
                        index.insert(id, values);
                        added += 1;
                    }
                }
            }
        }
        debug!(entries = added, indexes = self.indexes.len(), "index.populate");
        Ok(added)
    }
}

impl IndexAccessors for MemIndexes {
    fn descriptors(&self) -> &[IndexDescriptor] {
        &self.descriptors
    }

    fn reader(&self, descriptor: &IndexDescriptor) -> Result<Box<dyn IndexReader + '_>> {
        let index = self
            .indexes
            .get(&descriptor.id())
            .ok_or(PenumbraError::NotFound("index"))?;
        Ok(Box::new(index.reader()))
    }
}
