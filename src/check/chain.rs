use rustc_hash::{FxHashMap, FxHashSet};

use crate::storage::{EntityRecord, PropertyRecord, RecordAccess};
use crate::types::{EntityRef, PropId, PropValue, Result};

use super::report::Finding;

/// Default bound on records followed in a single chain.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 1 << 20;

/// Structural defect observed while walking a property chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChainDefect {
    /// The chain head has a previous pointer.
    NotFirstInChain {
        /// Head record.
        record: u64,
    },
    /// A visited record is not in use. Traversal stops at it.
    NotInUse {
        /// Freed record.
        record: u64,
    },
    /// `key` was already seen earlier in the chain.
    DuplicateKey {
        /// Record holding the repeat.
        record: u64,
        /// Repeated key.
        key: PropId,
    },
    /// A next pointer leads back to a visited record.
    Cycle {
        /// Record revisited.
        record: u64,
    },
    /// The chain was cut off at the length bound.
    TooLong {
        /// Records read before stopping.
        records: u64,
    },
}

impl ChainDefect {
    /// Converts the defect into a finding against `entity`.
    pub fn to_finding(&self, entity: EntityRef) -> Finding {
        match *self {
            ChainDefect::NotFirstInChain { record } => {
                Finding::property_not_first_in_chain(entity, record)
            }
            ChainDefect::NotInUse { record } => Finding::property_not_in_use(entity, record),
            ChainDefect::DuplicateKey { record, key } => {
                Finding::property_key_not_unique(entity, record, key)
            }
            ChainDefect::Cycle { record } => Finding::property_chain_cycle(entity, record),
            ChainDefect::TooLong { records } => Finding::property_chain_too_long(entity, records),
        }
    }
}

/// Immutable key/value view of an entity's properties.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertySet {
    values: FxHashMap<PropId, PropValue>,
}

impl PropertySet {
    /// Value stored under `key`.
    pub fn get(&self, key: PropId) -> Option<&PropValue> {
        self.values.get(&key)
    }

    /// Returns whether `key` is present.
    pub fn contains(&self, key: PropId) -> bool {
        self.values.contains_key(&key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the set holds no key.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Every key, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = PropId> + '_ {
        self.values.keys().copied()
    }

    /// The key set, as the schema matcher consumes it.
    pub fn key_set(&self) -> FxHashSet<PropId> {
        self.keys().collect()
    }

    /// Values for `keys` in the given order; `None` if any key is missing.
    pub fn values_for(&self, keys: &[PropId]) -> Option<Vec<PropValue>> {
        keys.iter().map(|key| self.values.get(key).cloned()).collect()
    }
}

impl FromIterator<(PropId, PropValue)> for PropertySet {
    /// The first occurrence of a key wins.
    fn from_iter<T: IntoIterator<Item = (PropId, PropValue)>>(iter: T) -> Self {
        let mut values = FxHashMap::default();
        for (key, value) in iter {
            values.entry(key).or_insert(value);
        }
        Self { values }
    }
}

/// Records of a chain in traversal order plus every defect found on the way.
#[derive(Clone, Debug, Default)]
pub struct PropertyChain {
    records: Vec<PropertyRecord>,
    defects: Vec<ChainDefect>,
}

impl PropertyChain {
    /// Records visited, including a terminating not-in-use record.
    pub fn records(&self) -> &[PropertyRecord] {
        &self.records
    }

    /// Defects in the order they were found.
    pub fn defects(&self) -> &[ChainDefect] {
        &self.defects
    }

    /// Returns whether the walk found no defect.
    pub fn is_well_formed(&self) -> bool {
        self.defects.is_empty()
    }

    /// Properties of the in-use records.
    pub fn properties(&self) -> PropertySet {
        self.records
            .iter()
            .filter(|record| record.in_use)
            .flat_map(|record| record.blocks.iter())
            .map(|block| (block.key, block.value.clone()))
            .collect()
    }
}

/// Walks property chains through a [`RecordAccess`].
pub struct ChainReader<'a> {
    store: &'a dyn RecordAccess,
    max_records: usize,
}

impl<'a> ChainReader<'a> {
    /// Creates a reader bounded by [`DEFAULT_MAX_CHAIN_LENGTH`].
    pub fn new(store: &'a dyn RecordAccess) -> Self {
        Self {
            store,
            max_records: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }

    /// Overrides the chain length bound.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    /// Follows `entity`'s chain from its head.
    ///
    /// Defects are collected, never returned as errors. Only a failure to
    /// read a record is an error.
    pub fn read_chain(&self, entity: &EntityRecord) -> Result<PropertyChain> {
        let mut chain = PropertyChain::default();
        let mut visited = FxHashSet::default();
        let mut seen_keys = FxHashSet::default();
        let mut next = entity.prop_head;
        while let Some(id) = next {
            if !visited.insert(id) {
                chain.defects.push(ChainDefect::Cycle { record: id });
                break;
            }
            if chain.records.len() >= self.max_records {
                chain.defects.push(ChainDefect::TooLong {
                    records: chain.records.len() as u64,
                });
                break;
            }
            let record = self.store.property(id)?;
            if chain.records.is_empty() && record.prev.is_some() {
                chain.defects.push(ChainDefect::NotFirstInChain { record: id });
            }
            if !record.in_use {
                chain.defects.push(ChainDefect::NotInUse { record: id });
                chain.records.push(record);
                break;
            }
            for key in record.keys() {
                if !seen_keys.insert(key) {
                    chain.defects.push(ChainDefect::DuplicateKey { record: id, key });
                }
            }
            next = record.next;
            chain.records.push(record);
        }
        Ok(chain)
    }
}
