use crate::types::{EntityKind, LabelId, PropId, PropValue, Result, StoreKind};

use super::access::RecordAccess;
use super::record::{EntityRecord, PropertyBlock, PropertyRecord, PROPERTY_BLOCKS_PER_RECORD};

/// In-memory record stores.
///
/// Slots are dense vectors indexed by id. Writers address slots directly, so
/// the store can hold any shape of damage a disk store could: dangling chain
/// pointers, records left not in use, loops.
#[derive(Clone, Debug, Default)]
pub struct MemRecordStore {
    nodes: Vec<EntityRecord>,
    relationships: Vec<EntityRecord>,
    properties: Vec<PropertyRecord>,
}

impl MemRecordStore {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node with the given labels and properties, returning its id.
    pub fn create_node(&mut self, labels: &[LabelId], props: &[(PropId, PropValue)]) -> u64 {
        self.create_entity(EntityKind::Node, labels, props)
    }

    /// Appends a relationship of type `rel_type`, returning its id.
    pub fn create_relationship(&mut self, rel_type: LabelId, props: &[(PropId, PropValue)]) -> u64 {
        self.create_entity(EntityKind::Relationship, &[rel_type], props)
    }

    /// Appends an entity, writing its property chain with
    /// [`PROPERTY_BLOCKS_PER_RECORD`] blocks per record.
    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        labels: &[LabelId],
        props: &[(PropId, PropValue)],
    ) -> u64 {
        let prop_head = self.write_chain(props);
        let id = self.entities(kind).len() as u64;
        self.put_entity(EntityRecord::new(kind, id, labels, prop_head));
        id
    }

    /// Appends a well-formed property chain and returns its head.
    pub fn write_chain(&mut self, props: &[(PropId, PropValue)]) -> Option<u64> {
        if props.is_empty() {
            return None;
        }
        let first = self.properties.len() as u64;
        let chunks: Vec<_> = props.chunks(PROPERTY_BLOCKS_PER_RECORD).collect();
        let last = chunks.len() - 1;
        for (offset, chunk) in chunks.into_iter().enumerate() {
            let id = first + offset as u64;
            self.put_property(PropertyRecord {
                id,
                in_use: true,
                prev: (offset > 0).then(|| id - 1),
                next: (offset < last).then(|| id + 1),
                blocks: chunk
                    .iter()
                    .map(|(key, value)| PropertyBlock::new(*key, value.clone()))
                    .collect(),
            });
        }
        Some(first)
    }

    /// Writes `record` into its slot, growing the store with unused slots.
    pub fn put_entity(&mut self, record: EntityRecord) {
        let id = record.id;
        let kind = record.kind;
        let slots = self.entities_mut(kind);
        grow(slots, id, |slot| EntityRecord::unused(kind, slot));
        slots[id as usize] = record;
    }

    /// Writes `record` into its slot, growing the store with unused slots.
    pub fn put_property(&mut self, record: PropertyRecord) {
        let id = record.id;
        grow(&mut self.properties, id, PropertyRecord::unused);
        self.properties[id as usize] = record;
    }

    /// Marks an entity slot not in use. Its chain is left untouched.
    pub fn delete_entity(&mut self, kind: EntityKind, id: u64) -> bool {
        match self.entity_mut(kind, id) {
            Some(record) if record.in_use => {
                record.in_use = false;
                true
            }
            _ => false,
        }
    }

    /// Marks a property record not in use without unlinking it.
    pub fn delete_property(&mut self, id: u64) -> bool {
        match self.property_mut(id) {
            Some(record) if record.in_use => {
                record.in_use = false;
                true
            }
            _ => false,
        }
    }

    /// Mutable access to an existing entity slot.
    pub fn entity_mut(&mut self, kind: EntityKind, id: u64) -> Option<&mut EntityRecord> {
        self.entities_mut(kind).get_mut(id as usize)
    }

    /// Mutable access to an existing property slot.
    pub fn property_mut(&mut self, id: u64) -> Option<&mut PropertyRecord> {
        self.properties.get_mut(id as usize)
    }

    /// All entity slots of `kind`, in id order.
    pub fn entities(&self, kind: EntityKind) -> &[EntityRecord] {
        match kind {
            EntityKind::Node => &self.nodes,
            EntityKind::Relationship => &self.relationships,
        }
    }

    /// All property slots, in id order.
    pub fn properties(&self) -> &[PropertyRecord] {
        &self.properties
    }

    fn entities_mut(&mut self, kind: EntityKind) -> &mut Vec<EntityRecord> {
        match kind {
            EntityKind::Node => &mut self.nodes,
            EntityKind::Relationship => &mut self.relationships,
        }
    }
}

fn grow<T>(slots: &mut Vec<T>, id: u64, unused: impl Fn(u64) -> T) {
    while slots.len() as u64 <= id {
        let slot = slots.len() as u64;
        slots.push(unused(slot));
    }
}

impl RecordAccess for MemRecordStore {
    fn entity(&self, kind: EntityKind, id: u64) -> Result<EntityRecord> {
        Ok(self
            .entities(kind)
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| EntityRecord::unused(kind, id)))
    }

    fn property(&self, id: u64) -> Result<PropertyRecord> {
        Ok(self
            .properties
            .get(id as usize)
            .cloned()
            .unwrap_or_else(|| PropertyRecord::unused(id)))
    }

    fn high_id(&self, store: StoreKind) -> u64 {
        match store {
            StoreKind::Node => self.nodes.len() as u64,
            StoreKind::Relationship => self.relationships.len() as u64,
            StoreKind::Property => self.properties.len() as u64,
        }
    }
}
