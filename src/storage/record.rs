use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::types::{EntityKind, EntityRef, LabelId, PropId, PropValue};

/// Number of property blocks a property record holds before the chain
/// continues in the next record.
pub const PROPERTY_BLOCKS_PER_RECORD: usize = 4;

/// A node or relationship slot.
///
/// Relationships store their type as their single label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Slot id.
    pub id: u64,
    /// Store the record belongs to.
    pub kind: EntityKind,
    /// In-use flag of the slot.
    pub in_use: bool,
    /// Labels (nodes) or the relationship type.
    #[serde(default)]
    pub labels: SmallVec<[LabelId; 4]>,
    /// First property record of the chain.
    #[serde(default)]
    pub prop_head: Option<u64>,
}

impl EntityRecord {
    /// Creates an in-use record.
    pub fn new(kind: EntityKind, id: u64, labels: &[LabelId], prop_head: Option<u64>) -> Self {
        Self {
            id,
            kind,
            in_use: true,
            labels: SmallVec::from_slice(labels),
            prop_head,
        }
    }

    /// A slot that holds no record.
    pub fn unused(kind: EntityKind, id: u64) -> Self {
        Self {
            id,
            kind,
            in_use: false,
            labels: SmallVec::new(),
            prop_head: None,
        }
    }

    /// Absolute address of this record.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef {
            kind: self.kind,
            id: self.id,
        }
    }

    /// Returns whether the record carries `label`.
    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.contains(&label)
    }
}

/// A single key/value pair inside a property record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyBlock {
    /// Property key.
    pub key: PropId,
    /// Stored value.
    pub value: PropValue,
}

impl PropertyBlock {
    /// Creates a block.
    pub fn new(key: PropId, value: impl Into<PropValue>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }
}

/// One link of an entity's doubly-linked property chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Slot id.
    pub id: u64,
    /// In-use flag of the slot.
    pub in_use: bool,
    /// Previous record in the chain; `None` for the chain head.
    #[serde(default)]
    pub prev: Option<u64>,
    /// Next record in the chain; `None` terminates it.
    #[serde(default)]
    pub next: Option<u64>,
    /// Key/value blocks.
    #[serde(default)]
    pub blocks: Vec<PropertyBlock>,
}

impl PropertyRecord {
    /// A slot that holds no record.
    pub fn unused(id: u64) -> Self {
        Self {
            id,
            in_use: false,
            prev: None,
            next: None,
            blocks: Vec::new(),
        }
    }

    /// Keys stored in this record, in block order.
    pub fn keys(&self) -> impl Iterator<Item = PropId> + '_ {
        self.blocks.iter().map(|block| block.key)
    }
}
