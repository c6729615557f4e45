use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{EntityKind, IndexId, LabelId, PropId, PropValue, Result};

/// The label and ordered property keys an index rule covers.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Entity kind the rule applies to.
    pub entity: EntityKind,
    /// Node label or relationship type.
    pub label: LabelId,
    /// Indexed keys in declared order.
    pub props: Vec<PropId>,
}

impl SchemaDescriptor {
    /// Schema over nodes carrying `label`.
    pub fn node(label: LabelId, props: &[PropId]) -> Self {
        Self {
            entity: EntityKind::Node,
            label,
            props: props.to_vec(),
        }
    }

    /// Schema over relationships of type `rel_type`.
    pub fn relationship(rel_type: LabelId, props: &[PropId]) -> Self {
        Self {
            entity: EntityKind::Relationship,
            label: rel_type,
            props: props.to_vec(),
        }
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.entity {
            EntityKind::Node => ('(', ')'),
            EntityKind::Relationship => ('[', ']'),
        };
        write!(f, "{open}:{} {{", self.label)?;
        for (i, prop) in self.props.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{prop}")?;
        }
        write!(f, "}}{close}")
    }
}

/// A schema index rule.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IndexDescriptor {
    /// At most one entity may hold any value tuple.
    Unique {
        /// Rule id.
        id: IndexId,
        /// Covered schema.
        schema: SchemaDescriptor,
    },
    /// Plain lookup index.
    NonUnique {
        /// Rule id.
        id: IndexId,
        /// Covered schema.
        schema: SchemaDescriptor,
    },
}

impl IndexDescriptor {
    /// Builds a unique rule.
    pub fn unique(id: u64, schema: SchemaDescriptor) -> Self {
        IndexDescriptor::Unique {
            id: IndexId(id),
            schema,
        }
    }

    /// Builds a non-unique rule.
    pub fn non_unique(id: u64, schema: SchemaDescriptor) -> Self {
        IndexDescriptor::NonUnique {
            id: IndexId(id),
            schema,
        }
    }

    /// Rule id.
    pub fn id(&self) -> IndexId {
        match self {
            IndexDescriptor::Unique { id, .. } | IndexDescriptor::NonUnique { id, .. } => *id,
        }
    }

    /// Covered schema.
    pub fn schema(&self) -> &SchemaDescriptor {
        SchemaSupplier::schema(self)
    }

    /// Returns whether the rule enforces uniqueness.
    pub fn is_unique(&self) -> bool {
        matches!(self, IndexDescriptor::Unique { .. })
    }
}

impl fmt::Display for IndexDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_unique() {
            "unique"
        } else {
            "non-unique"
        };
        write!(f, "index {} {} {}", self.id(), self.schema(), kind)
    }
}

/// Anything that exposes the schema it covers.
pub trait SchemaSupplier {
    /// Covered schema.
    fn schema(&self) -> &SchemaDescriptor;
}

impl SchemaSupplier for SchemaDescriptor {
    fn schema(&self) -> &SchemaDescriptor {
        self
    }
}

impl SchemaSupplier for IndexDescriptor {
    fn schema(&self) -> &SchemaDescriptor {
        match self {
            IndexDescriptor::Unique { schema, .. } | IndexDescriptor::NonUnique { schema, .. } => {
                schema
            }
        }
    }
}

/// Read handle over one index. Released when dropped.
pub trait IndexReader {
    /// Ids of every entry whose value tuple equals `values`.
    ///
    /// Providers that cannot answer the query shape return
    /// `PenumbraError::UnsupportedQuery`, never an empty result.
    fn query_exact(&self, values: &[PropValue]) -> Result<Vec<u64>>;

    /// Number of entries for `entity` holding exactly `values`.
    fn count_indexed(&self, entity: u64, values: &[PropValue]) -> Result<u64>;

    /// Whether [`query_exact`](IndexReader::query_exact) may return entities
    /// whose stored values differ from the queried tuple.
    fn may_return_false_positives(&self) -> bool {
        false
    }
}

/// Access to the index rules of a store and readers over them.
pub trait IndexAccessors: Send + Sync {
    /// Every index rule.
    fn descriptors(&self) -> &[IndexDescriptor];

    /// Opens a reader over the index behind `descriptor`.
    fn reader(&self, descriptor: &IndexDescriptor) -> Result<Box<dyn IndexReader + '_>>;
}
