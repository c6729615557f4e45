#![forbid(unsafe_code)]

//! Identifier newtypes, property values, and the crate-wide error type.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identifier of a node label or relationship type.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelId(pub u32);

/// Identifier of a property key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropId(pub u32);

/// Identifier of a schema index rule.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexId(pub u64);

/// Kind of entity record a fixed-slot store holds.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Node records.
    Node,
    /// Relationship records.
    Relationship,
}

/// Fixed-slot record stores addressable by the identifier layer.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Node store.
    Node,
    /// Relationship store.
    Relationship,
    /// Property record store.
    Property,
}

impl From<EntityKind> for StoreKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Node => StoreKind::Node,
            EntityKind::Relationship => StoreKind::Relationship,
        }
    }
}

/// Absolute address of an entity record. Node and relationship ids overlap,
/// so the kind is part of the identity.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct EntityRef {
    /// Store the record lives in.
    pub kind: EntityKind,
    /// Slot id inside that store.
    pub id: u64,
}

impl EntityRef {
    /// Addresses node `id`.
    pub fn node(id: u64) -> Self {
        Self {
            kind: EntityKind::Node,
            id,
        }
    }

    /// Addresses relationship `id`.
    pub fn relationship(id: u64) -> Self {
        Self {
            kind: EntityKind::Relationship,
            id,
        }
    }
}

/// A property value as stored in a property block.
///
/// Equality and hashing are total: floats compare by bit pattern so value
/// tuples can key an index.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropValue {
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

/// Discriminant of a [`PropValue`], used by index providers to declare
/// which value kinds they can query.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// [`PropValue::Bool`].
    Bool,
    /// [`PropValue::Int`].
    Int,
    /// [`PropValue::Float`].
    Float,
    /// [`PropValue::Str`].
    Str,
    /// [`PropValue::Bytes`].
    Bytes,
}

impl PropValue {
    /// Returns the value's discriminant.
    pub fn kind(&self) -> ValueKind {
        match self {
            PropValue::Bool(_) => ValueKind::Bool,
            PropValue::Int(_) => ValueKind::Int,
            PropValue::Float(_) => ValueKind::Float,
            PropValue::Str(_) => ValueKind::Str,
            PropValue::Bytes(_) => ValueKind::Bytes,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Bytes(a), PropValue::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for PropValue {}

impl Hash for PropValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PropValue::Bool(v) => v.hash(state),
            PropValue::Int(v) => v.hash(state),
            PropValue::Float(v) => v.to_bits().hash(state),
            PropValue::Str(v) => v.hash(state),
            PropValue::Bytes(v) => v.hash(state),
        }
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.to_owned())
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(v) => write!(f, "{v}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Str(v) => write!(f, "{v:?}"),
            PropValue::Bytes(v) => write!(f, "bytes(len={})", v.len()),
        }
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PropId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => f.write_str("node"),
            EntityKind::Relationship => f.write_str("relationship"),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Node => f.write_str("node"),
            StoreKind::Relationship => f.write_str("relationship"),
            StoreKind::Property => f.write_str("property"),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Errors raised by the storage-integrity layer.
#[derive(thiserror::Error, Debug)]
pub enum PenumbraError {
    /// Underlying file I/O failed.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-disk data failed validation.
    #[error("corruption: {0}")]
    Corruption(String),
    /// Caller violated an API precondition.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// A referenced object does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The index provider cannot answer the requested query shape.
    #[error("index provider does not support query: {0}")]
    UnsupportedQuery(String),
    /// Snapshot or report (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PenumbraError>;
