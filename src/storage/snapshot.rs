use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::{IndexDescriptor, MemIndex, MemIndexes};
use crate::types::{EntityKind, PenumbraError, PropValue, Result, ValueKind};

use super::mem::MemRecordStore;
use super::record::{EntityRecord, PropertyRecord};

/// JSON image of a record store and its indexes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Node slots.
    #[serde(default)]
    pub nodes: Vec<EntityRecord>,
    /// Relationship slots.
    #[serde(default)]
    pub relationships: Vec<EntityRecord>,
    /// Property record slots.
    #[serde(default)]
    pub properties: Vec<PropertyRecord>,
    /// Index rules with their entries.
    #[serde(default)]
    pub indexes: Vec<IndexSnapshot>,
}

/// One index inside a [`StoreSnapshot`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// The rule.
    pub descriptor: IndexDescriptor,
    /// Entries, one per `(entity, values)` occurrence.
    #[serde(default)]
    pub entries: Vec<IndexEntrySnapshot>,
    /// Value kinds the provider cannot query.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_kinds: Vec<ValueKind>,
    /// Provider compares truncated values.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub approximate: bool,
}

/// A single index entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntrySnapshot {
    /// Indexed entity id.
    pub entity: u64,
    /// Value tuple in the rule's key order.
    pub values: Vec<PropValue>,
}

impl StoreSnapshot {
    /// Reads a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let snapshot: Self = serde_json::from_reader(reader)
            .map_err(|err| PenumbraError::Serialization(format!("{}: {err}", path.display())))?;
        debug!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            relationships = snapshot.relationships.len(),
            properties = snapshot.properties.len(),
            indexes = snapshot.indexes.len(),
            "storage.snapshot.load"
        );
        Ok(snapshot)
    }

    /// Writes the snapshot as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|err| PenumbraError::Serialization(err.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Captures the full state of a store and its indexes.
    pub fn capture(store: &MemRecordStore, indexes: &MemIndexes) -> Self {
        Self {
            nodes: store.entities(EntityKind::Node).to_vec(),
            relationships: store.entities(EntityKind::Relationship).to_vec(),
            properties: store.properties().to_vec(),
            indexes: indexes
                .iter()
                .map(|index| IndexSnapshot {
                    descriptor: index.descriptor().clone(),
                    entries: index
                        .entries()
                        .into_iter()
                        .map(|(entity, values)| IndexEntrySnapshot { entity, values })
                        .collect(),
                    unsupported_kinds: index.unsupported_kinds().to_vec(),
                    approximate: index.is_approximate(),
                })
                .collect(),
        }
    }

    /// Builds the in-memory store and indexes.
    ///
    /// Records are placed in the slot named by their id. A record listed
    /// under the wrong store, or with an id more than [`MAX_SLOT_GAP`] past
    /// the number of records listed for its store, is rejected.
    pub fn into_parts(self) -> Result<(MemRecordStore, MemIndexes)> {
        let mut store = MemRecordStore::new();
        for (kind, records) in [
            (EntityKind::Node, self.nodes),
            (EntityKind::Relationship, self.relationships),
        ] {
            let limit = slot_limit(records.len());
            let name = kind.to_string();
            for record in records {
                check_slot(&name, record.id, limit)?;
                if record.kind != kind {
                    return Err(PenumbraError::Serialization(format!(
                        "{} record {} listed in the {kind} store",
                        record.kind, record.id
                    )));
                }
                store.put_entity(record);
            }
        }
        let limit = slot_limit(self.properties.len());
        for record in self.properties {
            check_slot("property", record.id, limit)?;
            store.put_property(record);
        }
        let mut indexes = MemIndexes::new();
        for snapshot in self.indexes {
            let mut index = MemIndex::new(snapshot.descriptor).approximate(snapshot.approximate);
            for kind in snapshot.unsupported_kinds {
                index = index.reject_value_kind(kind);
            }
            for entry in snapshot.entries {
                index.insert(entry.entity, entry.values);
            }
            indexes.add(index)?;
        }
        Ok((store, indexes))
    }
}

/// Largest run of unlisted slots a snapshot may imply before its last record.
pub const MAX_SLOT_GAP: u64 = 1 << 16;

fn slot_limit(listed: usize) -> u64 {
    (listed as u64).saturating_add(MAX_SLOT_GAP)
}

fn check_slot(store: &str, id: u64, limit: u64) -> Result<()> {
    if id >= limit {
        return Err(PenumbraError::Serialization(format!(
            "{store} record id {id} is beyond the {limit} slots the snapshot can describe"
        )));
    }
    Ok(())
}
