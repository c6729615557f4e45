use crate::types::{EntityKind, Result, StoreKind};

use super::record::{EntityRecord, PropertyRecord};

/// Read access to the fixed-slot record stores.
///
/// Reading a slot that holds no record is not an error: implementations
/// return a record with `in_use == false`.
pub trait RecordAccess: Send + Sync {
    /// Reads entity slot `id` of the given kind.
    fn entity(&self, kind: EntityKind, id: u64) -> Result<EntityRecord>;

    /// Reads property record slot `id`.
    fn property(&self, id: u64) -> Result<PropertyRecord>;

    /// Exclusive upper bound of slot ids ever used in `store`.
    fn high_id(&self, store: StoreKind) -> u64;

    /// Returns whether slot `id` of `store` holds a live record.
    fn is_in_use(&self, store: StoreKind, id: u64) -> Result<bool> {
        match store {
            StoreKind::Node => Ok(self.entity(EntityKind::Node, id)?.in_use),
            StoreKind::Relationship => Ok(self.entity(EntityKind::Relationship, id)?.in_use),
            StoreKind::Property => Ok(self.property(id)?.in_use),
        }
    }
}
