//! Record model and read access to the fixed-slot stores.
//!
//! [`RecordAccess`] is the only view the checker and the identifier layer
//! have of the stores. [`MemRecordStore`] implements it over plain vectors
//! and [`StoreSnapshot`] loads one, together with its indexes, from JSON.

mod access;
mod mem;
mod record;
mod snapshot;

pub use access::RecordAccess;
pub use mem::MemRecordStore;
pub use record::{EntityRecord, PropertyBlock, PropertyRecord, PROPERTY_BLOCKS_PER_RECORD};
pub use snapshot::{IndexEntrySnapshot, IndexSnapshot, StoreSnapshot, MAX_SLOT_GAP};
