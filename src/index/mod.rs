//! Schema index rules and the reader interface the checker queries.

mod mem;
mod types;

pub use mem::{MemIndex, MemIndexReader, MemIndexes, APPROXIMATE_PREFIX_LEN};
pub use types::{IndexAccessors, IndexDescriptor, IndexReader, SchemaDescriptor, SchemaSupplier};
