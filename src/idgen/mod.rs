//! Identifier allocation for fixed-slot record stores.
//!
//! Each store keeps an identifier file: a fixed header carrying the sticky
//! marker and the high id, followed by the persisted free-id list. The
//! marker is written when a space is opened for mutation and cleared only by
//! an orderly close, so its presence at open time means the free list on
//! disk cannot be trusted.

mod header;
mod space;

pub use header::{
    mark_sticky, read_header, IdFileHeader, FREE_ID_LEN, ID_FILE_FORMAT_VERSION, ID_FILE_MAGIC,
    ID_HEADER_LEN,
};
pub use space::{IdOpenOptions, IdentifierSpace, DEFAULT_HIGH_ID_RESERVE};
