//! Penumbra: identifier allocation and offline consistency checking for the
//! record stores of an embedded graph database.

#![warn(missing_docs)]

pub mod admin;
pub mod check;
pub mod idgen;
pub mod index;
pub mod primitives;
pub mod storage;
pub mod types;
