#![forbid(unsafe_code)]

//! Administrative entry points.
//!
//! This module wraps the checking engine and the identifier layer in
//! report-producing functions used by the command-line tool: consistency
//! runs over a store or a store snapshot, and inspection, recovery and
//! rebuild of identifier files.

mod consistency;
mod error;
mod ids;

/// Consistency runs over a live store or a JSON store snapshot.
pub use consistency::{
    check_consistency, check_snapshot, check_snapshot_with_sink, ConsistencyCheckMode,
    ConsistencyReport,
};

/// Error types for administrative operations.
pub use error::{AdminError, Result};

/// Identifier file maintenance.
///
/// Recovery after an unclean shutdown discards the untrusted free list and
/// continues allocation from the high id.
pub use ids::{create_ids, inspect_ids, rebuild_ids, recover_ids, IdFileReport, IdRecoveryReport};
