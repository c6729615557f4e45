//! Offline cross-validation of entity records, property chains and schema
//! indexes.
//!
//! A pass is driven by [`ScanCoordinator`], which hands id ranges to worker
//! threads. Each entity is checked by [`EntityChecker`]: its property chain
//! is walked by [`ChainReader`], the resulting [`PropertySet`] is published
//! to the pass-wide [`CrossCheckCache`], and every index rule the entity
//! falls under (see [`matching`]) is queried for the entity's values.
//! Discrepancies are streamed to a [`FindingSink`] as [`Finding`]s.

mod cache;
mod chain;
mod entity;
mod matcher;
mod options;
mod report;
mod scan;

pub use cache::{CrossCheckCache, CrossCheckCacheStats};
pub use chain::{ChainDefect, ChainReader, PropertyChain, PropertySet, DEFAULT_MAX_CHAIN_LENGTH};
pub use entity::{EntityCheck, EntityChecker};
pub use matcher::{has_schema_properties, matching, MatchingDescriptors};
pub use options::{CheckOptions, DEFAULT_SHARD_SIZE};
pub use report::{
    sort_findings, ChannelSink, CollectingSink, CountingSink, Finding, FindingCounts, FindingKind,
    FindingSink, Severity,
};
pub use scan::{CancelFlag, EntityCheckError, ScanCoordinator, ScanSummary};
