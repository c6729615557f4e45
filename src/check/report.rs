use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::index::IndexDescriptor;
use crate::types::{EntityRef, PropId, PropValue};

/// Indicates how bad a finding is.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Suspicious but readable data.
    Warning,
    /// Records and indexes disagree.
    Error,
    /// A uniqueness guarantee is broken.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        })
    }
}

const KIND_COUNT: usize = 8;

/// The fixed taxonomy of inconsistencies a pass can report.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// The first record of a chain has a previous pointer.
    PropertyNotFirstInChain,
    /// A chain reaches a record that is not in use.
    PropertyNotInUse,
    /// A key appears more than once in a chain.
    PropertyKeyNotUniqueInChain,
    /// A chain loops back onto a visited record.
    PropertyChainCycle,
    /// A chain is longer than the configured bound.
    PropertyChainTooLong,
    /// A matching index has no entry for the entity.
    NotIndexed,
    /// A matching index holds the entity more than once.
    IndexedMultipleTimes,
    /// A unique index maps the entity's values to another entity.
    UniqueIndexNotUnique,
}

impl FindingKind {
    /// Every kind, in report order.
    pub const ALL: [FindingKind; KIND_COUNT] = [
        FindingKind::PropertyNotFirstInChain,
        FindingKind::PropertyNotInUse,
        FindingKind::PropertyKeyNotUniqueInChain,
        FindingKind::PropertyChainCycle,
        FindingKind::PropertyChainTooLong,
        FindingKind::NotIndexed,
        FindingKind::IndexedMultipleTimes,
        FindingKind::UniqueIndexNotUnique,
    ];

    /// Severity attached to every finding of this kind.
    pub fn severity(self) -> Severity {
        match self {
            FindingKind::PropertyChainTooLong => Severity::Warning,
            FindingKind::UniqueIndexNotUnique => Severity::Critical,
            _ => Severity::Error,
        }
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            FindingKind::PropertyNotFirstInChain => "property_not_first_in_chain",
            FindingKind::PropertyNotInUse => "property_not_in_use",
            FindingKind::PropertyKeyNotUniqueInChain => "property_key_not_unique_in_chain",
            FindingKind::PropertyChainCycle => "property_chain_cycle",
            FindingKind::PropertyChainTooLong => "property_chain_too_long",
            FindingKind::NotIndexed => "not_indexed",
            FindingKind::IndexedMultipleTimes => "indexed_multiple_times",
            FindingKind::UniqueIndexNotUnique => "unique_index_not_unique",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single inconsistency tied to the entity whose check found it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// What is wrong.
    pub kind: FindingKind,
    /// How bad it is.
    pub severity: Severity,
    /// Entity whose check produced the finding.
    pub entity: EntityRef,
    /// Offending property record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_record: Option<u64>,
    /// Offending property key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_key: Option<PropId>,
    /// Index rule involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexDescriptor>,
    /// Observed entry or record count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_count: Option<u64>,
    /// Value tuple queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<PropValue>>,
    /// Other entity an index maps the values to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_entity: Option<u64>,
}

impl Finding {
    fn new(kind: FindingKind, entity: EntityRef) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            entity,
            property_record: None,
            property_key: None,
            index: None,
            observed_count: None,
            values: None,
            other_entity: None,
        }
    }

    /// The chain head `record` has a previous pointer.
    pub fn property_not_first_in_chain(entity: EntityRef, record: u64) -> Self {
        Self {
            property_record: Some(record),
            ..Self::new(FindingKind::PropertyNotFirstInChain, entity)
        }
    }

    /// The chain reaches `record`, which is not in use.
    pub fn property_not_in_use(entity: EntityRef, record: u64) -> Self {
        Self {
            property_record: Some(record),
            ..Self::new(FindingKind::PropertyNotInUse, entity)
        }
    }

    /// `key` reappears in `record`.
    pub fn property_key_not_unique(entity: EntityRef, record: u64, key: PropId) -> Self {
        Self {
            property_record: Some(record),
            property_key: Some(key),
            ..Self::new(FindingKind::PropertyKeyNotUniqueInChain, entity)
        }
    }

    /// The chain points back at `record`.
    pub fn property_chain_cycle(entity: EntityRef, record: u64) -> Self {
        Self {
            property_record: Some(record),
            ..Self::new(FindingKind::PropertyChainCycle, entity)
        }
    }

    /// The chain was cut off after `records` records.
    pub fn property_chain_too_long(entity: EntityRef, records: u64) -> Self {
        Self {
            observed_count: Some(records),
            ..Self::new(FindingKind::PropertyChainTooLong, entity)
        }
    }

    /// `index` holds no entry for the entity's `values`.
    pub fn not_indexed(entity: EntityRef, index: &IndexDescriptor, values: &[PropValue]) -> Self {
        Self {
            index: Some(index.clone()),
            values: Some(values.to_vec()),
            observed_count: Some(0),
            ..Self::new(FindingKind::NotIndexed, entity)
        }
    }

    /// `index` holds the entity's `values` `count` times.
    pub fn indexed_multiple_times(
        entity: EntityRef,
        index: &IndexDescriptor,
        values: &[PropValue],
        count: u64,
    ) -> Self {
        Self {
            index: Some(index.clone()),
            values: Some(values.to_vec()),
            observed_count: Some(count),
            ..Self::new(FindingKind::IndexedMultipleTimes, entity)
        }
    }

    /// Unique `index` maps the entity's `values` to `other`.
    pub fn unique_index_not_unique(
        entity: EntityRef,
        index: &IndexDescriptor,
        values: &[PropValue],
        other: u64,
    ) -> Self {
        Self {
            index: Some(index.clone()),
            values: Some(values.to_vec()),
            other_entity: Some(other),
            ..Self::new(FindingKind::UniqueIndexNotUnique, entity)
        }
    }

    fn sort_key(&self) -> (FindingKind, EntityRef, Option<u64>, Option<u64>, Option<PropId>, Option<u64>) {
        (
            self.kind,
            self.entity,
            self.index.as_ref().map(|index| index.id().0),
            self.property_record,
            self.property_key,
            self.other_entity,
        )
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.severity, self.kind, self.entity)?;
        if let Some(record) = self.property_record {
            write!(f, " property record {record}")?;
        }
        if let Some(key) = self.property_key {
            write!(f, " key {key}")?;
        }
        if let Some(index) = &self.index {
            write!(f, " {index}")?;
        }
        if let Some(values) = &self.values {
            f.write_str(" values (")?;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
            f.write_str(")")?;
        }
        if let Some(other) = self.other_entity {
            write!(f, " also maps to {other}")?;
        }
        if let Some(count) = self.observed_count {
            write!(f, " count {count}")?;
        }
        Ok(())
    }
}

/// Orders findings by kind, then entity, so two passes compare equal
/// regardless of worker interleaving.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

/// Streaming destination for findings. Called concurrently from workers.
pub trait FindingSink: Send + Sync {
    /// Accepts one finding.
    fn report(&self, finding: Finding);
}

/// Keeps every finding in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    findings: Mutex<Vec<Finding>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of findings received.
    pub fn len(&self) -> usize {
        self.findings.lock().len()
    }

    /// Returns whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes the sink, returning findings in arrival order.
    pub fn into_findings(self) -> Vec<Finding> {
        self.findings.into_inner()
    }

    /// Consumes the sink, returning findings ordered by kind.
    pub fn into_sorted(self) -> Vec<Finding> {
        let mut findings = self.into_findings();
        sort_findings(&mut findings);
        findings
    }
}

impl FindingSink for CollectingSink {
    fn report(&self, finding: Finding) {
        self.findings.lock().push(finding);
    }
}

/// Forwards findings over a channel.
pub struct ChannelSink {
    tx: Sender<Finding>,
}

impl ChannelSink {
    /// Wraps the sending half of a channel.
    pub fn new(tx: Sender<Finding>) -> Self {
        Self { tx }
    }
}

impl FindingSink for ChannelSink {
    fn report(&self, finding: Finding) {
        if self.tx.send(finding).is_err() {
            debug!("check.sink.receiver_closed");
        }
    }
}

/// Finding totals per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FindingCounts {
    /// Non-zero counts keyed by kind.
    pub by_kind: BTreeMap<FindingKind, u64>,
}

impl FindingCounts {
    /// Count for one kind.
    pub fn get(&self, kind: FindingKind) -> u64 {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Sum over all kinds.
    pub fn total(&self) -> u64 {
        self.by_kind.values().sum()
    }

    /// Returns whether no finding was counted.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Tallies a slice of findings.
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            *counts.by_kind.entry(finding.kind).or_insert(0) += 1;
        }
        counts
    }
}

/// Counts findings per kind and forwards them to another sink.
pub struct CountingSink<'a> {
    inner: &'a dyn FindingSink,
    counts: [AtomicU64; KIND_COUNT],
}

impl<'a> CountingSink<'a> {
    /// Wraps `inner`.
    pub fn new(inner: &'a dyn FindingSink) -> Self {
        Self {
            inner,
            counts: Default::default(),
        }
    }

    /// Snapshot of the counters.
    pub fn counts(&self) -> FindingCounts {
        let mut counts = FindingCounts::default();
        for kind in FindingKind::ALL {
            let n = self.counts[kind.slot()].load(Ordering::Relaxed);
            if n > 0 {
                counts.by_kind.insert(kind, n);
            }
        }
        counts
    }
}

impl FindingSink for CountingSink<'_> {
    fn report(&self, finding: Finding) {
        self.counts[finding.kind.slot()].fetch_add(1, Ordering::Relaxed);
        self.inner.report(finding);
    }
}
