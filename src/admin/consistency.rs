use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;
use tracing::info;

use crate::check::{
    CheckOptions, CollectingSink, CountingSink, Finding, FindingCounts, FindingSink,
    ScanCoordinator, ScanSummary,
};
use crate::index::IndexAccessors;
use crate::storage::{RecordAccess, StoreSnapshot};

use crate::admin::error::{ensure_exists, AdminError, Result};

/// How much checking a consistency run performs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyCheckMode {
    /// Skip checking; the run succeeds immediately.
    None,
    /// Scan every entity.
    Full,
}

impl FromStr for ConsistencyCheckMode {
    type Err = AdminError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "NONE" => Ok(ConsistencyCheckMode::None),
            "FULL" => Ok(ConsistencyCheckMode::Full),
            _ => Err(AdminError::UnknownCheckMode(name.to_string())),
        }
    }
}

impl fmt::Display for ConsistencyCheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConsistencyCheckMode::None => "none",
            ConsistencyCheckMode::Full => "full",
        })
    }
}

/// Complete report of a consistency run.
#[derive(Clone, Debug, Serialize)]
pub struct ConsistencyReport {
    /// The mode that was run.
    pub mode: ConsistencyCheckMode,
    /// Whether the run found no inconsistency and checked every entity.
    pub success: bool,
    /// Findings per kind.
    pub findings: FindingCounts,
    /// Statistics and per-entity errors of the scan.
    pub summary: ScanSummary,
}

/// Checks a store against its indexes, streaming findings to `sink`.
///
/// With [`ConsistencyCheckMode::None`] nothing is read and the report is
/// successful and empty.
pub fn check_consistency(
    store: &dyn RecordAccess,
    indexes: Option<&dyn IndexAccessors>,
    options: &CheckOptions,
    mode: ConsistencyCheckMode,
    sink: &dyn FindingSink,
) -> ConsistencyReport {
    if mode == ConsistencyCheckMode::None {
        return ConsistencyReport {
            mode,
            success: true,
            findings: FindingCounts::default(),
            summary: ScanSummary::default(),
        };
    }
    let counting = CountingSink::new(sink);
    let summary = ScanCoordinator::new(store, indexes, options).run(&counting);
    let findings = counting.counts();
    let success = findings.is_empty() && summary.errors.is_empty() && !summary.cancelled;
    info!(
        %mode,
        success,
        findings = findings.total(),
        "admin.check_consistency"
    );
    ConsistencyReport {
        mode,
        success,
        findings,
        summary,
    }
}

/// Loads a JSON store snapshot and checks it, returning findings ordered by
/// kind.
///
/// # Errors
///
/// Returns an error if the snapshot is missing or cannot be decoded.
pub fn check_snapshot(
    path: impl AsRef<Path>,
    options: &CheckOptions,
    mode: ConsistencyCheckMode,
) -> Result<(ConsistencyReport, Vec<Finding>)> {
    let sink = CollectingSink::new();
    let report = check_snapshot_with_sink(path, options, mode, &sink)?;
    Ok((report, sink.into_sorted()))
}

/// Loads a JSON store snapshot and checks it, handing each finding to `sink`
/// as soon as a worker produces it.
///
/// # Errors
///
/// Returns an error if the snapshot is missing or cannot be decoded.
pub fn check_snapshot_with_sink(
    path: impl AsRef<Path>,
    options: &CheckOptions,
    mode: ConsistencyCheckMode,
    sink: &dyn FindingSink,
) -> Result<ConsistencyReport> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let (store, indexes) = StoreSnapshot::load(path)?.into_parts()?;
    Ok(check_consistency(&store, Some(&indexes), options, mode, sink))
}
