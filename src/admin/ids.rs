use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::idgen::{read_header, IdOpenOptions, IdentifierSpace, ID_FILE_FORMAT_VERSION};
use crate::primitives::io::StdFileIo;
use crate::storage::RecordAccess;
use crate::types::StoreKind;

use crate::admin::error::{ensure_exists, Result};

/// Header contents of an identifier file.
#[derive(Clone, Debug, Serialize)]
pub struct IdFileReport {
    /// File inspected.
    pub path: PathBuf,
    /// Format version.
    pub format_version: u16,
    /// Whether the sticky marker is set.
    pub sticky: bool,
    /// Exclusive upper bound of ever-allocated ids.
    pub high_id: u64,
    /// Free ids persisted after the header.
    pub free_count: u64,
}

/// Outcome of a recovery or rebuild.
#[derive(Clone, Debug, Serialize)]
pub struct IdRecoveryReport {
    /// File recovered.
    pub path: PathBuf,
    /// Whether the file was clean before recovery.
    pub was_clean: bool,
    /// Free ids listed on disk that were not trusted.
    pub discarded: u64,
    /// High id after recovery.
    pub high_id: u64,
    /// Free ids after recovery.
    pub free_count: u64,
}

/// Creates a clean identifier file.
///
/// # Errors
///
/// Returns an error if the file already exists.
pub fn create_ids(path: impl AsRef<Path>, high_id: u64) -> Result<IdFileReport> {
    let path = path.as_ref();
    IdentifierSpace::create(path, high_id)?;
    inspect_ids(path)
}

/// Reads an identifier file's header without marking it open.
///
/// # Errors
///
/// Returns an error if the file is missing or its header is corrupt.
pub fn inspect_ids(path: impl AsRef<Path>) -> Result<IdFileReport> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let io = StdFileIo::open_read_only(path)?;
    let header = read_header(&io)?;
    Ok(IdFileReport {
        path: path.to_path_buf(),
        format_version: ID_FILE_FORMAT_VERSION,
        sticky: header.sticky,
        high_id: header.high_id,
        free_count: header.free_count,
    })
}

/// Brings an identifier file back to a clean state.
///
/// A file left sticky by an unclean shutdown loses its free list: the
/// generator is deleted, the space is made ok with allocation continuing
/// from the high id, and the file is closed cleanly. A clean file is only
/// reopened and closed.
pub fn recover_ids(path: impl AsRef<Path>, store_high_id: Option<u64>) -> Result<IdRecoveryReport> {
    let path = path.as_ref();
    let before = inspect_ids(path)?;
    let mut opts = IdOpenOptions::default();
    if let Some(high_id) = store_high_id {
        opts = opts.store_high_id(high_id);
    }
    let mut space = IdentifierSpace::open(path, opts)?;
    let was_clean = space.store_ok();
    if !was_clean {
        space.delete_id_generator()?;
        space.make_store_ok()?;
    }
    let report = IdRecoveryReport {
        path: path.to_path_buf(),
        was_clean,
        discarded: if was_clean { 0 } else { before.free_count },
        high_id: space.high_id(),
        free_count: space.free_count() as u64,
    };
    space.close()?;
    info!(
        path = %path.display(),
        was_clean,
        high_id = report.high_id,
        "admin.recover_ids"
    );
    Ok(report)
}

/// Rebuilds an identifier file's free list from a record store.
pub fn rebuild_ids(
    path: impl AsRef<Path>,
    store: &dyn RecordAccess,
    kind: StoreKind,
) -> Result<IdRecoveryReport> {
    let path = path.as_ref();
    let before = inspect_ids(path)?;
    let mut space = IdentifierSpace::open(path, IdOpenOptions::default())?;
    let was_clean = space.store_ok();
    let free = space.rebuild_free_ids(store, kind)?;
    let report = IdRecoveryReport {
        path: path.to_path_buf(),
        was_clean,
        discarded: if was_clean { 0 } else { before.free_count },
        high_id: space.high_id(),
        free_count: free,
    };
    space.close()?;
    Ok(report)
}
