use std::path::{Path, PathBuf};

use crate::types::PenumbraError;
use thiserror::Error;

/// Failures of the administrative entry points.
#[derive(Debug, Error)]
pub enum AdminError {
    /// A store snapshot or identifier file that should exist does not.
    #[error("file not found: {0}")]
    MissingFile(PathBuf),
    /// Check mode name outside the supported set.
    #[error("Unknown consistency check name: {0}. Supported values: NONE, FULL")]
    UnknownCheckMode(String),
    /// Failure raised by the identifier or checking layers.
    #[error(transparent)]
    Core(#[from] PenumbraError),
    /// Filesystem failure outside those layers.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for administrative operations.
pub type Result<T> = std::result::Result<T, AdminError>;

pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(AdminError::MissingFile(path.to_path_buf()))
    }
}
