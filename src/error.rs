//! Failure taxonomy of the benchmark engine.
//!
//! Only [CatalogError] is fatal to a run; everything else is caught at the
//! device-test boundary and degraded into a placeholder on the report.

use std::{io, path::PathBuf, process::ExitStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub(crate) enum CatalogError {
    #[error("Could not enumerate storage devices: {0}")]
    Enumeration(String),

    #[error("No storage devices found.")]
    NoDevices,
}

#[derive(Error, Debug)]
#[error("Could not query the volume label of {device:?}: {reason}")]
pub(crate) struct LabelQueryError {
    pub device: PathBuf,
    pub reason: String,
}

#[derive(Error, Debug)]
#[error("Could not query the spindle speed of {drive:?}: {reason}")]
pub(crate) struct RpmQueryError {
    pub drive: PathBuf,
    pub reason: String,
}

#[derive(Error, Debug)]
pub(crate) enum ProbeError {
    #[error("Permission denied on {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// errno for "Read-only file system" on the platforms we care about.
const EROFS: i32 = 30;

impl ProbeError {
    /// Sorts an I/O failure into a permission problem or everything else.
    pub(crate) fn classify(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::PermissionDenied || source.raw_os_error() == Some(EROFS)
        {
            ProbeError::PermissionDenied { path }
        } else {
            ProbeError::Io { path, source }
        }
    }

    pub(crate) fn is_permission_denied(&self) -> bool {
        matches!(self, ProbeError::PermissionDenied { .. })
    }
}

#[derive(Error, Debug)]
pub(crate) enum SmartError {
    #[error("{tool:?} not found. Make sure smartmontools is installed and in your PATH.")]
    ToolNotFound { tool: PathBuf },

    #[error("{tool:?} failed for {device:?}: {status}")]
    ToolExecution {
        tool: PathBuf,
        device: PathBuf,
        status: ExitStatus,
    },

    #[error("Could not run {tool:?}: {source}")]
    Io {
        tool: PathBuf,
        #[source]
        source: io::Error,
    },
}
