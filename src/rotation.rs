//! Spindle speed of a drive, as reported by the host.

use crate::catalog::DeviceInfoProvider;
use std::{fmt, path::Path};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rotation {
    Rpm(u32),
    /// The host answered but reported no speed, which is what solid-state media do.
    NotApplicable,
    /// The host could not be asked.
    Unknown,
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rotation::Rpm(rpm) => write!(f, "{rpm}"),
            Rotation::NotApplicable => f.write_str("N/A"),
            Rotation::Unknown => f.write_str("Unknown"),
        }
    }
}

pub(crate) fn lookup(provider: &impl DeviceInfoProvider, drive: &Path) -> Rotation {
    match provider.rpm_of(drive) {
        Ok(Some(rpm)) if rpm > 0 => Rotation::Rpm(rpm),
        Ok(_) => Rotation::NotApplicable,
        Err(error) => {
            warn!(%error, "RPM query failed");
            Rotation::Unknown
        }
    }
}
