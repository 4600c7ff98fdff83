//! Collecting SMART counters by scraping the output of `smartctl -a`.
//!
//! The text layout is the ATA attribute table: the raw value is the last
//! whitespace-separated field on an attribute's line. Other layouts simply
//! yield no counters.

use crate::error::SmartError;
use std::{
    io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, warn};

const POWER_ON_HOURS: &str = "Power_On_Hours";
const POWER_CYCLE_COUNT: &str = "Power_Cycle_Count";

/// Health counters of one drive; a field is `None` when it could not be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct SmartSnapshot {
    pub power_on_hours: Option<u64>,
    pub power_cycle_count: Option<u64>,
}

/// Somewhere to get raw SMART text for a device from.
pub(crate) trait SmartDataSource {
    /// Returns the raw diagnostic text for `device`, or `None` if there is none.
    fn collect(&self, device: &Path) -> Option<String>;

    fn snapshot(&self, device: &Path) -> Option<SmartSnapshot> {
        self.collect(device).map(|text| parse(&text))
    }
}

/// Runs the smartmontools `smartctl` executable.
#[derive(Debug, Clone)]
pub(crate) struct Smartctl {
    pub tool: PathBuf,
}

impl Smartctl {
    /// `<tool> -a <device>`, returning stdout on a zero exit status.
    pub(crate) fn run(&self, device: &Path) -> Result<String, SmartError> {
        let output = Command::new(&self.tool)
            .arg("-a")
            .arg(device)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => SmartError::ToolNotFound {
                    tool: self.tool.clone(),
                },
                _ => SmartError::Io {
                    tool: self.tool.clone(),
                    source,
                },
            })?;
        if !output.status.success() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr),
                "SMART tool exited unsuccessfully"
            );
            return Err(SmartError::ToolExecution {
                tool: self.tool.clone(),
                device: device.to_owned(),
                status: output.status,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl SmartDataSource for Smartctl {
    #[tracing::instrument(skip(self), fields(tool = ?self.tool))]
    fn collect(&self, device: &Path) -> Option<String> {
        match self.run(device) {
            Ok(text) => Some(text),
            Err(error) => {
                warn!(%error, "No SMART data");
                None
            }
        }
    }
}

/// Pulls power-on hours and power-cycle count out of `smartctl -a` text.
///
/// The last marker line with an integer raw value wins; lines without one
/// leave the field as it was.
pub(crate) fn parse(text: &str) -> SmartSnapshot {
    let mut snapshot = SmartSnapshot::default();
    for line in text.lines() {
        let field = if line.contains(POWER_ON_HOURS) {
            &mut snapshot.power_on_hours
        } else if line.contains(POWER_CYCLE_COUNT) {
            &mut snapshot.power_cycle_count
        } else {
            continue;
        };
        if let Some(value) = raw_value(line) {
            *field = Some(value);
        }
    }
    snapshot
}

fn raw_value(line: &str) -> Option<u64> {
    line.split_whitespace().last()?.parse().ok()
}
