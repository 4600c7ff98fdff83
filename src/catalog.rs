//! Which physical drives the host has, and which mounted partitions live on them.

use crate::error::{CatalogError, LabelQueryError, RpmQueryError};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// A mounted logical volume on some physical drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Partition {
    /// Where the volume is mounted; benchmark files go below this.
    pub mount_point: PathBuf,
    /// The block device node backing the volume.
    pub device: PathBuf,
}

/// Everything the engine needs to know from the host about its storage.
pub(crate) trait DeviceInfoProvider {
    /// Device handles of all physical drives.
    fn list_drives(&self) -> Result<Vec<PathBuf>, CatalogError>;

    /// Mounted partitions residing on `drive`, in a stable order.
    fn partitions_of(&self, drive: &Path) -> Result<Vec<Partition>, CatalogError>;

    /// The volume label, `None` or empty if the volume has none.
    fn label_of(&self, partition: &Partition) -> Result<Option<String>, LabelQueryError>;

    /// Reported spindle speed, `None` or zero for non-rotational media.
    fn rpm_of(&self, drive: &Path) -> Result<Option<u32>, RpmQueryError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VolumeLabel {
    Named(String),
    /// The host says the volume has no label.
    Unnamed,
    /// Asking the host for the label failed.
    Unknown,
}

impl fmt::Display for VolumeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeLabel::Named(name) => f.write_str(name),
            VolumeLabel::Unnamed => f.write_str("Unnamed Volume"),
            VolumeLabel::Unknown => f.write_str("Unknown"),
        }
    }
}

pub(crate) fn resolve_label(
    provider: &impl DeviceInfoProvider,
    partition: &Partition,
) -> VolumeLabel {
    match provider.label_of(partition) {
        Ok(Some(name)) if !name.is_empty() => VolumeLabel::Named(name),
        Ok(_) => VolumeLabel::Unnamed,
        Err(error) => {
            warn!(%error, "Label query failed");
            VolumeLabel::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PhysicalDrive {
    pub id: PathBuf,
    /// Label of the drive's first partition, which is what the drive is shown as.
    pub label: VolumeLabel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DriveEntry {
    pub drive: PhysicalDrive,
    pub partitions: Vec<Partition>,
}

/// One selectable thing to benchmark: a partition together with its drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Target {
    pub drive: PathBuf,
    pub label: VolumeLabel,
    pub partition: Partition,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.partition.mount_point.display(), self.label)
    }
}

/// The drive → partitions mapping, in host order. Drives without any mounted
/// partition never make it in here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Catalog {
    pub drives: Vec<DriveEntry>,
}

impl Catalog {
    pub(crate) fn targets(&self) -> Vec<Target> {
        self.drives
            .iter()
            .flat_map(|entry| {
                entry.partitions.iter().map(|partition| Target {
                    drive: entry.drive.id.clone(),
                    label: entry.drive.label.clone(),
                    partition: partition.clone(),
                })
            })
            .collect()
    }

    /// The target mounted at `mount_point`, if any.
    pub(crate) fn find(&self, mount_point: &Path) -> Option<Target> {
        self.targets()
            .into_iter()
            .find(|t| t.partition.mount_point == mount_point)
    }
}

/// Builds the catalog. Fails if drives cannot be listed at all, or if nothing
/// testable is left afterwards.
#[tracing::instrument(skip(provider))]
pub(crate) fn discover(provider: &impl DeviceInfoProvider) -> Result<Catalog, CatalogError> {
    let mut drives = Vec::new();
    for id in provider.list_drives()? {
        let partitions = match provider.partitions_of(&id) {
            Ok(partitions) => partitions,
            Err(error) => {
                warn!(%error, drive = ?id, "Skipping drive whose partitions can't be listed");
                continue;
            }
        };
        let Some(first) = partitions.first() else {
            debug!(drive = ?id, "Drive has no mounted partitions");
            continue;
        };
        let label = resolve_label(provider, first);
        drives.push(DriveEntry {
            drive: PhysicalDrive { id, label },
            partitions,
        });
    }
    if drives.is_empty() {
        return Err(CatalogError::NoDevices);
    }
    Ok(Catalog { drives })
}
