use crate::{
    catalog::{DeviceInfoProvider, Partition},
    error::{CatalogError, LabelQueryError, RpmQueryError},
};
use std::path::{Path, PathBuf};

/// Stand-in host for platforms without a device enumeration backend.
#[derive(Debug, Clone)]
pub(crate) struct OtherHost;

impl OtherHost {
    pub(crate) fn new(_smartctl: PathBuf) -> Self {
        Self
    }
}

const UNSUPPORTED: &str = "device enumeration is not implemented on this platform";

impl DeviceInfoProvider for OtherHost {
    fn list_drives(&self) -> Result<Vec<PathBuf>, CatalogError> {
        Err(CatalogError::Enumeration(UNSUPPORTED.to_string()))
    }

    fn partitions_of(&self, _drive: &Path) -> Result<Vec<Partition>, CatalogError> {
        Err(CatalogError::Enumeration(UNSUPPORTED.to_string()))
    }

    fn label_of(&self, partition: &Partition) -> Result<Option<String>, LabelQueryError> {
        Err(LabelQueryError {
            device: partition.device.clone(),
            reason: UNSUPPORTED.to_string(),
        })
    }

    fn rpm_of(&self, drive: &Path) -> Result<Option<u32>, RpmQueryError> {
        Err(RpmQueryError {
            drive: drive.to_owned(),
            reason: UNSUPPORTED.to_string(),
        })
    }
}
