//! The Linux host: block-utils (udev) for drives, sysfs for partitions,
//! mountinfo for mount points, udev's by-label links for labels and
//! `smartctl -i` for spindle speed.

extern crate block_utils;
use crate::{
    catalog::{DeviceInfoProvider, Partition},
    error::{CatalogError, LabelQueryError, RpmQueryError},
};
use std::{
    fs, io,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::debug;

#[derive(Debug, Clone)]
pub(crate) struct LinuxHost {
    sys_block: PathBuf,
    mountinfo: PathBuf,
    by_label: PathBuf,
    smartctl: PathBuf,
}

impl LinuxHost {
    pub(crate) fn new(smartctl: PathBuf) -> Self {
        Self {
            sys_block: PathBuf::from("/sys/block"),
            mountinfo: PathBuf::from("/proc/self/mountinfo"),
            by_label: PathBuf::from("/dev/disk/by-label"),
            smartctl,
        }
    }

    /// Drops virtual devices and drives without media (size 0), sorted by path.
    fn physical_drives(&self, devices: Vec<PathBuf>) -> Vec<PathBuf> {
        let mut drives: Vec<PathBuf> = devices
            .into_iter()
            .filter(|device| {
                let Some(name) = device.file_name().and_then(|n| n.to_str()) else {
                    return false;
                };
                !should_skip_block_device(name)
                    && sectors(&self.sys_block.join(name)) != Some(0)
            })
            .collect();
        drives.sort();
        drives.dedup();
        drives
    }

    fn spindle_speed(&self, drive: &Path) -> Result<Option<u32>, String> {
        let (_, device) = block_utils::get_device_from_path(drive).map_err(|e| e.to_string())?;
        let device = device.ok_or_else(|| "not a block device".to_string())?;
        if device.media_type != block_utils::MediaType::Rotational {
            debug!(?device.media_type, ?drive, "Not a spinning disk");
            return Ok(None);
        }
        let output = Command::new(&self.smartctl)
            .arg("-i")
            .arg(drive)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| format!("running {:?}: {e}", self.smartctl))?;
        if !output.status.success() {
            return Err(format!("{:?} exited with {}", self.smartctl, output.status));
        }
        Ok(parse_rotation_rate(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl DeviceInfoProvider for LinuxHost {
    fn list_drives(&self) -> Result<Vec<PathBuf>, CatalogError> {
        let devices = block_utils::get_block_devices()
            .map_err(|e| CatalogError::Enumeration(e.to_string()))?;
        Ok(self.physical_drives(devices))
    }

    fn partitions_of(&self, drive: &Path) -> Result<Vec<Partition>, CatalogError> {
        let enumeration = |e: io::Error| CatalogError::Enumeration(format!("{drive:?}: {e}"));
        let name = drive
            .file_name()
            .ok_or_else(|| CatalogError::Enumeration(format!("invalid device path {drive:?}")))?;
        let mountinfo = fs::read_to_string(&self.mountinfo).map_err(enumeration)?;
        let mounts = parse_mountinfo(&mountinfo);
        let candidates =
            partition_candidates(&self.sys_block.join(name)).map_err(enumeration)?;
        Ok(candidates
            .into_iter()
            .filter_map(|device| {
                let mount_point = mount_point_of(&device, &mounts)?;
                Some(Partition {
                    mount_point,
                    device,
                })
            })
            .collect())
    }

    fn label_of(&self, partition: &Partition) -> Result<Option<String>, LabelQueryError> {
        let failed = |e: io::Error| LabelQueryError {
            device: partition.device.clone(),
            reason: e.to_string(),
        };
        let entries = match fs::read_dir(&self.by_label) {
            Ok(entries) => entries,
            // udev only creates the directory once some volume has a label.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(failed(e)),
        };
        let device =
            fs::canonicalize(&partition.device).unwrap_or_else(|_| partition.device.clone());
        for entry in entries {
            let entry = entry.map_err(failed)?;
            let Ok(target) = fs::canonicalize(entry.path()) else {
                continue;
            };
            if target == device {
                return Ok(Some(unescape_udev(&entry.file_name().to_string_lossy())));
            }
        }
        Ok(None)
    }

    fn rpm_of(&self, drive: &Path) -> Result<Option<u32>, RpmQueryError> {
        self.spindle_speed(drive).map_err(|reason| RpmQueryError {
            drive: drive.to_owned(),
            reason,
        })
    }
}

/// `/sys/block/<dev>/size`, in 512-byte sectors.
fn sectors(sys_block_dev_dir: &Path) -> Option<u64> {
    fs::read_to_string(sys_block_dev_dir.join("size"))
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn should_skip_block_device(name: &str) -> bool {
    name.starts_with("loop")
        || name.starts_with("ram")
        || name.starts_with("zram")
        || name.starts_with("dm-")
        || name.starts_with("md")
        || name.starts_with("sr")
}

/// Device nodes that may carry a filesystem: the whole disk first, then its
/// partitions by name.
fn partition_candidates(sys_disk_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let dev = Path::new("/dev");
    let mut children: Vec<String> = fs::read_dir(sys_disk_dir)?
        .flatten()
        .filter(|entry| entry.path().join("partition").is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    children.sort();

    let mut candidates = Vec::with_capacity(children.len() + 1);
    if let Some(disk) = sys_disk_dir.file_name() {
        candidates.push(dev.join(disk));
    }
    candidates.extend(children.into_iter().map(|child| dev.join(child)));
    Ok(candidates)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MountEntry {
    source: PathBuf,
    mount_point: PathBuf,
}

/// Parses `/proc/self/mountinfo`:
/// `<id> <parent> <maj:min> <root> <mount point> <opts...> - <fstype> <source> <superopts>`.
fn parse_mountinfo(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let (pre, post) = line.split_once(" - ")?;
            let mount_point = pre.split_whitespace().nth(4)?;
            let source = post.split_whitespace().nth(1)?;
            Some(MountEntry {
                source: PathBuf::from(unescape_mount_path(source)),
                mount_point: PathBuf::from(unescape_mount_path(mount_point)),
            })
        })
        .collect()
}

fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

/// The first mount point of `device`, following symlinked sources such as
/// `/dev/disk/by-uuid/...`.
fn mount_point_of(device: &Path, mounts: &[MountEntry]) -> Option<PathBuf> {
    mounts
        .iter()
        .find(|m| {
            m.source == device
                || (m.source.is_absolute()
                    && fs::canonicalize(&m.source).is_ok_and(|source| source == device))
        })
        .map(|m| m.mount_point.clone())
}

/// udev encodes unsafe characters in link names as `\xHH`.
fn unescape_udev(raw: &str) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut rest = raw.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'\\' && tail.len() >= 3 && tail[0] == b'x' {
            let decoded = std::str::from_utf8(&tail[1..3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                bytes.push(byte);
                rest = &tail[3..];
                continue;
            }
        }
        bytes.push(first);
        rest = tail;
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Reads the `Rotation Rate:` line of `smartctl -i`.
fn parse_rotation_rate(text: &str) -> Option<u32> {
    let rate = text
        .lines()
        .find_map(|line| line.trim().strip_prefix("Rotation Rate:"))?;
    rate.split_whitespace().next()?.parse().ok()
}
