//! Sequencing discovery, probing, RPM lookup and SMART collection per device.
//!
//! Devices are tested strictly one after another. Every per-device failure is
//! folded into the [DeviceReport]; only catalog discovery can fail a run.

use crate::{
    catalog::{self, Catalog, DeviceInfoProvider, Target},
    error::{CatalogError, ProbeError},
    format, payload,
    probe::{BenchFile, FileProber, Prober},
    rotation::{self, Rotation},
    smart::{SmartDataSource, SmartSnapshot},
};
use std::{fmt, thread, time::Duration};
use tracing::{debug, error, info, warn};

pub(crate) const DEFAULT_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;
pub(crate) const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
pub(crate) const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub(crate) struct EngineConfig {
    pub payload_size: usize,
    pub block_size: usize,
    /// Delay between two devices when testing several in a row.
    pub pause: Duration,
    pub seed: Option<u64>,
    pub verify: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    WriteProbing,
    ReadProbing,
    RpmLookup,
    SmartCollecting,
    Reporting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Throughput {
    Measured(f64),
    Unavailable,
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throughput::Measured(mbps) => f.write_str(&format::speed(*mbps)),
            Throughput::Unavailable => f.write_str("N/A"),
        }
    }
}

/// The outcome of testing one partition.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DeviceReport {
    pub target: Target,
    pub write: Throughput,
    pub read: Throughput,
    /// `None` if the device test was aborted before the lookup.
    pub rotation: Option<Rotation>,
    pub smart: Option<SmartSnapshot>,
    pub mismatched_blocks: Option<usize>,
    pub permission_denied: bool,
    pub error: Option<String>,
}

impl DeviceReport {
    fn new(target: Target) -> Self {
        Self {
            target,
            write: Throughput::Unavailable,
            read: Throughput::Unavailable,
            rotation: None,
            smart: None,
            mismatched_blocks: None,
            permission_denied: false,
            error: None,
        }
    }

    /// The spindle speed as shown to users: "N/A" when not looked up at all.
    pub(crate) fn rpm_display(&self) -> String {
        self.rotation
            .map(|r| r.to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }

    fn aborted(mut self, err: ProbeError) -> Self {
        if err.is_permission_denied() {
            error!(%err, "Permission denied. Unable to write to the selected partition.");
            self.permission_denied = true;
        } else {
            error!(%err, "Write test failed");
        }
        self.write = Throughput::Unavailable;
        self.read = Throughput::Unavailable;
        self.rotation = None;
        self.smart = None;
        self.error = Some(err.to_string());
        self
    }
}

/// Gets told about each device as its test starts and completes.
pub(crate) trait Reporter {
    fn started(&mut self, _target: &Target) {}

    fn finished(&mut self, report: &DeviceReport);
}

pub(crate) struct Engine<P, S, R = FileProber> {
    provider: P,
    smart: S,
    prober: R,
    config: EngineConfig,
}

impl<P, S> Engine<P, S> {
    pub(crate) fn new(provider: P, smart: S, config: EngineConfig) -> Self {
        Self {
            provider,
            smart,
            prober: FileProber,
            config,
        }
    }
}

impl<P: DeviceInfoProvider, S: SmartDataSource, R: Prober> Engine<P, S, R> {
    /// Swaps the filesystem probes for `prober`.
    #[cfg(test)]
    pub(crate) fn with_prober<Q: Prober>(self, prober: Q) -> Engine<P, S, Q> {
        Engine {
            provider: self.provider,
            smart: self.smart,
            prober,
            config: self.config,
        }
    }

    pub(crate) fn discover(&self) -> Result<Catalog, CatalogError> {
        catalog::discover(&self.provider)
    }

    /// Tests the given targets in order, pausing between them.
    pub(crate) fn run(
        &self,
        targets: &[Target],
        reporter: &mut impl Reporter,
    ) -> Vec<DeviceReport> {
        let mut reports = Vec::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            if i > 0 && !self.config.pause.is_zero() {
                thread::sleep(self.config.pause);
            }
            reporter.started(target);
            let report = self.test(target);
            reporter.finished(&report);
            reports.push(report);
        }
        reports
    }

    /// Runs the whole probe sequence for one partition.
    #[tracing::instrument(skip(self, target), fields(partition = %target))]
    pub(crate) fn test(&self, target: &Target) -> DeviceReport {
        let report = DeviceReport::new(target.clone());
        let file = match BenchFile::prepare(&target.partition.mount_point) {
            Ok(file) => file,
            Err(err) => return report.aborted(err),
        };

        debug!(stage = ?Stage::WriteProbing);
        let data = payload::random(self.config.payload_size, self.config.seed);
        let written = self.prober.write(file.path(), &data, self.config.block_size);
        let mut report = match written {
            Ok(m) => DeviceReport {
                write: Throughput::Measured(m.mbps()),
                ..report
            },
            Err(err) => return report.aborted(err),
        };
        info!(write = %report.write, "Write test done");

        debug!(stage = ?Stage::ReadProbing);
        let expected = self.config.verify.then_some(&data[..]);
        match self.prober.read(file.path(), self.config.block_size, expected) {
            Ok(outcome) => {
                report.read = Throughput::Measured(outcome.measurement.mbps());
                report.mismatched_blocks = outcome.mismatched_blocks;
                info!(read = %report.read, "Read test done");
            }
            Err(err) => {
                warn!(%err, "Read test failed");
                report.error = Some(err.to_string());
            }
        }
        drop(file);

        debug!(stage = ?Stage::RpmLookup);
        report.rotation = Some(rotation::lookup(&self.provider, &target.drive));

        debug!(stage = ?Stage::SmartCollecting);
        report.smart = self.smart.snapshot(&target.drive);

        debug!(stage = ?Stage::Reporting);
        report
    }
}
