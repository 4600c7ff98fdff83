//! Timed sequential write and read of the benchmark file.

use crate::{error::ProbeError, PROGRESS_STYLE};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn, Span};
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub(crate) const TEMP_DIR: &str = "temp";
pub(crate) const FILE_NAME: &str = "test_file.bin";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Bytes moved during one timed transfer, and how long it took.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Measurement {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl Measurement {
    pub(crate) fn mbps(&self) -> f64 {
        // A transfer fast enough to round down to zero still took some time.
        let secs = self.elapsed.max(Duration::from_nanos(1)).as_secs_f64();
        self.bytes as f64 / secs / BYTES_PER_MB
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ReadOutcome {
    pub measurement: Measurement,
    /// Number of blocks that differed from the payload, if verification was requested.
    pub mismatched_blocks: Option<usize>,
}

/// The benchmark file at `<partition>/temp/test_file.bin`.
///
/// Dropping it removes the file, and the `temp` directory too if this
/// instance had to create it.
#[derive(Debug)]
pub(crate) struct BenchFile {
    path: PathBuf,
    created_dir: Option<PathBuf>,
}

impl BenchFile {
    pub(crate) fn prepare(partition: &Path) -> Result<Self, ProbeError> {
        let dir = partition.join(TEMP_DIR);
        let created_dir = if dir.is_dir() {
            None
        } else {
            fs::create_dir_all(&dir).map_err(|e| ProbeError::classify(&dir, e))?;
            Some(dir.clone())
        };
        let path = dir.join(FILE_NAME);
        if path.exists() {
            warn!(?path, "Removing benchmark file left over from an earlier run");
            fs::remove_file(&path).map_err(|e| ProbeError::classify(&path, e))?;
        }
        Ok(Self { path, created_dir })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BenchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Removed benchmark file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(%error, path = ?self.path, "Could not remove benchmark file"),
        }
        if let Some(dir) = &self.created_dir {
            if let Err(error) = fs::remove_dir(dir) {
                debug!(%error, ?dir, "Leaving temp directory in place");
            }
        }
    }
}

/// Writes `payload` to a freshly created file at `path` and times it,
/// including the final flush to the device.
#[tracing::instrument(
    name = "write probe",
    skip(payload, block_size),
    fields(bytes = payload.len())
)]
pub(crate) fn write(
    path: &Path,
    payload: &[u8],
    block_size: usize,
) -> Result<Measurement, ProbeError> {
    let err = |e: io::Error| ProbeError::classify(path, e);
    Span::current().pb_set_style(&PROGRESS_STYLE);
    Span::current().pb_set_length(payload.len() as u64);

    let start = Instant::now();
    let mut out = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(err)?;
    for chunk in payload.chunks(block_size.max(1)) {
        out.write_all(chunk).map_err(err)?;
        Span::current().pb_inc(chunk.len() as u64);
    }
    out.flush().map_err(err)?;
    out.sync_all().map_err(err)?;
    let elapsed = start.elapsed();

    Ok(Measurement {
        bytes: payload.len() as u64,
        elapsed,
    })
}

/// Reads the file at `path` to completion and times it. With `expected`, every
/// block read is compared against the corresponding part of that buffer.
#[tracing::instrument(name = "read probe", skip(block_size, expected))]
pub(crate) fn read(
    path: &Path,
    block_size: usize,
    expected: Option<&[u8]>,
) -> Result<ReadOutcome, ProbeError> {
    let err = |e: io::Error| ProbeError::classify(path, e);
    Span::current().pb_set_style(&PROGRESS_STYLE);
    if let Ok(meta) = fs::metadata(path) {
        Span::current().pb_set_length(meta.len());
    }

    let mut compare = expected.map(CompareWriter::new);
    let mut buf = vec![0; block_size.max(1)];
    let mut bytes = 0u64;

    let start = Instant::now();
    let mut input = File::open(path).map_err(err)?;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(err(e)),
        };
        if let Some(compare) = compare.as_mut() {
            compare.write_all(&buf[..n]).map_err(err)?;
        }
        bytes += n as u64;
        Span::current().pb_inc(n as u64);
    }
    let elapsed = start.elapsed();

    let mismatched_blocks = compare.map(|c| c.finish());
    if let Some(mismatched) = mismatched_blocks.filter(|m| *m > 0) {
        error!(?path, mismatched, "Read back data that differs from what was written");
    }
    Ok(ReadOutcome {
        measurement: Measurement { bytes, elapsed },
        mismatched_blocks,
    })
}

/// The two timed transfers, so the engine can be run against something other
/// than the real filesystem.
pub(crate) trait Prober {
    fn write(&self, path: &Path, payload: &[u8], block_size: usize)
        -> Result<Measurement, ProbeError>;

    fn read(
        &self,
        path: &Path,
        block_size: usize,
        expected: Option<&[u8]>,
    ) -> Result<ReadOutcome, ProbeError>;
}

/// Probes using [write] and [read].
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FileProber;

impl Prober for FileProber {
    fn write(
        &self,
        path: &Path,
        payload: &[u8],
        block_size: usize,
    ) -> Result<Measurement, ProbeError> {
        write(path, payload, block_size)
    }

    fn read(
        &self,
        path: &Path,
        block_size: usize,
        expected: Option<&[u8]>,
    ) -> Result<ReadOutcome, ProbeError> {
        read(path, block_size, expected)
    }
}

/// Pretends to be [io::Write] by comparing everything written to it against
/// an expected buffer, one incoming block at a time.
#[derive(Debug)]
struct CompareWriter<'a> {
    expected: &'a [u8],
    mismatched: usize,
    current_offset: usize,
}

impl<'a> CompareWriter<'a> {
    fn new(expected: &'a [u8]) -> Self {
        Self {
            expected,
            mismatched: 0,
            current_offset: 0,
        }
    }

    /// Number of mismatched blocks; a short read counts as one more.
    fn finish(self) -> usize {
        if self.current_offset < self.expected.len() {
            warn!(
                read = self.current_offset,
                expected = self.expected.len(),
                "Read back fewer bytes than were written"
            );
            self.mismatched + 1
        } else {
            self.mismatched
        }
    }
}

impl io::Write for CompareWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.current_offset.min(self.expected.len());
        let end = (self.current_offset + buf.len()).min(self.expected.len());
        if &self.expected[start..end] != buf {
            warn!(
                offset = self.current_offset,
                "Did not read back the exact bytes written"
            );
            self.mismatched += 1;
        }
        self.current_offset += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::payload;
    use tracing_test::traced_test;

    #[test]
    fn throughput_in_mebibytes_per_second() {
        let m = Measurement {
            bytes: 100 * 1024 * 1024,
            elapsed: Duration::from_secs(2),
        };
        assert_eq!(m.mbps(), 50.0);
    }

    #[test]
    fn zero_elapsed_is_finite() {
        let m = Measurement {
            bytes: 1024,
            elapsed: Duration::ZERO,
        };
        assert!(m.mbps().is_finite());
        assert!(m.mbps() > 0.0);
    }

    #[traced_test]
    #[test]
    fn write_then_read_round_trips() {
        let partition = tempfile::tempdir().unwrap();
        let data = payload::random(256 * 1024 + 17, Some(3));
        let file = BenchFile::prepare(partition.path()).unwrap();

        let written = write(file.path(), &data, 4096).unwrap();
        assert_eq!(written.bytes, data.len() as u64);
        assert_eq!(fs::read(file.path()).unwrap(), data);

        let read_back = read(file.path(), 4096, Some(&data[..])).unwrap();
        assert_eq!(read_back.measurement.bytes, data.len() as u64);
        assert_eq!(read_back.mismatched_blocks, Some(0));
        assert!(read_back.measurement.mbps() >= 0.0);
    }

    #[test]
    fn bench_file_cleans_up_after_itself() {
        let partition = tempfile::tempdir().unwrap();
        for _ in 0..2 {
            let file = BenchFile::prepare(partition.path()).unwrap();
            assert_eq!(
                file.path(),
                partition.path().join("temp").join("test_file.bin")
            );
            write(file.path(), &[1; 1024], 512).unwrap();
            read(file.path(), 512, None).unwrap();
            drop(file);
            assert!(!partition.path().join("temp").exists());
        }
    }

    #[test]
    fn existing_temp_dir_is_kept() {
        let partition = tempfile::tempdir().unwrap();
        let temp = partition.path().join("temp");
        fs::create_dir(&temp).unwrap();
        fs::write(temp.join("unrelated"), b"keep me").unwrap();

        let file = BenchFile::prepare(partition.path()).unwrap();
        write(file.path(), &[7; 64], 16).unwrap();
        drop(file);

        assert!(!temp.join("test_file.bin").exists());
        assert!(temp.join("unrelated").exists());
    }

    #[traced_test]
    #[test]
    fn stale_file_is_replaced() {
        let partition = tempfile::tempdir().unwrap();
        let temp = partition.path().join("temp");
        fs::create_dir(&temp).unwrap();
        fs::write(temp.join("test_file.bin"), b"stale").unwrap();

        let file = BenchFile::prepare(partition.path()).unwrap();
        assert!(write(file.path(), &[1; 10], 4).is_ok());
        assert!(logs_contain("left over"));
    }

    #[test]
    fn write_failure_leaves_no_file() {
        let partition = tempfile::tempdir().unwrap();
        // A regular file where the partition should be: nothing can be created below it.
        let not_a_dir = partition.path().join("plain-file");
        fs::write(&not_a_dir, b"").unwrap();

        let err = BenchFile::prepare(&not_a_dir).unwrap_err();
        assert!(!err.is_permission_denied());
        assert!(!not_a_dir.join("temp").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unwritable_partition_is_permission_denied() {
        // sysfs refuses mkdir even for root.
        let sys = Path::new("/sys");
        if !sys.join("kernel").is_dir() {
            return;
        }
        let err = BenchFile::prepare(sys).unwrap_err();
        assert!(err.is_permission_denied(), "{err}");
        assert!(!sys.join("temp").exists());
    }

    #[test]
    fn read_of_missing_file_is_an_error() {
        let partition = tempfile::tempdir().unwrap();
        let err = read(&partition.path().join("nope.bin"), 512, None).unwrap_err();
        assert!(matches!(err, ProbeError::Io { .. }));
    }

    #[traced_test]
    #[test]
    fn detects_issues() {
        let input: Vec<u8> = vec![1; 1024 * 1024];
        let mut read_back: Vec<u8> = vec![1; 1024 * 1024];
        read_back[1024 * 512] = 255; // corrupt our read-back data
        let mut read_back = io::Cursor::new(read_back);

        let mut compare = CompareWriter::new(&input);
        io::copy(&mut read_back, &mut compare).expect("No io errors");
        assert_eq!(compare.finish(), 1);
    }

    #[traced_test]
    #[test]
    fn short_read_back_is_a_mismatch() {
        let input: Vec<u8> = vec![1; 4096];
        let mut compare = CompareWriter::new(&input);
        compare.write_all(&[1; 1024]).unwrap();
        assert_eq!(compare.finish(), 1);
    }
}
