//! The interactive console front end: a numbered device menu over the engine.

use crate::{
    catalog::{DeviceInfoProvider, Target},
    engine::{DeviceReport, Engine, Reporter},
    smart::SmartDataSource,
};
use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Choice {
    Target(usize),
    All,
    Exit,
}

/// Interprets a 1-based menu selection: the targets, then "test all", then "exit".
pub(crate) fn parse_choice(input: &str, targets: usize) -> Option<Choice> {
    let n: usize = input.trim().parse().ok()?;
    match n.checked_sub(1)? {
        i if i < targets => Some(Choice::Target(i)),
        i if i == targets => Some(Choice::All),
        i if i == targets + 1 => Some(Choice::Exit),
        _ => None,
    }
}

pub(crate) fn print_targets(targets: &[Target], out: &mut impl Write) -> io::Result<()> {
    for (i, target) in targets.iter().enumerate() {
        writeln!(out, "{}: {target}", i + 1)?;
    }
    Ok(())
}

/// Prints each device's results as soon as its test completes.
struct ConsoleReporter<'w, W: Write> {
    out: &'w mut W,
    failed: Option<io::Error>,
}

impl<W: Write> ConsoleReporter<'_, W> {
    fn try_finished(&mut self, report: &DeviceReport) -> io::Result<()> {
        let out = &mut self.out;
        if report.permission_denied {
            writeln!(out, "Permission denied. Unable to write to the selected partition.")?;
        } else if let Some(error) = &report.error {
            writeln!(out, "Test failed: {error}")?;
        }
        writeln!(out, "Write speed: {}", report.write)?;
        writeln!(out, "Read speed: {}", report.read)?;
        if let Some(mismatched) = report.mismatched_blocks {
            writeln!(out, "Mismatched blocks: {mismatched}")?;
        }
        writeln!(out, "Drive RPM: {}", report.rpm_display())?;
        if let Some(smart) = &report.smart {
            let hours = smart
                .power_on_hours
                .map_or_else(|| "Unknown".to_string(), |h| format!("{h} hours"));
            let cycles = smart
                .power_cycle_count
                .map_or_else(|| "Unknown".to_string(), |c| format!("{c} times"));
            writeln!(out, "Usage Hours: {hours}")?;
            writeln!(out, "Connection Count: {cycles}")?;
        } else {
            writeln!(out, "S.M.A.R.T. data: N/A")?;
        }
        out.flush()
    }
}

impl<W: Write> Reporter for ConsoleReporter<'_, W> {
    fn started(&mut self, target: &Target) {
        let res = writeln!(self.out, "\nTesting {target} on {}...", target.drive.display())
            .and_then(|()| self.out.flush());
        if let Err(e) = res {
            self.failed.get_or_insert(e);
        }
    }

    fn finished(&mut self, report: &DeviceReport) {
        if let Err(e) = self.try_finished(report) {
            self.failed.get_or_insert(e);
        }
    }
}

/// Tests `targets` one after another, printing as it goes.
pub(crate) fn run<P, S>(
    engine: &Engine<P, S>,
    targets: &[Target],
    out: &mut impl Write,
) -> io::Result<Vec<DeviceReport>>
where
    P: DeviceInfoProvider,
    S: SmartDataSource,
{
    let mut reporter = ConsoleReporter { out, failed: None };
    let reports = engine.run(targets, &mut reporter);
    match reporter.failed {
        Some(e) => Err(e),
        None => Ok(reports),
    }
}

fn prompt(
    question: &str,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> io::Result<Option<String>> {
    write!(out, "{question}")?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// The menu loop. Devices are rediscovered on every round; only a failed
/// discovery ends the session with an error.
pub(crate) fn interactive<P, S>(
    engine: &Engine<P, S>,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    P: DeviceInfoProvider,
    S: SmartDataSource,
{
    loop {
        let targets = engine.discover()?.targets();
        writeln!(out, "Available storage devices:")?;
        print_targets(&targets, out)?;
        writeln!(out, "{}: Test all drives", targets.len() + 1)?;
        writeln!(out, "{}: Exit", targets.len() + 2)?;

        let question = "Select a storage device to test (by number): ";
        let Some(answer) = prompt(question, input, out)? else {
            return Ok(());
        };
        match parse_choice(&answer, targets.len()) {
            None => {
                writeln!(out, "Invalid choice. Please select a valid option.")?;
                continue;
            }
            Some(Choice::Exit) => {
                writeln!(out, "Exiting the program.")?;
                return Ok(());
            }
            Some(Choice::All) => {
                writeln!(out, "Testing all drives...")?;
                run(engine, &targets, out)?;
            }
            Some(Choice::Target(i)) => {
                writeln!(out, "Selected device: {}", targets[i])?;
                run(engine, &targets[i..=i], out)?;
            }
        }

        let again = prompt(
            "Do you want to test another storage device? (yes/no): ",
            input,
            out,
        )?;
        if again.map(|a| a.to_lowercase()).as_deref() != Some("yes") {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{catalog::fake::FakeHost, engine::EngineConfig, smart::Smartctl};
    use std::{path::PathBuf, time::Duration};

    fn engine(mounts: &[&str]) -> Engine<FakeHost, Smartctl> {
        let partitions: Vec<(&str, &str)> = mounts.iter().map(|m| (*m, "/dev/x1")).collect();
        let host = FakeHost::default()
            .with_drive("/dev/x", &partitions)
            .with_label("/dev/x1", "Scratch")
            .with_rpm("/dev/x", Some(0));
        let smart = Smartctl {
            tool: PathBuf::from("/nonexistent/smartctl"),
        };
        let config = EngineConfig {
            payload_size: 8 * 1024,
            block_size: 1024,
            pause: Duration::ZERO,
            seed: Some(5),
            verify: false,
        };
        Engine::new(host, smart, config)
    }

    fn session(engine: &Engine<FakeHost, Smartctl>, input: &str) -> String {
        let mut out = Vec::new();
        interactive(engine, &mut io::Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn choices() {
        assert_eq!(parse_choice("1", 3), Some(Choice::Target(0)));
        assert_eq!(parse_choice(" 3\n", 3), Some(Choice::Target(2)));
        assert_eq!(parse_choice("4", 3), Some(Choice::All));
        assert_eq!(parse_choice("5", 3), Some(Choice::Exit));
        assert_eq!(parse_choice("6", 3), None);
        assert_eq!(parse_choice("0", 3), None);
        assert_eq!(parse_choice("two", 3), None);
        assert_eq!(parse_choice("-1", 3), None);
    }

    #[test]
    fn lists_numbered_targets() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&[dir.path().to_str().unwrap()]);
        let targets = engine.discover().unwrap().targets();
        let mut out = Vec::new();
        print_targets(&targets, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("1: {} (Scratch)\n", dir.path().display())
        );
    }

    #[test]
    fn tests_selected_device_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&[dir.path().to_str().unwrap()]);
        let out = session(&engine, "1\nno\n");
        assert!(out.contains("Selected device:"));
        assert!(out.contains("Write speed: "));
        assert!(out.contains("MB/s") || out.contains("GB/s"));
        assert!(out.contains("Drive RPM: N/A"));
        assert!(out.contains("S.M.A.R.T. data: N/A"));
        assert!(!dir.path().join("temp").exists());
    }

    #[test]
    fn invalid_choice_reprompts() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&[dir.path().to_str().unwrap()]);
        let out = session(&engine, "9\n3\n");
        assert!(out.contains("Invalid choice."));
        assert!(out.contains("Exiting the program."));
        assert_eq!(out.matches("Available storage devices:").count(), 2);
    }

    #[test]
    fn test_all_then_repeat() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let engine = engine(&[a.path().to_str().unwrap(), b.path().to_str().unwrap()]);
        let out = session(&engine, "3\nYES\n4\n");
        assert!(out.contains("Testing all drives..."));
        assert_eq!(out.matches("Read speed: ").count(), 2);
        assert!(out.contains("Exiting the program."));
    }

    #[test]
    fn no_devices_ends_the_session() {
        let engine = engine(&[]);
        let mut out = Vec::new();
        let err = interactive(&engine, &mut io::Cursor::new("1\n"), &mut out).unwrap_err();
        assert_eq!(err.to_string(), "No storage devices found.");
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(&[dir.path().to_str().unwrap()]);
        assert!(session(&engine, "").contains("Select a storage device"));
    }
}
