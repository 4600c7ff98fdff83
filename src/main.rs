use anyhow::Context;
use clap::Parser;
use indicatif::ProgressStyle;
use std::{io, path::PathBuf, time::Duration};
use tracing::info;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[macro_use]
extern crate lazy_static;

mod catalog;
mod console;
mod engine;
mod error;
mod format;
mod payload;
mod probe;
mod rotation;
mod smart;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux::LinuxHost as Host;

#[cfg(not(target_os = "linux"))]
mod other_os;
#[cfg(not(target_os = "linux"))]
use other_os::OtherHost as Host;

use engine::{
    Engine, EngineConfig, DEFAULT_BLOCK_SIZE, DEFAULT_PAUSE, DEFAULT_PAYLOAD_SIZE,
};
use smart::Smartctl;

const MIB: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Mount point of the partition to test.
    ///
    /// Without this (and without --all or --list), an interactive menu of
    /// all mounted partitions is shown.
    partition: Option<PathBuf>,

    /// Test every mounted partition of every physical drive, one after another.
    #[clap(long, conflicts_with = "partition")]
    all: bool,

    /// Only list the partitions that can be tested.
    #[clap(long, conflicts_with_all = ["partition", "all"])]
    list: bool,

    /// Size of the benchmark file in MiB.
    #[clap(
        long,
        default_value_t = (DEFAULT_PAYLOAD_SIZE / MIB) as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    size_mib: u64,

    /// Number of bytes per write or read call.
    #[clap(
        long,
        default_value_t = DEFAULT_BLOCK_SIZE as u64,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    block_size: u64,

    /// Milliseconds to wait between two devices with --all or "Test all drives".
    #[clap(long, default_value_t = DEFAULT_PAUSE.as_millis() as u64)]
    pause_ms: u64,

    /// The smartmontools executable used for SMART data and spindle speed.
    #[clap(long, default_value = "smartctl")]
    smartctl: PathBuf,

    /// Seed for the benchmark payload, to write the same bytes on every run.
    #[clap(long)]
    seed: Option<u64>,

    /// Compare the data read back against what was written.
    #[clap(long)]
    verify: bool,

    /// Log debug output (RUST_LOG takes precedence).
    #[clap(short, long)]
    verbose: bool,
}

impl Args {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let payload_size = self
            .size_mib
            .checked_mul(MIB as u64)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .context("Benchmark file size does not fit in memory")?;
        Ok(EngineConfig {
            payload_size,
            block_size: self.block_size.try_into().context("Block size too large")?,
            pause: Duration::from_millis(self.pause_ms),
            seed: self.seed,
            verify: self.verify,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let config = args.engine_config()?;
    info!(?config, "Starting");
    let engine = Engine::new(
        Host::new(args.smartctl.clone()),
        Smartctl {
            tool: args.smartctl.clone(),
        },
        config,
    );

    let mut out = io::stdout().lock();
    if args.partition.is_none() && !args.all && !args.list {
        return console::interactive(&engine, &mut io::stdin().lock(), &mut out);
    }

    let catalog = engine.discover().context("Discovering storage devices")?;
    let targets = match &args.partition {
        _ if args.list => {
            console::print_targets(&catalog.targets(), &mut out)?;
            return Ok(());
        }
        Some(partition) => vec![catalog.find(partition).with_context(|| {
            format!("{partition:?} is not a mounted partition of any physical drive")
        })?],
        None => catalog.targets(),
    };
    console::run(&engine, &targets, &mut out)?;
    Ok(())
}

lazy_static! {
    pub(crate) static ref PROGRESS_STYLE: ProgressStyle = ProgressStyle::with_template(
        "[{elapsed_precise}] {bar:40.white/grey} {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta_precise}) {msg}",
    ).expect("Internal error in indicatif progress bar template syntax");
}
