//! Trajectory Generation CLI
//!
//! Reads a TOML constellation configuration, runs the trajectory and
//! topology engine for the configured duration, and writes the delta
//! archive.
//!
//! Usage:
//!   satgen constellation.toml [output.zip]

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use constellation_model::Config;
use constellation_topology::Constellation;
use state_archive::ZipSerializer;

#[derive(Parser, Debug)]
#[command(
    name = "satgen",
    about = "Generate a constellation state archive from a TOML configuration"
)]
struct Args {
    /// Path to the TOML configuration
    config: PathBuf,

    /// Output archive path; defaults to a hash of the configuration
    output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&args.config)?;
    info!(
        shells = config.shells.len(),
        ground_stations = config.ground_stations.len(),
        duration = config.duration,
        resolution = config.resolution,
        "configuration loaded"
    );

    let mut serializer = ZipSerializer::create(&config, args.output.as_deref())?;
    let mut constellation = Constellation::build(&config, &mut serializer)?;

    let end = config.offset + config.duration;
    let total_ticks = config.tick_count();
    let progress_stride = (total_ticks / 10).max(1);

    let mut t = config.offset;
    let mut tick = 0u64;
    while t < end {
        constellation.step(t, &mut serializer);
        tick += 1;
        if tick % progress_stride == 0 {
            info!(tick, total_ticks, t, "simulated");
        }
        t += config.resolution;
    }

    serializer.persist()?;
    println!("Output written to {}", serializer.path().display());

    Ok(())
}
