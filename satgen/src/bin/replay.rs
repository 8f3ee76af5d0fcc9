//! Archive Replay CLI
//!
//! Reads a state archive and drives a set of emulation hosts through it in
//! real time: register, init, then one update burst per tick. SIGTERM or
//! ctrl-c ends the run with a best-effort stop on every host.
//!
//! Usage:
//!   replay archive.zip host1:8080 host2:8080 ...

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use host_driver::{
    assign_machines, broadcast_stop, broadcast_update, chunk_update, HostControl, HostEntry,
    HttpHost, InitRequest, LinkDiffEntry, MachineDiffEntry,
};
use state_archive::ZipDeserializer;

#[derive(Parser, Debug)]
#[command(
    name = "replay",
    about = "Replay a constellation state archive against emulation hosts"
)]
struct Args {
    /// Path to the state archive
    archive: PathBuf,

    /// Host control addresses, one per emulation host
    #[arg(required = true)]
    hosts: Vec<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> std::process::ExitCode {
    // argument errors exit 1
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return std::process::ExitCode::from(1);
        }
    };

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return std::process::ExitCode::from(1);
    }

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("replay failed: {e:#}");
            std::process::ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run(args: Args) -> Result<()> {
    let mut archive = ZipDeserializer::open(&args.archive)?;
    let config = archive.config()?;
    let machines = archive.init_machines()?;

    let hosts: Vec<HttpHost> = args.hosts.iter().map(HttpHost::new).collect();
    info!(hosts = hosts.len(), machines = machines.len(), "replay starting");

    for host in &hosts {
        host.register().await?;
    }

    let init_request = InitRequest {
        hosts: hosts
            .iter()
            .enumerate()
            .map(|(id, h)| HostEntry {
                id,
                addr: h.addr().to_string(),
            })
            .collect(),
        machines: assign_machines(machines, hosts.len()),
    };
    for host in &hosts {
        host.init(&init_request).await?;
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let start = tokio::time::Instant::now();
    let end = config.offset + config.duration;
    let mut t = config.offset;

    loop {
        let machine_diffs: Vec<MachineDiffEntry> = archive
            .machine_diffs(t)?
            .into_iter()
            .map(|(machine, state)| MachineDiffEntry { machine, state })
            .collect();
        let link_diffs: Vec<LinkDiffEntry> = archive
            .link_diffs(t)?
            .into_iter()
            .map(|(source, target, link)| LinkDiffEntry {
                source,
                target,
                link,
            })
            .collect();

        info!(
            t,
            machine_diffs = machine_diffs.len(),
            link_diffs = link_diffs.len(),
            "tick"
        );
        for batch in chunk_update(t, machine_diffs, link_diffs) {
            broadcast_update(&hosts, &batch).await;
        }

        t += config.resolution;
        if t >= end {
            break;
        }

        let deadline = start + Duration::from_secs(t - config.offset);
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = sigterm.recv() => {
                info!("SIGTERM received, stopping");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                break;
            }
        }
    }

    broadcast_stop(&hosts).await;
    info!("replay finished");
    Ok(())
}
