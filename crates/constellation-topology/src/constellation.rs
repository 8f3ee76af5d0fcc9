//! The constellation: every shell plus the wiring into a `StateSink`.

use rayon::prelude::*;
use tracing::info;

use constellation_model::{Config, MachineId, StateSink, TimestampS, VmState};

use crate::shell::Shell;
use crate::{Result, DELAY_UPDATE_THRESHOLD_US};

/// All shells of one run. Shells share nothing mutable, so a tick steps
/// them in parallel and then drains their diffs in shell order.
pub struct Constellation {
    shells: Vec<Shell>,
}

impl Constellation {
    /// Build every shell, announce all machines to the sink and force the
    /// ground stations ACTIVE at the start of the run.
    pub fn build(config: &Config, sink: &mut dyn StateSink) -> Result<Self> {
        let shells = config
            .shells
            .iter()
            .enumerate()
            .map(|(i, shell_config)| {
                Shell::new(
                    (i + 1) as u8,
                    shell_config,
                    config.bbox,
                    &config.ground_stations,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        for (i, gst) in config.ground_stations.iter().enumerate() {
            sink.init_machine(
                &MachineId::ground_station(i as u16, gst.name.clone()),
                &gst.machine_config,
            );
        }
        for (i, shell_config) in config.shells.iter().enumerate() {
            for id in 0..shell_config.total_sats() {
                sink.init_machine(
                    &MachineId::satellite((i + 1) as u8, id as u16),
                    &shell_config.machine_config,
                );
            }
        }

        // ground stations are ACTIVE for the whole run, bounding box or not
        for (i, gst) in config.ground_stations.iter().enumerate() {
            sink.diff_machine(
                config.offset,
                &MachineId::ground_station(i as u16, gst.name.clone()),
                VmState::Active,
            );
        }

        let total: usize = shells.iter().map(Shell::total_sats).sum();
        info!(
            shells = shells.len(),
            satellites = total,
            ground_stations = config.ground_stations.len(),
            "constellation initialised"
        );

        Ok(Self { shells })
    }

    pub fn shells(&self) -> &[Shell] {
        &self.shells
    }

    /// Advance the whole constellation to `t` and write the delta stream.
    /// Machine diffs for every shell precede all link diffs.
    pub fn step(&mut self, t: TimestampS, sink: &mut dyn StateSink) {
        self.shells
            .par_iter_mut()
            .for_each(|shell| shell.step(t, DELAY_UPDATE_THRESHOLD_US));

        for shell in &self.shells {
            for (machine, state) in shell.machine_diffs() {
                sink.diff_machine(t, machine, *state);
            }
        }
        for shell in &self.shells {
            for (source, target, link) in shell.link_diffs() {
                sink.diff_link(t, source, target, link);
            }
        }
    }
}
