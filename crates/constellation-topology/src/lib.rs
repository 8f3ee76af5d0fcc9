//! Constellation Topology Library
//!
//! The trajectory-and-topology engine: per-shell satellite state, the static
//! +GRID inter-satellite link set, ground-station uplink selection, the
//! all-pairs shortest-path solver and the differ that turns consecutive
//! ticks into a minimal delta stream.

use thiserror::Error;

pub mod constellation;
pub mod diff;
pub mod earth;
pub mod grid;
pub mod paths;
pub mod shell;

pub use constellation::Constellation;
pub use shell::Shell;

/// Minimum altitude a line of sight may graze, roughly the top of the
/// thermosphere.
pub const MIN_COMMS_ALTITUDE_M: f64 = 80_000.0;

/// One-way propagation delay per metre, about 1/c.
pub const LINK_PROPAGATION_S_PER_M: f64 = 3.336e-9;

/// Delay drift that must accumulate before a pair is re-announced.
pub const DELAY_UPDATE_THRESHOLD_US: u32 = 500;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("shell {shell}: {source}")]
    Propagation {
        shell: u8,
        source: orbit_propagation::PropagationError,
    },
}

pub type Result<T> = std::result::Result<T, TopologyError>;
