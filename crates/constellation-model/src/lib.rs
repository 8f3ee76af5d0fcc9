//! Constellation Model Library
//!
//! Shared vocabulary of the emulation core: machine identifiers, VM states,
//! link-state records, the bounding box, and the validated run configuration
//! with its TOML front end.

use thiserror::Error;

pub mod config;
pub mod types;

pub use config::{
    BoundingBox, Config, ConnectionType, GroundStationConfig, MachineConfig, ShellConfig,
};
pub use types::{LinkState, MachineId, StateSink, TimestampS, VmState};

/// Hard cap on satellites per shell; ids must fit the wire format's u16.
pub const MAX_SATS_PER_SHELL: u32 = 16_384;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("at least one shell is required")]
    NoShells,
    #[error("{0} shells configured; shell groups must fit a u8 (max 255 with group 0 reserved)")]
    TooManyShells(usize),
    #[error("shell {index}: planes and sats must both be at least 1")]
    EmptyShell { index: usize },
    #[error("shell {index}: {planes} planes x {sats} sats exceeds 16384 satellites")]
    TooManySatellites { index: usize, planes: u16, sats: u16 },
    #[error("shell {index}: inclination {value} outside [0, 360] degrees")]
    InclinationOutOfRange { index: usize, value: f64 },
    #[error("ground station {name}: min_elevation {value} outside [0, 90] degrees")]
    MinElevationOutOfRange { name: String, value: f64 },
    #[error("ground station name {0:?} is not of the form [a-zA-Z0-9-]+")]
    InvalidGroundStationName(String),
    #[error("duplicate ground station name: {0}")]
    DuplicateGroundStationName(String),
    #[error("ground station {name}: coordinates ({lat}, {long}) out of range")]
    CoordinatesOutOfRange { name: String, lat: f64, long: f64 },
    #[error("bounding box latitudes/longitudes out of range: {0:?}")]
    BoundingBoxOutOfRange([f64; 4]),
    #[error("resolution must be at least 1 second")]
    ResolutionTooSmall,
    #[error("duration must cover at least one tick")]
    DurationTooSmall,
}

pub type Result<T> = std::result::Result<T, ConfigError>;
