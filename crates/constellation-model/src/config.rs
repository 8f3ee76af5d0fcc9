//! Run configuration: TOML front end, defaults merging and validation.
//!
//! The TOML document carries top-level `network_params` and `compute_params`
//! tables that act as defaults; every shell and ground station may override
//! any subset of their fields. Validation is fatal at load, except for
//! ground stations outside the bounding box, which only warn.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ConfigError, Result, MAX_SATS_PER_SHELL};

/// Geographic region over which satellites are considered ACTIVE.
///
/// `lon2 < lon1` denotes an interval wrapping the antimeridian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub lat1: f64,
    pub lon1: f64,
    pub lat2: f64,
    pub lon2: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat_deg: f64, lon_deg: f64) -> bool {
        if self.lon2 < self.lon1 {
            if lon_deg < self.lon1 && lon_deg > self.lon2 {
                return false;
            }
        } else if lon_deg < self.lon1 || lon_deg > self.lon2 {
            return false;
        }

        lat_deg >= self.lat1 && lat_deg <= self.lat2
    }
}

/// Ground station connection policy: uplink to all satellites in reach or
/// only the closest one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    All,
    One,
}

/// Configuration of one emulated micro-VM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineConfig {
    pub vcpu_count: u32,
    pub mem_size_mib: u32,
    pub disk_size_mib: u32,
    pub kernel: String,
    pub rootfs: String,
    pub boot_parameters: Vec<String>,
}

/// One orbital shell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellConfig {
    pub planes: u16,
    pub sats: u16,
    pub altitude_km: f64,
    pub inclination: f64,
    pub arc_of_ascending_nodes: f64,
    pub eccentricity: f64,
    pub isl_bandwidth_kbits: u32,
    pub machine_config: MachineConfig,
}

impl ShellConfig {
    pub fn total_sats(&self) -> u32 {
        self.planes as u32 * self.sats as u32
    }
}

/// One ground station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundStationConfig {
    pub name: String,
    pub lat: f64,
    pub long: f64,
    pub uplink_bandwidth_kbits: u32,
    pub min_elevation: f64,
    pub connection_type: ConnectionType,
    pub machine_config: MachineConfig,
}

/// The validated run configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub bbox: BoundingBox,
    pub duration: u64,
    pub resolution: u64,
    pub offset: u64,
    pub shells: Vec<ShellConfig>,
    pub ground_stations: Vec<GroundStationConfig>,
}

impl Config {
    /// Parse and validate a TOML configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Read, parse and validate a TOML configuration file.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let bbox = BoundingBox {
            lat1: raw.bbox[0],
            lon1: raw.bbox[1],
            lat2: raw.bbox[2],
            lon2: raw.bbox[3],
        };

        let shells = raw
            .shell
            .into_iter()
            .map(|s| {
                let network = s.network_params.merged(&raw.network_params);
                let compute = s.compute_params.merged(&raw.compute_params);
                ShellConfig {
                    planes: s.planes,
                    sats: s.sats,
                    altitude_km: s.altitude_km,
                    inclination: s.inclination,
                    arc_of_ascending_nodes: s.arc_of_ascending_nodes,
                    eccentricity: s.eccentricity,
                    isl_bandwidth_kbits: network.bandwidth_kbits,
                    machine_config: compute.into_machine_config(),
                }
            })
            .collect();

        let ground_stations = raw
            .ground_station
            .into_iter()
            .map(|g| {
                let network = g.network_params.merged(&raw.network_params);
                let compute = g.compute_params.merged(&raw.compute_params);
                GroundStationConfig {
                    name: g.name,
                    lat: g.lat,
                    long: g.long,
                    uplink_bandwidth_kbits: network.bandwidth_kbits,
                    min_elevation: network.min_elevation,
                    connection_type: network.ground_station_connection_type,
                    machine_config: compute.into_machine_config(),
                }
            })
            .collect();

        let config = Config {
            bbox,
            duration: raw.duration,
            resolution: raw.resolution,
            offset: raw.offset.unwrap_or(0),
            shells,
            ground_stations,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.resolution < 1 {
            return Err(ConfigError::ResolutionTooSmall);
        }
        if self.duration < self.resolution {
            return Err(ConfigError::DurationTooSmall);
        }

        let b = [self.bbox.lat1, self.bbox.lon1, self.bbox.lat2, self.bbox.lon2];
        if !(-90.0..=90.0).contains(&self.bbox.lat1)
            || !(-90.0..=90.0).contains(&self.bbox.lat2)
            || !(-180.0..=180.0).contains(&self.bbox.lon1)
            || !(-180.0..=180.0).contains(&self.bbox.lon2)
        {
            return Err(ConfigError::BoundingBoxOutOfRange(b));
        }

        if self.shells.is_empty() {
            return Err(ConfigError::NoShells);
        }
        if self.shells.len() > 254 {
            return Err(ConfigError::TooManyShells(self.shells.len()));
        }

        for (index, shell) in self.shells.iter().enumerate() {
            if shell.planes < 1 || shell.sats < 1 {
                return Err(ConfigError::EmptyShell { index });
            }
            if shell.total_sats() > MAX_SATS_PER_SHELL {
                return Err(ConfigError::TooManySatellites {
                    index,
                    planes: shell.planes,
                    sats: shell.sats,
                });
            }
            if !(0.0..=360.0).contains(&shell.inclination) {
                return Err(ConfigError::InclinationOutOfRange {
                    index,
                    value: shell.inclination,
                });
            }
        }

        let mut names: std::collections::HashSet<&str> = std::collections::HashSet::new();
        for gst in &self.ground_stations {
            if gst.name.is_empty()
                || !gst
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::InvalidGroundStationName(gst.name.clone()));
            }
            if !names.insert(&gst.name) {
                return Err(ConfigError::DuplicateGroundStationName(gst.name.clone()));
            }
            if !(-90.0..=90.0).contains(&gst.lat) || !(-180.0..=180.0).contains(&gst.long) {
                return Err(ConfigError::CoordinatesOutOfRange {
                    name: gst.name.clone(),
                    lat: gst.lat,
                    long: gst.long,
                });
            }
            if !(0.0..=90.0).contains(&gst.min_elevation) {
                return Err(ConfigError::MinElevationOutOfRange {
                    name: gst.name.clone(),
                    value: gst.min_elevation,
                });
            }
            if !self.bbox.contains(gst.lat, gst.long) {
                warn!(
                    station = %gst.name,
                    lat = gst.lat,
                    long = gst.long,
                    "ground station lies outside the bounding box; it stays ACTIVE but \
                     satellites above it may be stopped"
                );
            }
        }

        Ok(())
    }

    /// Number of ticks this configuration runs for.
    pub fn tick_count(&self) -> u64 {
        self.duration.div_ceil(self.resolution)
    }
}

// ---------------------------------------------------------------------------
// Raw TOML schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    bbox: [f64; 4],
    resolution: u64,
    duration: u64,
    offset: Option<u64>,
    network_params: RawNetworkParams,
    compute_params: RawComputeParams,
    shell: Vec<RawShell>,
    #[serde(default)]
    ground_station: Vec<RawGroundStation>,
}

#[derive(Debug, Deserialize)]
struct RawNetworkParams {
    bandwidth_kbits: u32,
    min_elevation: f64,
    ground_station_connection_type: ConnectionType,
}

#[derive(Debug, Deserialize)]
struct RawComputeParams {
    vcpu_count: u32,
    mem_size_mib: u32,
    disk_size_mib: u32,
    kernel: String,
    rootfs: String,
    #[serde(default)]
    boot_parameters: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawNetworkOverride {
    bandwidth_kbits: Option<u32>,
    min_elevation: Option<f64>,
    ground_station_connection_type: Option<ConnectionType>,
}

impl RawNetworkOverride {
    fn merged(&self, base: &RawNetworkParams) -> RawNetworkParams {
        RawNetworkParams {
            bandwidth_kbits: self.bandwidth_kbits.unwrap_or(base.bandwidth_kbits),
            min_elevation: self.min_elevation.unwrap_or(base.min_elevation),
            ground_station_connection_type: self
                .ground_station_connection_type
                .unwrap_or(base.ground_station_connection_type),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawComputeOverride {
    vcpu_count: Option<u32>,
    mem_size_mib: Option<u32>,
    disk_size_mib: Option<u32>,
    kernel: Option<String>,
    rootfs: Option<String>,
    boot_parameters: Option<Vec<String>>,
}

impl RawComputeOverride {
    fn merged(&self, base: &RawComputeParams) -> RawComputeParams {
        RawComputeParams {
            vcpu_count: self.vcpu_count.unwrap_or(base.vcpu_count),
            mem_size_mib: self.mem_size_mib.unwrap_or(base.mem_size_mib),
            disk_size_mib: self.disk_size_mib.unwrap_or(base.disk_size_mib),
            kernel: self.kernel.clone().unwrap_or_else(|| base.kernel.clone()),
            rootfs: self.rootfs.clone().unwrap_or_else(|| base.rootfs.clone()),
            boot_parameters: self
                .boot_parameters
                .clone()
                .unwrap_or_else(|| base.boot_parameters.clone()),
        }
    }
}

impl RawComputeParams {
    fn into_machine_config(self) -> MachineConfig {
        MachineConfig {
            vcpu_count: self.vcpu_count,
            mem_size_mib: self.mem_size_mib,
            disk_size_mib: self.disk_size_mib,
            kernel: self.kernel,
            rootfs: self.rootfs,
            boot_parameters: self.boot_parameters,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawShell {
    planes: u16,
    sats: u16,
    altitude_km: f64,
    inclination: f64,
    arc_of_ascending_nodes: f64,
    eccentricity: f64,
    #[serde(default)]
    network_params: RawNetworkOverride,
    #[serde(default)]
    compute_params: RawComputeOverride,
}

#[derive(Debug, Deserialize)]
struct RawGroundStation {
    name: String,
    lat: f64,
    long: f64,
    #[serde(default)]
    network_params: RawNetworkOverride,
    #[serde(default)]
    compute_params: RawComputeOverride,
}
