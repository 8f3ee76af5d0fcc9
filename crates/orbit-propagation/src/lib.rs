//! Orbit Propagation Library
//!
//! SGP4 propagation for whole shells. Mean elements are derived once from
//! the shell geometry (planes, slots, altitude, inclination) and fed to the
//! `sgp4` crate directly, bypassing any TLE string round-trip. WGS-72
//! gravity model, fixed epoch, zero drag.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const SECONDS_PER_DAY: f64 = 86_400.0;
pub const STD_GRAVITATIONAL_PARAMETER_EARTH: f64 = 3.986004418e14;

#[derive(Error, Debug)]
pub enum PropagationError {
    #[error("SGP4 initialization failed for satellite {id}: {message}")]
    Init { id: u32, message: String },
}

pub type Result<T> = std::result::Result<T, PropagationError>;

/// ECI position in metres, quantised to the wire representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EciPosition {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl EciPosition {
    /// Euclidean distance in metres. Squares of positions exceed the i32
    /// range, so everything runs through i64/f64.
    pub fn distance_m(&self, other: &EciPosition) -> f64 {
        let dx = (self.x as i64 - other.x as i64) as f64;
        let dy = (self.y as i64 - other.y as i64) as f64;
        let dz = (self.z as i64 - other.z as i64) as f64;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Mean-element description of one shell.
#[derive(Debug, Clone, Copy)]
pub struct ShellElements {
    pub planes: u16,
    pub sats_per_plane: u16,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub arc_of_ascending_nodes_deg: f64,
    pub eccentricity: f64,
}

impl ShellElements {
    pub fn total_sats(&self) -> u32 {
        self.planes as u32 * self.sats_per_plane as u32
    }

    pub fn semi_major_axis_m(&self) -> f64 {
        self.altitude_km * 1000.0 + EARTH_RADIUS_M
    }

    /// Orbital period in seconds from Kepler's third law.
    pub fn period_s(&self) -> f64 {
        2.0 * std::f64::consts::PI
            * (self.semi_major_axis_m().powi(3) / STD_GRAVITATIONAL_PARAMETER_EARTH).sqrt()
    }
}

/// Maps simulation time to ECI satellite positions for one shell.
///
/// Positions are laid out as `plane * sats_per_plane + slot`. Any
/// implementation satisfying this contract (SGP4, Keplerian, replayed
/// ephemerides) plugs into the topology layer.
pub trait Propagator: Send {
    /// Positions at simulation start.
    fn init_positions(&self) -> Vec<EciPosition>;

    /// Overwrite `positions` with the positions at `t_seconds` after the
    /// epoch. Entries whose propagation fails keep their previous value.
    fn propagate_to(&self, t_seconds: u64, positions: &mut [EciPosition]);
}

/// All runs share one epoch so that archives are reproducible.
fn epoch_years_since_j2000() -> f64 {
    // 2023-01-01T00:00:00Z
    let epoch = NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let unix_seconds = epoch.and_utc().timestamp() as f64;
    // Julian date of the Unix epoch is 2440587.5; J2000 is JD 2451545.0.
    (unix_seconds / SECONDS_PER_DAY + 2_440_587.5 - 2_451_545.0) / 365.25
}

/// SGP4 propagator holding one set of epoch constants per satellite.
pub struct Sgp4Propagator {
    constants: Vec<sgp4::Constants>,
}

impl Sgp4Propagator {
    /// Build SGP4 constants for every satellite of the shell.
    ///
    /// Per plane `p` and slot `s`:
    /// - RAAN: `arc_of_ascending_nodes / planes * p`
    /// - mean anomaly: `s * 360 / sats_per_plane` plus the in-plane time
    ///   offset `(T / sats_per_plane) * s` expressed as a fraction of `T`
    /// - mean motion: `2 pi / (T / 60)` rad/min (Kozai convention)
    ///
    /// Argument of perigee and drag are zero.
    pub fn new(elements: &ShellElements) -> Result<Self> {
        let epoch = epoch_years_since_j2000();
        let period_s = elements.period_s();
        let mean_motion_rad_min = 2.0 * std::f64::consts::PI / (period_s / 60.0);

        let mut constants = Vec::with_capacity(elements.total_sats() as usize);

        for plane in 0..elements.planes {
            let raan_deg = elements.arc_of_ascending_nodes_deg / elements.planes as f64
                * plane as f64;

            for slot in 0..elements.sats_per_plane {
                let id = plane as u32 * elements.sats_per_plane as u32 + slot as u32;
                let time_offset_s = period_s / elements.sats_per_plane as f64 * slot as f64;
                let mean_anomaly_deg = slot as f64 * (360.0 / elements.sats_per_plane as f64)
                    + time_offset_s / period_s;

                let orbit = sgp4::Orbit::from_kozai_elements(
                    &sgp4::WGS72,
                    elements.inclination_deg.to_radians(),
                    raan_deg.to_radians(),
                    elements.eccentricity,
                    0.0,
                    mean_anomaly_deg.to_radians(),
                    mean_motion_rad_min,
                )
                .map_err(|e| PropagationError::Init {
                    id,
                    message: format!("{:?}", e),
                })?;

                let c = sgp4::Constants::new(
                    sgp4::WGS72,
                    sgp4::iau_epoch_to_sidereal_time,
                    epoch,
                    0.0,
                    orbit,
                )
                .map_err(|e| PropagationError::Init {
                    id,
                    message: format!("{:?}", e),
                })?;

                constants.push(c);
            }
        }

        Ok(Self { constants })
    }
}

impl Propagator for Sgp4Propagator {
    fn init_positions(&self) -> Vec<EciPosition> {
        let mut positions = vec![EciPosition::default(); self.constants.len()];
        self.propagate_to(0, &mut positions);
        positions
    }

    fn propagate_to(&self, t_seconds: u64, positions: &mut [EciPosition]) {
        let minutes = t_seconds as f64 / 60.0;

        for (id, (c, pos)) in self.constants.iter().zip(positions.iter_mut()).enumerate() {
            match c.propagate(sgp4::MinutesSinceEpoch(minutes)) {
                Ok(prediction) => {
                    // km -> m, quantised to the i32 wire representation
                    *pos = EciPosition {
                        x: (prediction.position[0] * 1000.0) as i32,
                        y: (prediction.position[1] * 1000.0) as i32,
                        z: (prediction.position[2] * 1000.0) as i32,
                    };
                }
                Err(e) => {
                    // Decay and divergence are not an emulation concern;
                    // the satellite keeps its previous position.
                    debug!(satellite = id, t_seconds, error = ?e, "SGP4 propagation failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leo_shell(planes: u16, sats: u16) -> ShellElements {
        ShellElements {
            planes,
            sats_per_plane: sats,
            altitude_km: 550.0,
            inclination_deg: 53.0,
            arc_of_ascending_nodes_deg: 360.0,
            eccentricity: 0.0,
        }
    }

    #[test]
    fn test_period_matches_kepler() {
        let shell = leo_shell(1, 2);
        // 550 km circular orbit: ~5730 s
        let period = shell.period_s();
        assert!((5600.0..5900.0).contains(&period), "period {period}");
    }

    #[test]
    fn test_positions_on_shell_radius() {
        let shell = leo_shell(2, 3);
        let propagator = Sgp4Propagator::new(&shell).unwrap();
        let positions = propagator.init_positions();
        assert_eq!(positions.len(), 6);

        let a = shell.semi_major_axis_m();
        for pos in &positions {
            let r = (pos.x as f64).hypot(pos.y as f64).hypot(pos.z as f64);
            // SGP4 output wobbles around the mean semi-major axis
            assert!(
                (r - a).abs() < 50_000.0,
                "radius {r} too far from semi-major axis {a}"
            );
        }
    }

    #[test]
    fn test_propagation_moves_satellites() {
        let shell = leo_shell(1, 2);
        let propagator = Sgp4Propagator::new(&shell).unwrap();
        let mut positions = propagator.init_positions();
        let start = positions.clone();

        propagator.propagate_to(60, &mut positions);
        // ~7.6 km/s orbital velocity: expect hundreds of km over a minute
        let moved = start[0].distance_m(&positions[0]);
        assert!(moved > 100_000.0, "satellite barely moved: {moved} m");
    }

    #[test]
    fn test_half_period_is_antipodal() {
        let shell = leo_shell(1, 2);
        let propagator = Sgp4Propagator::new(&shell).unwrap();
        let mut positions = propagator.init_positions();

        // two satellites in one plane start half an orbit apart, so they sit
        // roughly antipodal on the ring
        let d = positions[0].distance_m(&positions[1]);
        let diameter = 2.0 * shell.semi_major_axis_m();
        assert!(
            (d - diameter).abs() / diameter < 0.05,
            "separation {d} vs diameter {diameter}"
        );

        propagator.propagate_to(shell.period_s() as u64, &mut positions);
        let d_after = positions[0].distance_m(&positions[1]);
        assert!(
            (d_after - diameter).abs() / diameter < 0.05,
            "separation after one period {d_after}"
        );
    }
}
