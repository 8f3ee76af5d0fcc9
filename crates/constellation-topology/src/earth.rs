//! Earth frame: sidereal rotation, sub-satellite points and geometric
//! range bounds.

use nalgebra::{Rotation3, Vector3};
use orbit_propagation::{EciPosition, EARTH_RADIUS_M};

use crate::MIN_COMMS_ALTITUDE_M;

const SECONDS_PER_DAY: u64 = 86_400;

/// Rotation about +Z by the sidereal angle at simulation time `t`.
pub fn earth_rotation_deg(t_seconds: u64) -> f64 {
    360.0 * (t_seconds % SECONDS_PER_DAY) as f64 / SECONDS_PER_DAY as f64
}

pub fn rotation(degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians())
}

pub fn rotate(rotation: &Rotation3<f64>, pos: &EciPosition) -> EciPosition {
    let v = rotation * Vector3::new(pos.x as f64, pos.y as f64, pos.z as f64);
    EciPosition {
        x: v.x as i32,
        y: v.y as i32,
        z: v.z as i32,
    }
}

/// Geodetic coordinates of the sub-satellite point, on a sphere of radius
/// `semi_major_axis_m`. `rotation` must be the negative Earth rotation so
/// the result lands in the rotating frame.
pub fn subsatellite_point(
    rotation: &Rotation3<f64>,
    pos: &EciPosition,
    semi_major_axis_m: f64,
) -> (f64, f64) {
    let v = rotation * Vector3::new(pos.x as f64, pos.y as f64, pos.z as f64);

    let lat = (v.z / semi_major_axis_m).clamp(-1.0, 1.0).asin().to_degrees();
    let lon = v.y.atan2(v.x).to_degrees();
    (lat, lon)
}

/// Longest inter-satellite line of sight that stays above the minimum
/// communication altitude, via the law of sines on the grazing triangle.
pub fn max_isl_distance_m(semi_major_axis_m: f64) -> u32 {
    let c = EARTH_RADIUS_M + MIN_COMMS_ALTITUDE_M;
    let b = semi_major_axis_m;
    let beta = std::f64::consts::FRAC_PI_2;
    let gamma = (c * beta.sin() / b).asin();
    let alpha = std::f64::consts::PI - beta - gamma;
    let half = b * alpha.sin() / beta.sin();
    (half * 2.0) as u32
}

/// Longest ground-to-satellite range at which the satellite is still at
/// least `min_elevation_deg` above the horizon (spherical Earth).
pub fn max_uplink_distance_m(semi_major_axis_m: f64, min_elevation_deg: f64) -> u32 {
    let a = semi_major_axis_m;
    let b = EARTH_RADIUS_M;

    let alpha = (min_elevation_deg + 90.0).to_radians();
    let beta = (alpha.sin() * b / a).asin();
    let c = (std::f64::consts::PI - alpha - beta).sin() * a / alpha.sin();
    c as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEO_SEMI_MAJOR_M: f64 = EARTH_RADIUS_M + 550_000.0;

    #[test]
    fn test_rotation_moves_equatorial_point_east() {
        let start = EciPosition {
            x: EARTH_RADIUS_M as i32,
            y: 0,
            z: 0,
        };
        let quarter_day = rotation(earth_rotation_deg(SECONDS_PER_DAY / 4));
        let rotated = rotate(&quarter_day, &start);

        assert!(rotated.x.abs() < 1_000);
        assert!((rotated.y - EARTH_RADIUS_M as i32).abs() < 1_000);
        assert_eq!(rotated.z, 0);
    }

    #[test]
    fn test_rotation_wraps_after_full_day() {
        assert_eq!(earth_rotation_deg(0), earth_rotation_deg(SECONDS_PER_DAY));
        assert_eq!(earth_rotation_deg(SECONDS_PER_DAY / 2), 180.0);
    }

    #[test]
    fn test_subsatellite_point_poles_and_equator() {
        let identity = rotation(0.0);
        let over_pole = EciPosition {
            x: 0,
            y: 0,
            z: LEO_SEMI_MAJOR_M as i32,
        };
        let (lat, _) = subsatellite_point(&identity, &over_pole, LEO_SEMI_MAJOR_M);
        assert!((lat - 90.0).abs() < 1e-3);

        let over_equator = EciPosition {
            x: 0,
            y: -(LEO_SEMI_MAJOR_M as i32),
            z: 0,
        };
        let (lat, lon) = subsatellite_point(&identity, &over_equator, LEO_SEMI_MAJOR_M);
        assert!(lat.abs() < 1e-3);
        assert!((lon + 90.0).abs() < 1e-3);
    }

    #[test]
    fn test_max_isl_distance_exceeds_altitude_chord() {
        let d = max_isl_distance_m(LEO_SEMI_MAJOR_M);
        // two satellites at 550 km grazing the 80 km shell: a bit over
        // 2 * sqrt(a^2 - c^2) ~ 5,014 km
        assert!(d > 4_800_000 && d < 5_200_000, "{d}");
    }

    #[test]
    fn test_max_uplink_distance_monotonic_in_elevation() {
        let near_zenith = max_uplink_distance_m(LEO_SEMI_MAJOR_M, 89.0);
        let at_25 = max_uplink_distance_m(LEO_SEMI_MAJOR_M, 25.0);
        let at_horizon = max_uplink_distance_m(LEO_SEMI_MAJOR_M, 0.0);

        // looking almost straight up the range approaches the altitude
        assert!((near_zenith as f64 - 550_000.0).abs() < 5_000.0, "{near_zenith}");
        assert!(at_25 > near_zenith);
        assert!(at_horizon > at_25);
    }
}
