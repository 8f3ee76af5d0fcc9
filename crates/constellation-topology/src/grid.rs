//! +GRID inter-satellite links and ground-station uplink selection.
//!
//! The ISL set is fixed at initialisation: every satellite links to its
//! successor within the plane and to the same slot in the next plane. Only
//! distances and activation flags change afterwards. Uplinks are rebuilt
//! from scratch every tick.

use constellation_model::ConnectionType;
use orbit_propagation::EciPosition;

use crate::shell::GroundStationState;

/// One edge of the static +GRID. `node_1`/`node_2` index the shell's
/// satellite array.
#[derive(Debug, Clone, Copy)]
pub struct IslLink {
    pub node_1: u16,
    pub node_2: u16,
    pub active: bool,
    pub distance_m: u32,
}

/// Candidate link between a ground station and a satellite in range.
#[derive(Debug, Clone, Copy)]
pub struct Uplink {
    pub gst: u16,
    pub sat: u16,
    pub distance_m: u32,
}

/// Build the +GRID edge list for `planes x sats_per_plane` satellites.
///
/// Rings of one or two nodes would produce self-loops or duplicate edges,
/// so those cases collapse to no link and a single link respectively; the
/// same applies to the cross-plane direction.
pub fn plus_grid_links(planes: u16, sats_per_plane: u16) -> Vec<IslLink> {
    let mut links = Vec::with_capacity(2 * planes as usize * sats_per_plane as usize);

    // intra-plane rings
    for plane in 0..planes {
        for slot in 0..sats_per_plane {
            if sats_per_plane < 2 || (sats_per_plane == 2 && slot == 1) {
                continue;
            }
            let node_1 = plane * sats_per_plane + slot;
            let node_2 = plane * sats_per_plane + (slot + 1) % sats_per_plane;
            links.push(IslLink {
                node_1,
                node_2,
                active: false,
                distance_m: 0,
            });
        }
    }

    // cross-plane links to the neighbouring plane
    for plane in 0..planes {
        if planes < 2 || (planes == 2 && plane == 1) {
            continue;
        }
        let next_plane = (plane + 1) % planes;
        for slot in 0..sats_per_plane {
            links.push(IslLink {
                node_1: plane * sats_per_plane + slot,
                node_2: next_plane * sats_per_plane + slot,
                active: false,
                distance_m: 0,
            });
        }
    }

    links
}

/// Refresh ISL distances and activation against the line-of-sight bound.
pub fn update_isl_links(links: &mut [IslLink], positions: &[EciPosition], max_isl_range_m: u32) {
    for link in links.iter_mut() {
        let d = positions[link.node_1 as usize].distance_m(&positions[link.node_2 as usize]) as u32;
        link.active = d <= max_isl_range_m;
        link.distance_m = d;
    }
}

/// Rebuild the uplink list from current positions.
///
/// `ALL` stations keep every satellite within range (range boundary
/// inclusive); `ONE` stations keep the single nearest, ties broken toward
/// the lower satellite id.
pub fn select_uplinks(
    ground_stations: &[GroundStationState],
    positions: &[EciPosition],
    uplinks: &mut Vec<Uplink>,
) {
    uplinks.clear();

    for gst in ground_stations {
        match gst.connection_type {
            ConnectionType::All => {
                for (sat, pos) in positions.iter().enumerate() {
                    let d = gst.position.distance_m(pos) as u32;
                    if d <= gst.max_uplink_range_m {
                        uplinks.push(Uplink {
                            gst: gst.id,
                            sat: sat as u16,
                            distance_m: d,
                        });
                    }
                }
            }
            ConnectionType::One => {
                let mut nearest: Option<Uplink> = None;
                for (sat, pos) in positions.iter().enumerate() {
                    let d = gst.position.distance_m(pos) as u32;
                    if d > gst.max_uplink_range_m {
                        continue;
                    }
                    if nearest.map_or(true, |best| d < best.distance_m) {
                        nearest = Some(Uplink {
                            gst: gst.id,
                            sat: sat as u16,
                            distance_m: d,
                        });
                    }
                }
                uplinks.extend(nearest);
            }
        }
    }
}
