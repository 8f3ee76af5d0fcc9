//! All-pairs shortest paths over one shell's node set.
//!
//! Stage A runs Floyd-Warshall over the satellite core, exploiting the
//! symmetry of the graph by relaxing only the upper triangle and mirroring
//! accepted updates. Stages B and C extend the result to ground-to-satellite
//! and ground-to-ground pairs through the current uplink candidates.

use crate::grid::{IslLink, Uplink};
use crate::shell::GroundStationState;
use crate::LINK_PROPAGATION_S_PER_M;

/// Sentinel for "no hop": the pair is unreachable.
pub const NO_HOP: i32 = -1;

/// Path attributes of one unordered node pair `(i, j)`, `i < j`, in the
/// canonical index order (satellites first, then ground stations).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathAttrs {
    pub active: bool,
    /// First hop from the lower-indexed node toward the higher.
    pub next_hop: i32,
    /// First hop from the higher-indexed node back toward the lower.
    pub prev_hop: i32,
    pub bandwidth_kbits: u32,
    pub delay_us: u32,
}

impl PathAttrs {
    pub const BLOCKED: PathAttrs = PathAttrs {
        active: false,
        next_hop: NO_HOP,
        prev_hop: NO_HOP,
        bandwidth_kbits: 0,
        delay_us: 0,
    };
}

/// Index of pair `(i, j)` in a packed upper triangle over `n` nodes.
#[inline]
pub fn pair_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

/// Number of unordered pairs over `n` nodes.
pub fn pair_count(n: usize) -> usize {
    n * (n - 1) / 2
}

fn delay_us(dist_m: f64) -> u32 {
    (dist_m * (LINK_PROPAGATION_S_PER_M * 1e6)).round() as u32
}

/// Reusable solver state for one shell. The distance and next-hop squares
/// cover the satellite core; the packed triangle covers all nodes.
pub struct PathSolver {
    n_sat: usize,
    n_gst: usize,
    dist: Vec<f64>,
    next: Vec<i32>,
    paths: Vec<PathAttrs>,
}

impl PathSolver {
    pub fn new(n_sat: usize, n_gst: usize) -> Self {
        Self {
            n_sat,
            n_gst,
            dist: vec![f64::INFINITY; n_sat * n_sat],
            next: vec![NO_HOP; n_sat * n_sat],
            paths: vec![PathAttrs::BLOCKED; pair_count(n_sat + n_gst)],
        }
    }

    /// Solved attributes for every unordered pair, in canonical order.
    pub fn paths(&self) -> &[PathAttrs] {
        &self.paths
    }

    pub fn node_count(&self) -> usize {
        self.n_sat + self.n_gst
    }

    /// Recompute every pair from the current link and uplink state.
    pub fn solve(
        &mut self,
        links: &[IslLink],
        uplinks: &[Uplink],
        ground_stations: &[GroundStationState],
        isl_bandwidth_kbits: u32,
    ) {
        self.solve_satellite_core(links, isl_bandwidth_kbits);
        self.solve_ground_to_sat(uplinks, ground_stations, isl_bandwidth_kbits);
        self.solve_ground_to_ground(uplinks, ground_stations, isl_bandwidth_kbits);
    }

    fn solve_satellite_core(&mut self, links: &[IslLink], isl_bandwidth_kbits: u32) {
        let n = self.n_sat;

        self.dist.fill(f64::INFINITY);
        self.next.fill(NO_HOP);
        for i in 0..n {
            self.dist[i * n + i] = 0.0;
            self.next[i * n + i] = i as i32;
        }

        for link in links {
            if !link.active {
                continue;
            }
            let (a, b) = (link.node_1 as usize, link.node_2 as usize);
            self.dist[a * n + b] = link.distance_m as f64;
            self.dist[b * n + a] = link.distance_m as f64;
            self.next[a * n + b] = b as i32;
            self.next[b * n + a] = a as i32;
        }

        for k in 0..n {
            for i in 0..n {
                let d_ik = self.dist[i * n + k];
                if d_ik.is_infinite() {
                    continue;
                }
                for j in (i + 1)..n {
                    let candidate = d_ik + self.dist[k * n + j];
                    if candidate < self.dist[i * n + j] {
                        self.dist[i * n + j] = candidate;
                        self.dist[j * n + i] = candidate;
                        self.next[i * n + j] = self.next[i * n + k];
                        self.next[j * n + i] = self.next[j * n + k];
                    }
                }
            }
        }

        let n_total = self.node_count();
        for i in 0..n {
            for j in (i + 1)..n {
                let d = self.dist[i * n + j];
                let idx = pair_index(n_total, i, j);
                self.paths[idx] = if d.is_finite() {
                    PathAttrs {
                        active: true,
                        next_hop: self.next[i * n + j],
                        prev_hop: self.next[j * n + i],
                        bandwidth_kbits: isl_bandwidth_kbits,
                        delay_us: delay_us(d),
                    }
                } else {
                    PathAttrs::BLOCKED
                };
            }
        }
    }

    /// For each ground station and satellite, route through the uplink
    /// minimising uplink distance plus the satellite-core path. A direct
    /// uplink to the target satellite short-circuits the scan.
    fn solve_ground_to_sat(
        &mut self,
        uplinks: &[Uplink],
        ground_stations: &[GroundStationState],
        isl_bandwidth_kbits: u32,
    ) {
        let n = self.n_sat;
        let n_total = self.node_count();

        for (g, gst) in ground_stations.iter().enumerate() {
            let gi = n + g;

            for s in 0..n {
                let mut min_dist = f64::INFINITY;
                let mut chosen: Option<&Uplink> = None;

                for uplink in uplinks.iter().filter(|u| u.gst == gst.id) {
                    let core = self.dist[s * n + uplink.sat as usize];
                    let total = core + uplink.distance_m as f64;
                    if total >= min_dist {
                        continue;
                    }
                    min_dist = total;
                    chosen = Some(uplink);
                    if uplink.sat as usize == s {
                        break;
                    }
                }

                let idx = pair_index(n_total, s, gi);
                self.paths[idx] = match chosen {
                    None => PathAttrs::BLOCKED,
                    Some(uplink) => {
                        let u = uplink.sat as usize;
                        let next_from_sat = if u == s {
                            gi as i32
                        } else {
                            self.next[s * n + u]
                        };
                        PathAttrs {
                            active: true,
                            next_hop: next_from_sat,
                            prev_hop: u as i32,
                            bandwidth_kbits: isl_bandwidth_kbits
                                .min(gst.uplink_bandwidth_kbits),
                            delay_us: delay_us(min_dist),
                        }
                    }
                };
            }
        }
    }

    /// For each ground-station pair, scan the Cartesian product of their
    /// uplink candidates. The first strictly shorter total wins, so ties
    /// resolve toward lower satellite ids.
    fn solve_ground_to_ground(
        &mut self,
        uplinks: &[Uplink],
        ground_stations: &[GroundStationState],
        isl_bandwidth_kbits: u32,
    ) {
        let n = self.n_sat;
        let n_total = self.node_count();

        for (g1, gst1) in ground_stations.iter().enumerate() {
            for (g2, gst2) in ground_stations.iter().enumerate().skip(g1 + 1) {
                let mut min_dist = f64::INFINITY;
                let mut best: Option<(&Uplink, &Uplink)> = None;

                for up1 in uplinks.iter().filter(|u| u.gst == gst1.id) {
                    for up2 in uplinks.iter().filter(|u| u.gst == gst2.id) {
                        let core = self.dist[up1.sat as usize * n + up2.sat as usize];
                        let total =
                            core + up1.distance_m as f64 + up2.distance_m as f64;
                        if total >= min_dist {
                            continue;
                        }
                        min_dist = total;
                        best = Some((up1, up2));
                    }
                }

                let idx = pair_index(n_total, n + g1, n + g2);
                self.paths[idx] = match best {
                    None => PathAttrs::BLOCKED,
                    Some((up1, up2)) => PathAttrs {
                        active: true,
                        next_hop: up1.sat as i32,
                        prev_hop: up2.sat as i32,
                        bandwidth_kbits: isl_bandwidth_kbits
                            .min(gst1.uplink_bandwidth_kbits)
                            .min(gst2.uplink_bandwidth_kbits),
                        delay_us: delay_us(min_dist),
                    },
                };
            }
        }
    }
}
