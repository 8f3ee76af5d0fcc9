//! Machine identifiers, VM states and link-state records.

use serde::{Deserialize, Serialize};

use crate::config::MachineConfig;

/// Simulation time in whole seconds since the run start.
pub type TimestampS = u64;

/// Identifies one emulated machine.
///
/// Ground stations live in group 0 and are addressed by their unique name;
/// satellites use their shell index (starting at 1) as the group and
/// `plane * sats_per_plane + slot` as the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineId {
    pub group: u8,
    pub id: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl MachineId {
    pub fn satellite(group: u8, id: u16) -> Self {
        Self {
            group,
            id,
            name: String::new(),
        }
    }

    pub fn ground_station(id: u16, name: impl Into<String>) -> Self {
        Self {
            group: 0,
            id,
            name: name.into(),
        }
    }

    pub fn is_ground_station(&self) -> bool {
        self.group == 0
    }
}

// Identity is (group, id); the name rides along for display and the init
// file but is absent from the packed wire records.
impl PartialEq for MachineId {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group && self.id == other.id
    }
}

impl Eq for MachineId {}

impl PartialOrd for MachineId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MachineId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.group, self.id).cmp(&(other.group, other.id))
    }
}

impl std::hash::Hash for MachineId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.group, self.id).hash(state);
    }
}

impl std::fmt::Display for MachineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}/{}", self.group, self.id)
        } else {
            write!(f, "{}/{} ({})", self.group, self.id, self.name)
        }
    }
}

/// VM-level state of a machine, derived from bounding-box membership.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[repr(u8)]
pub enum VmState {
    Stopped = 0,
    Active = 1,
}

impl VmState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(VmState::Stopped),
            1 => Some(VmState::Active),
            _ => None,
        }
    }
}

/// Per-pair path attributes as announced to the downstream.
///
/// `next_hop` is the first hop in the source-to-target direction,
/// `prev_hop` the first hop of the reverse direction. A blocked pair
/// carries zeroed latency and bandwidth with `next_hop = source` and
/// `prev_hop = target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkState {
    pub latency_us: u32,
    pub bandwidth_kbits: u32,
    pub blocked: bool,
    pub next_hop: MachineId,
    pub prev_hop: MachineId,
}

impl LinkState {
    /// The sentinel every pair starts from before the first announcement.
    pub fn initial(source: &MachineId, target: &MachineId) -> Self {
        Self {
            latency_us: 0,
            bandwidth_kbits: 0,
            blocked: true,
            next_hop: source.clone(),
            prev_hop: target.clone(),
        }
    }
}

/// Consumer of the per-tick delta stream.
///
/// The constellation calls `init_machine` once per machine before the first
/// tick, then `diff_machine`/`diff_link` for every change. Within one tick
/// all machine diffs precede all link diffs.
pub trait StateSink {
    fn init_machine(&mut self, machine: &MachineId, config: &MachineConfig);
    fn diff_machine(&mut self, t: TimestampS, machine: &MachineId, state: VmState);
    fn diff_link(&mut self, t: TimestampS, source: &MachineId, target: &MachineId, link: &LinkState);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_id_identity_ignores_name() {
        let named = MachineId::ground_station(3, "berlin");
        let bare = MachineId {
            group: 0,
            id: 3,
            name: String::new(),
        };
        assert_eq!(named, bare);

        let mut ids = vec![
            MachineId::satellite(2, 0),
            MachineId::satellite(1, 7),
            MachineId::ground_station(0, "tokyo"),
        ];
        ids.sort();
        assert!(ids[0].is_ground_station());
        assert_eq!((ids[1].group, ids[1].id), (1, 7));
        assert_eq!((ids[2].group, ids[2].id), (2, 0));
    }

    #[test]
    fn test_vm_state_round_trip() {
        assert_eq!(VmState::from_u8(VmState::Stopped.as_u8()), Some(VmState::Stopped));
        assert_eq!(VmState::from_u8(VmState::Active.as_u8()), Some(VmState::Active));
        assert_eq!(VmState::from_u8(2), None);
    }
}
