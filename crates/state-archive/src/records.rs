//! Packed little-endian wire records and the machine init lines.

use byteorder::{ByteOrder, LittleEndian};
use constellation_model::{LinkState, MachineConfig, MachineId, VmState};

use crate::{ArchiveError, Result};

pub const MACHINE_DIFF_RECORD_LEN: usize = 4;
pub const LINK_DIFF_RECORD_LEN: usize = 21;

const LIST_SEP: char = '|';

/// `{group: u8, id: u16, state: u8}`
pub fn pack_machine_diff(machine: &MachineId, state: VmState) -> [u8; MACHINE_DIFF_RECORD_LEN] {
    let mut buf = [0u8; MACHINE_DIFF_RECORD_LEN];
    buf[0] = machine.group;
    LittleEndian::write_u16(&mut buf[1..3], machine.id);
    buf[3] = state.as_u8();
    buf
}

pub fn unpack_machine_diffs(bytes: &[u8]) -> Result<Vec<(MachineId, VmState)>> {
    if bytes.len() % MACHINE_DIFF_RECORD_LEN != 0 {
        return Err(ArchiveError::TruncatedEntry {
            record_len: MACHINE_DIFF_RECORD_LEN,
            entry_len: bytes.len(),
        });
    }

    bytes
        .chunks_exact(MACHINE_DIFF_RECORD_LEN)
        .map(|chunk| {
            let machine = MachineId::satellite(chunk[0], LittleEndian::read_u16(&chunk[1..3]));
            let state = VmState::from_u8(chunk[3])
                .ok_or(ArchiveError::InvalidVmState(chunk[3]))?;
            Ok((machine, state))
        })
        .collect()
}

/// `{src: (u8, u16), tgt: (u8, u16), latency_us: u32, bandwidth_kbits: u32,
///   blocked: u8, next: (u8, u16), prev: (u8, u16)}`
pub fn pack_link_diff(
    source: &MachineId,
    target: &MachineId,
    link: &LinkState,
) -> [u8; LINK_DIFF_RECORD_LEN] {
    let mut buf = [0u8; LINK_DIFF_RECORD_LEN];
    buf[0] = source.group;
    LittleEndian::write_u16(&mut buf[1..3], source.id);
    buf[3] = target.group;
    LittleEndian::write_u16(&mut buf[4..6], target.id);
    LittleEndian::write_u32(&mut buf[6..10], link.latency_us);
    LittleEndian::write_u32(&mut buf[10..14], link.bandwidth_kbits);
    buf[14] = link.blocked as u8;
    buf[15] = link.next_hop.group;
    LittleEndian::write_u16(&mut buf[16..18], link.next_hop.id);
    buf[18] = link.prev_hop.group;
    LittleEndian::write_u16(&mut buf[19..21], link.prev_hop.id);
    buf
}

pub fn unpack_link_diffs(bytes: &[u8]) -> Result<Vec<(MachineId, MachineId, LinkState)>> {
    if bytes.len() % LINK_DIFF_RECORD_LEN != 0 {
        return Err(ArchiveError::TruncatedEntry {
            record_len: LINK_DIFF_RECORD_LEN,
            entry_len: bytes.len(),
        });
    }

    Ok(bytes
        .chunks_exact(LINK_DIFF_RECORD_LEN)
        .map(|chunk| {
            let source = MachineId::satellite(chunk[0], LittleEndian::read_u16(&chunk[1..3]));
            let target = MachineId::satellite(chunk[3], LittleEndian::read_u16(&chunk[4..6]));
            let link = LinkState {
                latency_us: LittleEndian::read_u32(&chunk[6..10]),
                bandwidth_kbits: LittleEndian::read_u32(&chunk[10..14]),
                blocked: chunk[14] != 0,
                next_hop: MachineId::satellite(chunk[15], LittleEndian::read_u16(&chunk[16..18])),
                prev_hop: MachineId::satellite(chunk[18], LittleEndian::read_u16(&chunk[19..21])),
            };
            (source, target, link)
        })
        .collect())
}

/// One CSV line of the `i` entry.
pub fn init_line(machine: &MachineId, config: &MachineConfig) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        machine.group,
        machine.id,
        machine.name,
        config.vcpu_count,
        config.mem_size_mib,
        config.disk_size_mib,
        config.kernel,
        config.rootfs,
        config
            .boot_parameters
            .join(&LIST_SEP.to_string()),
    )
}

pub fn parse_init_line(line: &str) -> Result<(MachineId, MachineConfig)> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 9 {
        return Err(ArchiveError::InvalidInitLine(line.to_string()));
    }

    fn field<T: std::str::FromStr>(line: &str, raw: &str) -> Result<T> {
        raw.parse()
            .map_err(|_| ArchiveError::InvalidInitLine(line.to_string()))
    }

    let machine = MachineId {
        group: field(line, fields[0])?,
        id: field(line, fields[1])?,
        name: fields[2].to_string(),
    };

    let boot_parameters = if fields[8].is_empty() {
        Vec::new()
    } else {
        fields[8].split(LIST_SEP).map(str::to_string).collect()
    };

    let config = MachineConfig {
        vcpu_count: field(line, fields[3])?,
        mem_size_mib: field(line, fields[4])?,
        disk_size_mib: field(line, fields[5])?,
        kernel: fields[6].to_string(),
        rootfs: fields[7].to_string(),
        boot_parameters,
    };

    Ok((machine, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_machine_id() -> impl Strategy<Value = MachineId> {
        (any::<u8>(), any::<u16>()).prop_map(|(group, id)| MachineId::satellite(group, id))
    }

    fn arb_link() -> impl Strategy<Value = LinkState> {
        (
            any::<u32>(),
            any::<u32>(),
            any::<bool>(),
            arb_machine_id(),
            arb_machine_id(),
        )
            .prop_map(|(latency_us, bandwidth_kbits, blocked, next_hop, prev_hop)| LinkState {
                latency_us,
                bandwidth_kbits,
                blocked,
                next_hop,
                prev_hop,
            })
    }

    proptest! {
        #[test]
        fn prop_machine_diff_round_trip(machine in arb_machine_id(), active in any::<bool>()) {
            let state = if active { VmState::Active } else { VmState::Stopped };
            let packed = pack_machine_diff(&machine, state);
            let unpacked = unpack_machine_diffs(&packed).unwrap();
            prop_assert_eq!(unpacked, vec![(machine, state)]);
        }

        #[test]
        fn prop_link_diff_round_trip(
            source in arb_machine_id(),
            target in arb_machine_id(),
            link in arb_link(),
        ) {
            let packed = pack_link_diff(&source, &target, &link);
            prop_assert_eq!(packed.len(), LINK_DIFF_RECORD_LEN);
            let unpacked = unpack_link_diffs(&packed).unwrap();
            prop_assert_eq!(unpacked, vec![(source, target, link)]);
        }
    }

    #[test]
    fn test_machine_diff_layout_is_little_endian() {
        let machine = MachineId::satellite(2, 0x1234);
        let packed = pack_machine_diff(&machine, VmState::Active);
        assert_eq!(packed, [2, 0x34, 0x12, 1]);
    }

    #[test]
    fn test_records_concatenate() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&pack_machine_diff(
            &MachineId::satellite(1, 0),
            VmState::Active,
        ));
        bytes.extend_from_slice(&pack_machine_diff(
            &MachineId::satellite(1, 1),
            VmState::Stopped,
        ));

        let diffs = unpack_machine_diffs(&bytes).unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[1].0.id, 1);
        assert_eq!(diffs[1].1, VmState::Stopped);

        assert!(unpack_machine_diffs(&bytes[..5]).is_err());
    }

    #[test]
    fn test_init_line_round_trip() {
        let machine = MachineId::ground_station(0, "berlin");
        let config = MachineConfig {
            vcpu_count: 2,
            mem_size_mib: 256,
            disk_size_mib: 1024,
            kernel: "vmlinux.bin".into(),
            rootfs: "rootfs.ext4".into(),
            boot_parameters: vec!["console=ttyS0".into(), "quiet".into()],
        };

        let line = init_line(&machine, &config);
        assert_eq!(
            line,
            "0,0,berlin,2,256,1024,vmlinux.bin,rootfs.ext4,console=ttyS0|quiet"
        );

        let (parsed_machine, parsed_config) = parse_init_line(&line).unwrap();
        assert_eq!(parsed_machine, machine);
        assert_eq!(parsed_machine.name, "berlin");
        assert_eq!(parsed_config, config);
    }

    #[test]
    fn test_init_line_empty_boot_parameters() {
        let machine = MachineId::satellite(1, 17);
        let config = MachineConfig {
            vcpu_count: 1,
            mem_size_mib: 128,
            disk_size_mib: 512,
            kernel: "k".into(),
            rootfs: "r".into(),
            boot_parameters: Vec::new(),
        };

        let (_, parsed) = parse_init_line(&init_line(&machine, &config)).unwrap();
        assert!(parsed.boot_parameters.is_empty());
    }
}
