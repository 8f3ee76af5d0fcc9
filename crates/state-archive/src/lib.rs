//! State Archive Library
//!
//! Persists one run as a single ZIP container addressed by tick: the
//! canonical configuration (`c`), one init line per machine (`i`), and one
//! packed diff entry per tick with changes (`m<T>`, `l<T>`). Per-tick
//! records accumulate in memory; `persist` is the only filesystem write.

use std::collections::BTreeMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use constellation_model::{
    Config, LinkState, MachineConfig, MachineId, StateSink, TimestampS, VmState,
};

pub mod records;

const CONFIG_ENTRY: &str = "c";
const INIT_ENTRY: &str = "i";
const LINK_DIFF_PREFIX: &str = "l";
const MACHINE_DIFF_PREFIX: &str = "m";

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("archive container error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("configuration entry does not decode: {0}")]
    Config(#[from] serde_json::Error),
    #[error("malformed init line: {0:?}")]
    InvalidInitLine(String),
    #[error("entry length {entry_len} is not a multiple of the {record_len}-byte record")]
    TruncatedEntry { record_len: usize, entry_len: usize },
    #[error("invalid VM state byte: {0}")]
    InvalidVmState(u8),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Collects the delta stream of one run and writes it out as a ZIP file.
pub struct ZipSerializer {
    path: PathBuf,
    entries: BTreeMap<String, Vec<u8>>,
}

impl ZipSerializer {
    /// Prepare a serializer for `config`. Without an explicit output path
    /// the file is named by a hash of the canonical configuration encoding.
    pub fn create(config: &Config, output: Option<&Path>) -> Result<Self> {
        let config_bytes = serde_json::to_vec(config)?;

        let path = match output {
            Some(p) => p.to_path_buf(),
            None => {
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                config_bytes.hash(&mut hasher);
                PathBuf::from(format!("{:08x}.zip", hasher.finish() as u32))
            }
        };

        let mut entries = BTreeMap::new();
        entries.insert(CONFIG_ENTRY.to_string(), config_bytes);

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the ZIP container. A partially written file is removed on
    /// failure so a broken run never leaves a plausible-looking archive.
    pub fn persist(&mut self) -> Result<()> {
        match self.write_zip() {
            Ok(()) => {
                info!(path = %self.path.display(), entries = self.entries.len(), "archive written");
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&self.path);
                Err(e)
            }
        }
    }

    fn write_zip(&self) -> Result<()> {
        let file = File::create(&self.path)?;
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.entries {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(bytes)?;
        }

        writer.finish()?;
        Ok(())
    }

    fn entry(&mut self, name: String) -> &mut Vec<u8> {
        self.entries.entry(name).or_default()
    }
}

impl StateSink for ZipSerializer {
    fn init_machine(&mut self, machine: &MachineId, config: &MachineConfig) {
        let line = records::init_line(machine, config);
        let entry = self.entry(INIT_ENTRY.to_string());
        entry.extend_from_slice(line.as_bytes());
        entry.push(b'\n');
    }

    fn diff_machine(&mut self, t: TimestampS, machine: &MachineId, state: VmState) {
        self.entry(format!("{MACHINE_DIFF_PREFIX}{t}"))
            .extend_from_slice(&records::pack_machine_diff(machine, state));
    }

    fn diff_link(
        &mut self,
        t: TimestampS,
        source: &MachineId,
        target: &MachineId,
        link: &LinkState,
    ) {
        self.entry(format!("{LINK_DIFF_PREFIX}{t}"))
            .extend_from_slice(&records::pack_link_diff(source, target, link));
    }
}

/// Read-side access to a persisted archive.
pub struct ZipDeserializer {
    archive: zip::ZipArchive<File>,
}

impl ZipDeserializer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            archive: zip::ZipArchive::new(file)?,
        })
    }

    /// The configuration the archive was generated from.
    pub fn config(&mut self) -> Result<Config> {
        let bytes = self
            .entry_bytes(CONFIG_ENTRY)?
            .ok_or(zip::result::ZipError::FileNotFound)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All machines with their VM configuration, in init order.
    pub fn init_machines(&mut self) -> Result<Vec<(MachineId, MachineConfig)>> {
        let Some(bytes) = self.entry_bytes(INIT_ENTRY)? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| ArchiveError::InvalidInitLine(e.to_string()))?;
        text.lines().map(records::parse_init_line).collect()
    }

    /// Machine diffs for tick `t`; empty when the tick saw no changes.
    pub fn machine_diffs(&mut self, t: TimestampS) -> Result<Vec<(MachineId, VmState)>> {
        match self.entry_bytes(&format!("{MACHINE_DIFF_PREFIX}{t}"))? {
            Some(bytes) => records::unpack_machine_diffs(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Link diffs for tick `t`; empty when the tick saw no changes.
    pub fn link_diffs(
        &mut self,
        t: TimestampS,
    ) -> Result<Vec<(MachineId, MachineId, LinkState)>> {
        match self.entry_bytes(&format!("{LINK_DIFF_PREFIX}{t}"))? {
            Some(bytes) => records::unpack_link_diffs(&bytes),
            None => Ok(Vec::new()),
        }
    }

    /// Whether tick `t` recorded any change at all.
    pub fn has_tick(&mut self, t: TimestampS) -> bool {
        self.archive
            .index_for_name(&format!("{MACHINE_DIFF_PREFIX}{t}"))
            .is_some()
            || self
                .archive
                .index_for_name(&format!("{LINK_DIFF_PREFIX}{t}"))
                .is_some()
    }

    fn entry_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.archive.by_name(name) {
            Ok(mut entry) => {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constellation_model::{BoundingBox, ConnectionType, GroundStationConfig, ShellConfig};

    fn machine_config() -> MachineConfig {
        MachineConfig {
            vcpu_count: 1,
            mem_size_mib: 128,
            disk_size_mib: 512,
            kernel: "vmlinux.bin".into(),
            rootfs: "rootfs.ext4".into(),
            boot_parameters: vec!["console=ttyS0".into()],
        }
    }

    fn config() -> Config {
        Config {
            bbox: BoundingBox {
                lat1: -90.0,
                lon1: -180.0,
                lat2: 90.0,
                lon2: 180.0,
            },
            duration: 10,
            resolution: 1,
            offset: 0,
            shells: vec![ShellConfig {
                planes: 1,
                sats: 2,
                altitude_km: 550.0,
                inclination: 53.0,
                arc_of_ascending_nodes: 360.0,
                eccentricity: 0.0,
                isl_bandwidth_kbits: 10_000,
                machine_config: machine_config(),
            }],
            ground_stations: vec![GroundStationConfig {
                name: "berlin".into(),
                lat: 52.51,
                long: 13.41,
                uplink_bandwidth_kbits: 5_000,
                min_elevation: 25.0,
                connection_type: ConnectionType::All,
                machine_config: machine_config(),
            }],
        }
    }

    #[test]
    fn test_archive_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.zip");

        let config = config();
        let mut serializer = ZipSerializer::create(&config, Some(&path)).unwrap();

        let gst = MachineId::ground_station(0, "berlin");
        let sat0 = MachineId::satellite(1, 0);
        let sat1 = MachineId::satellite(1, 1);

        serializer.init_machine(&gst, &machine_config());
        serializer.init_machine(&sat0, &machine_config());
        serializer.init_machine(&sat1, &machine_config());

        serializer.diff_machine(0, &gst, VmState::Active);
        serializer.diff_machine(0, &sat0, VmState::Active);
        let link = LinkState {
            latency_us: 4807,
            bandwidth_kbits: 10_000,
            blocked: false,
            next_hop: sat1.clone(),
            prev_hop: sat0.clone(),
        };
        serializer.diff_link(3, &sat0, &sat1, &link);

        serializer.persist().unwrap();

        let mut reader = ZipDeserializer::open(&path).unwrap();
        assert_eq!(reader.config().unwrap(), config);

        let inits = reader.init_machines().unwrap();
        assert_eq!(inits.len(), 3);
        assert_eq!(inits[0].0.name, "berlin");

        let machines = reader.machine_diffs(0).unwrap();
        assert_eq!(machines.len(), 2);
        assert_eq!(machines[0].0, gst);
        assert_eq!(machines[0].1, VmState::Active);

        let links = reader.link_diffs(3).unwrap();
        assert_eq!(links, vec![(sat0, sat1, link)]);

        // ticks without changes have no entries
        assert!(reader.machine_diffs(1).unwrap().is_empty());
        assert!(reader.link_diffs(1).unwrap().is_empty());
        assert!(!reader.has_tick(1));
        assert!(reader.has_tick(0));
        assert!(reader.has_tick(3));
    }

    #[test]
    fn test_default_name_derives_from_config() {
        let a = ZipSerializer::create(&config(), None).unwrap();
        let b = ZipSerializer::create(&config(), None).unwrap();
        assert_eq!(a.path(), b.path());

        let mut other = config();
        other.duration = 20;
        let c = ZipSerializer::create(&other, None).unwrap();
        assert_ne!(a.path(), c.path());

        let name = a.path().to_string_lossy().into_owned();
        assert!(name.ends_with(".zip"));
        assert_eq!(name.len(), "00000000.zip".len());
    }
}
