//! Host Driver Library
//!
//! The control surface the replay driver speaks toward the emulation
//! hosts, independent of transport: `register`, `init`, `update`, `stop`.
//! Updates are chunked so a single burst of changes never exceeds
//! `MAX_DIFF_UPDATE_SIZE` records per batch. `HttpHost` implements the
//! surface over JSON/HTTP.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use constellation_model::{LinkState, MachineConfig, MachineId, VmState};

/// Cap on records per update batch, machine and link diffs each.
pub const MAX_DIFF_UPDATE_SIZE: usize = 100_000;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("host transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("host {addr} rejected {operation}: status {status}")]
    Rejected {
        addr: String,
        operation: &'static str,
        status: u16,
    },
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// What a host reports back at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostCapacity {
    pub available_cpus: u32,
    pub available_ram_mib: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    pub id: usize,
    pub addr: String,
}

/// One machine pinned to one host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineAssignment {
    pub machine: MachineId,
    pub config: MachineConfig,
    pub host: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitRequest {
    pub hosts: Vec<HostEntry>,
    pub machines: Vec<MachineAssignment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineDiffEntry {
    pub machine: MachineId,
    pub state: VmState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDiffEntry {
    pub source: MachineId,
    pub target: MachineId,
    pub link: LinkState,
}

/// One chunk of the per-tick delta stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBatch {
    pub t: u64,
    pub machine_diffs: Vec<MachineDiffEntry>,
    pub link_diffs: Vec<LinkDiffEntry>,
}

/// Spread machines over hosts round-robin, in init order.
pub fn assign_machines(
    machines: Vec<(MachineId, MachineConfig)>,
    host_count: usize,
) -> Vec<MachineAssignment> {
    machines
        .into_iter()
        .enumerate()
        .map(|(i, (machine, config))| MachineAssignment {
            machine,
            config,
            host: i % host_count,
        })
        .collect()
}

/// Split one tick's diffs into batches of at most `MAX_DIFF_UPDATE_SIZE`
/// machine diffs and as many link diffs each. Every tick yields at least
/// one (possibly empty) batch so hosts observe the tick boundary.
pub fn chunk_update(
    t: u64,
    machine_diffs: Vec<MachineDiffEntry>,
    link_diffs: Vec<LinkDiffEntry>,
) -> Vec<UpdateBatch> {
    let mut machine_diffs = machine_diffs.into_iter().peekable();
    let mut link_diffs = link_diffs.into_iter().peekable();

    let mut batches = Vec::new();
    loop {
        let batch = UpdateBatch {
            t,
            machine_diffs: machine_diffs.by_ref().take(MAX_DIFF_UPDATE_SIZE).collect(),
            link_diffs: link_diffs.by_ref().take(MAX_DIFF_UPDATE_SIZE).collect(),
        };
        let empty = batch.machine_diffs.is_empty() && batch.link_diffs.is_empty();
        if empty && !batches.is_empty() {
            break;
        }
        batches.push(batch);
        if machine_diffs.peek().is_none() && link_diffs.peek().is_none() {
            break;
        }
    }
    batches
}

/// The transport-independent control surface of one emulation host.
#[allow(async_fn_in_trait)]
pub trait HostControl {
    fn addr(&self) -> &str;
    async fn register(&self) -> Result<HostCapacity>;
    async fn init(&self, request: &InitRequest) -> Result<()>;
    async fn update(&self, batch: &UpdateBatch) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// JSON/HTTP implementation of the control surface.
pub struct HttpHost {
    addr: String,
    client: reqwest::Client,
}

impl HttpHost {
    pub fn new(addr: impl Into<String>) -> Self {
        let addr = addr.into();
        let addr = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr
        } else {
            format!("http://{addr}")
        };
        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    async fn post<B: Serialize>(
        &self,
        operation: &'static str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{operation}", self.addr))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DriverError::Rejected {
                addr: self.addr.clone(),
                operation,
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

impl HostControl for HttpHost {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn register(&self) -> Result<HostCapacity> {
        let capacity: HostCapacity = self
            .post("register", &serde_json::json!({}))
            .await?
            .json()
            .await?;
        info!(
            host = %self.addr,
            cpus = capacity.available_cpus,
            ram_mib = capacity.available_ram_mib,
            "host registered"
        );
        Ok(capacity)
    }

    async fn init(&self, request: &InitRequest) -> Result<()> {
        self.post("init", request).await?;
        Ok(())
    }

    async fn update(&self, batch: &UpdateBatch) -> Result<()> {
        self.post("update", batch).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.post("stop", &serde_json::json!({})).await?;
        Ok(())
    }
}

/// Send one batch to every host concurrently. A failing host is logged and
/// skipped; the others continue.
pub async fn broadcast_update<H: HostControl>(hosts: &[H], batch: &UpdateBatch) {
    let sends = hosts.iter().map(|host| async move {
        if let Err(e) = host.update(batch).await {
            warn!(host = %host.addr(), error = %e, "update failed");
        }
    });
    futures::future::join_all(sends).await;
}

/// Best-effort stop of every host.
pub async fn broadcast_stop<H: HostControl>(hosts: &[H]) {
    let stops = hosts.iter().map(|host| async move {
        if let Err(e) = host.stop().await {
            warn!(host = %host.addr(), error = %e, "stop failed");
        }
    });
    futures::future::join_all(stops).await;
}
