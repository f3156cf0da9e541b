// ABOUTME: Container engine trait and the value types exchanged across it
// ABOUTME: Abstracts the Docker daemon so the sandbox lifecycle can be driven by other engines

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod docker;

pub use docker::DockerEngine;

/// Label stamped on every container this crate creates
pub const MANAGED_LABEL: &str = "timebox.managed";
/// Label carrying the id of the manager session that created the container
pub const SESSION_LABEL: &str = "timebox.session";
/// Label carrying the local sandbox instance id
pub const INSTANCE_LABEL: &str = "timebox.instance";

/// Capacity of the chunk channel between the log reader and the capture buffers
pub const OUTPUT_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Container error: {0}")]
    ContainerError(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything the engine needs to create one sandbox container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Pinned image id, never a mutable tag
    pub image: String,
    pub name: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub mounts: Vec<VolumeMount>,
    pub env_vars: HashMap<String, String>,
    pub memory_mb: u64,
    pub cpu_cores: f64,
    pub pids_limit: i64,
    pub network_enabled: bool,
    pub labels: HashMap<String, String>,
    /// Ceiling for the engine's own copy of the container's output
    pub log_max_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

impl VolumeMount {
    /// Docker bind string (`host:container:mode`)
    pub fn to_bind(&self) -> String {
        format!(
            "{}:{}:{}",
            self.host_path,
            self.container_path,
            if self.readonly { "ro" } else { "rw" }
        )
    }
}

/// Result of inspecting a local image
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDetails {
    pub id: String,
    pub tags: Vec<String>,
    pub created: Option<String>,
}

/// How a container process ended, as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub exit_code: i64,
    pub oom_killed: bool,
}

/// Container summary returned by label queries
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub id: String,
    pub name: String,
    pub state: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: StreamType,
    pub data: Vec<u8>,
}

/// Bounded stream of output chunks; closes when the container's output ends
pub struct OutputStream {
    pub receiver: mpsc::Receiver<OutputChunk>,
}

impl OutputStream {
    /// Create a connected sender/stream pair
    pub fn channel() -> (mpsc::Sender<OutputChunk>, Self) {
        let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        (tx, Self { receiver: rx })
    }
}

/// Container engine backing the sandbox
#[async_trait]
pub trait Engine: Send + Sync {
    /// Check that the engine answers
    async fn ping(&self) -> Result<()>;

    /// Inspect a local image; `Ok(None)` when it does not exist
    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>>;

    /// Create (but do not start) a container
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, container_id: &str) -> Result<()>;

    /// Follow the container's stdout/stderr from its start
    async fn attach_output(&self, container_id: &str) -> Result<OutputStream>;

    /// Wait until the container is no longer running
    async fn wait_container(&self, container_id: &str) -> Result<ExitInfo>;

    /// Deliver a signal (`SIGTERM`, `SIGKILL`) to the container's init process.
    /// Signalling a container that already exited is not an error.
    async fn signal_container(&self, container_id: &str, signal: &str) -> Result<()>;

    /// Remove a container, killing it first when `force` is set.
    /// Removing a container that no longer exists is not an error.
    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()>;

    /// List every container (running or not) carrying `label=value`
    async fn list_labelled_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ManagedContainer>>;
}
