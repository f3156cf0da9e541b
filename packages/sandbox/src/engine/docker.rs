// ABOUTME: Docker engine implementation backed by the bollard client
// ABOUTME: Translates container specs into hardened, resource-limited Docker containers

use super::{
    ContainerSpec, Engine, EngineError, ExitInfo, ImageDetails, ManagedContainer, OutputChunk,
    OutputStream, Result, StreamType,
};
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
        ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, WaitContainerOptions,
    },
    errors::Error as BollardError,
    models::{HostConfig, HostConfigLogConfig},
    Docker,
};
use futures::StreamExt;
use std::collections::HashMap;
use timebox_config::constants;
use tracing::{debug, error, info, warn};

/// Size of the scratch tmpfs mounted at /tmp inside each sandbox
const TMPFS_OPTIONS: &str = "rw,noexec,nosuid,size=16m";

pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect using DOCKER_HOST or the platform default socket
    pub fn connect() -> Result<Self> {
        let host = std::env::var(constants::DOCKER_HOST).ok();
        debug!(docker_host = host.as_deref().unwrap_or("default"), "Connecting to Docker");
        let client = Docker::connect_with_defaults()
            .map_err(|e| EngineError::ConnectionError(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create with a specific Docker connection
    pub fn with_client(client: Docker) -> Self {
        Self { client }
    }
}

/// json-file `max-size` value, rounded up to whole KiB
fn log_max_size(bytes: u64) -> String {
    format!("{}k", bytes.div_ceil(1024).max(1))
}

/// Convert a container spec into a bollard config with the sandbox hardening applied
pub(crate) fn to_bollard_config(spec: &ContainerSpec) -> Config<String> {
    let binds: Vec<String> = spec.mounts.iter().map(|m| m.to_bind()).collect();

    let mut env: Vec<String> = spec
        .env_vars
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    env.sort();

    let memory_bytes = (spec.memory_mb * 1024 * 1024) as i64;

    let host_config = HostConfig {
        binds: Some(binds),
        memory: Some(memory_bytes),
        // Equal to memory: no swap headroom past the ceiling
        memory_swap: Some(memory_bytes),
        nano_cpus: Some((spec.cpu_cores * 1_000_000_000.0) as i64),
        pids_limit: Some(spec.pids_limit),
        network_mode: Some(if spec.network_enabled {
            "bridge".to_string()
        } else {
            "none".to_string()
        }),
        cap_drop: Some(vec!["ALL".to_string()]),
        security_opt: Some(vec!["no-new-privileges".to_string()]),
        readonly_rootfs: Some(true),
        tmpfs: Some(HashMap::from([(
            "/tmp".to_string(),
            TMPFS_OPTIONS.to_string(),
        )])),
        init: Some(true),
        log_config: Some(HostConfigLogConfig {
            typ: Some("json-file".to_string()),
            config: Some(HashMap::from([
                ("max-size".to_string(), log_max_size(spec.log_max_bytes)),
                ("max-file".to_string(), "1".to_string()),
            ])),
        }),
        auto_remove: Some(false),
        privileged: Some(false),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        env: Some(env),
        working_dir: Some(spec.working_dir.clone()),
        labels: Some(spec.labels.clone()),
        network_disabled: Some(!spec.network_enabled),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn ping(&self) -> Result<()> {
        self.client
            .ping()
            .await
            .map_err(|e| EngineError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>> {
        match self.client.inspect_image(image).await {
            Ok(inspect) => {
                let id = inspect.id.ok_or_else(|| {
                    EngineError::ImageError(format!("Image {} has no id", image))
                })?;
                Ok(Some(ImageDetails {
                    id,
                    tags: inspect.repo_tags.unwrap_or_default(),
                    created: inspect.created,
                }))
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(EngineError::ImageError(e.to_string())),
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        debug!("Creating container: {}", spec.name);

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let container = self
            .client
            .create_container(Some(options), to_bollard_config(spec))
            .await
            .map_err(|e| EngineError::ContainerError(e.to_string()))?;

        for warning in &container.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        debug!("Created container: {}", container.id);
        Ok(container.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!("Starting container: {}", container_id);

        self.client
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::ContainerError(e.to_string()))?;

        Ok(())
    }

    async fn attach_output(&self, container_id: &str) -> Result<OutputStream> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: true,
            ..Default::default()
        };

        let logs = self.client.logs(container_id, Some(options));
        let (tx, stream) = OutputStream::channel();
        let container_id = container_id.to_string();

        tokio::spawn(async move {
            let mut logs = Box::pin(logs);
            while let Some(result) = logs.next().await {
                match result {
                    Ok(log) => {
                        let (stream_type, data) = match log {
                            LogOutput::StdOut { message } => (StreamType::Stdout, message.to_vec()),
                            LogOutput::StdErr { message } => (StreamType::Stderr, message.to_vec()),
                            LogOutput::Console { message } => {
                                (StreamType::Stdout, message.to_vec())
                            }
                            _ => continue,
                        };

                        let chunk = OutputChunk {
                            stream: stream_type,
                            data,
                        };

                        if tx.send(chunk).await.is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => {
                        error!("Error streaming output of {}: {}", container_id, e);
                        break;
                    }
                }
            }
        });

        Ok(stream)
    }

    async fn wait_container(&self, container_id: &str) -> Result<ExitInfo> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut wait = self.client.wait_container(container_id, Some(options));

        let exit_code = match wait.next().await {
            Some(Ok(response)) => response.status_code,
            // bollard surfaces a non-zero exit status as an error
            Some(Err(BollardError::DockerContainerWaitError { code, .. })) => code,
            Some(Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            })) => return Err(EngineError::NotFound(container_id.to_string())),
            Some(Err(e)) => return Err(EngineError::ContainerError(e.to_string())),
            None => {
                return Err(EngineError::ContainerError(format!(
                    "Wait stream for {} ended without a status",
                    container_id
                )))
            }
        };

        let oom_killed = match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                warn!("Failed to inspect exited container {}: {}", container_id, e);
                false
            }
        };

        debug!(
            "Container {} exited with code {} (oom_killed: {})",
            container_id, exit_code, oom_killed
        );

        Ok(ExitInfo {
            exit_code,
            oom_killed,
        })
    }

    async fn signal_container(&self, container_id: &str, signal: &str) -> Result<()> {
        debug!("Sending {} to container {}", signal, container_id);

        match self
            .client
            .kill_container(container_id, Some(KillContainerOptions { signal }))
            .await
        {
            Ok(_) => Ok(()),
            // Not running any more, or already gone
            Err(BollardError::DockerResponseServerError {
                status_code: 404 | 409,
                ..
            }) => {
                debug!("Container {} already stopped", container_id);
                Ok(())
            }
            Err(e) => Err(EngineError::ContainerError(e.to_string())),
        }
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        debug!("Removing container {} (force={})", container_id, force);

        let options = RemoveContainerOptions {
            force,
            v: true, // Remove anonymous volumes
            ..Default::default()
        };

        match self
            .client
            .remove_container(container_id, Some(options))
            .await
        {
            Ok(_) => {
                info!("Removed container {}", container_id);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} already removed", container_id);
                Ok(())
            }
            // Removal already in progress
            Err(BollardError::DockerResponseServerError {
                status_code: 409, ..
            }) => {
                debug!("Container {} is already being removed", container_id);
                Ok(())
            }
            Err(e) => {
                error!("Failed to remove container {}: {}", container_id, e);
                Err(EngineError::ContainerError(e.to_string()))
            }
        }
    }

    async fn list_labelled_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ManagedContainer>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", label, value)]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| EngineError::ContainerError(e.to_string()))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .unwrap_or_else(|| id.clone())
                    .trim_start_matches('/')
                    .to_string();
                Some(ManagedContainer {
                    id,
                    name,
                    state: c.state.unwrap_or_else(|| "unknown".to_string()),
                    labels: c.labels.unwrap_or_default(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::VolumeMount;

    fn sample_spec(network_enabled: bool) -> ContainerSpec {
        ContainerSpec {
            image: "sha256:abc123".to_string(),
            name: "timebox-test".to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), "true".to_string()],
            working_dir: "/sandbox".to_string(),
            mounts: vec![VolumeMount {
                host_path: "/tmp/host".to_string(),
                container_path: "/sandbox".to_string(),
                readonly: false,
            }],
            env_vars: HashMap::from([("FOO".to_string(), "bar".to_string())]),
            memory_mb: 128,
            cpu_cores: 0.5,
            pids_limit: 64,
            network_enabled,
            labels: HashMap::from([("timebox.managed".to_string(), "true".to_string())]),
            log_max_bytes: 256 * 1024,
        }
    }

    #[test]
    fn test_container_config_conversion() {
        let config = to_bollard_config(&sample_spec(false));

        assert_eq!(config.image, Some("sha256:abc123".to_string()));
        assert_eq!(config.env, Some(vec!["FOO=bar".to_string()]));
        assert_eq!(config.working_dir, Some("/sandbox".to_string()));
        assert_eq!(config.network_disabled, Some(true));

        let host = config.host_config.expect("host config");
        assert_eq!(host.binds, Some(vec!["/tmp/host:/sandbox:rw".to_string()]));
        assert_eq!(host.memory, Some(128 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(host.pids_limit, Some(64));
        assert_eq!(host.network_mode, Some("none".to_string()));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host.init, Some(true));
        assert_eq!(host.readonly_rootfs, Some(true));

        let logs = host.log_config.expect("log config");
        assert_eq!(logs.typ, Some("json-file".to_string()));
        let options = logs.config.expect("log options");
        assert_eq!(options.get("max-size").map(String::as_str), Some("256k"));
        assert_eq!(options.get("max-file").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_log_max_size_rounds_up() {
        assert_eq!(log_max_size(0), "1k");
        assert_eq!(log_max_size(1025), "2k");
        assert_eq!(log_max_size(512 * 1024), "512k");
    }

    #[test]
    fn test_network_opt_in_uses_bridge() {
        let config = to_bollard_config(&sample_spec(true));
        let host = config.host_config.expect("host config");
        assert_eq!(host.network_mode, Some("bridge".to_string()));
        assert_eq!(config.network_disabled, Some(false));
    }
}
