// ABOUTME: Sandbox manager owning admission control and instance teardown
// ABOUTME: Bounds live sandboxes with a FIFO gate and reclaims every instance it hands out

use crate::engine::{Engine, MANAGED_LABEL, SESSION_LABEL};
use crate::error::{Result, SandboxError};
use crate::instance::{InstanceState, SandboxInstance};
use crate::limiter::ResourceLimits;
use crate::settings::SandboxSettings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of per-instance working directories
const WORKDIR_PREFIX: &str = "timebox-";

pub struct SandboxManager {
    engine: Arc<dyn Engine>,
    gate: Arc<Semaphore>,
    ceiling: usize,
    admission_timeout: Duration,
    work_root: Option<PathBuf>,
    /// Stamped on every container so other sessions' leftovers can be told apart
    session_id: Uuid,
}

impl SandboxManager {
    pub fn new(engine: Arc<dyn Engine>, settings: &SandboxSettings) -> Self {
        Self {
            engine,
            gate: Arc::new(Semaphore::new(settings.max_concurrent)),
            ceiling: settings.max_concurrent,
            admission_timeout: settings.admission_timeout,
            work_root: settings.work_root.clone(),
            session_id: Uuid::new_v4(),
        }
    }

    /// Maximum number of live instances
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Instances acquired and not yet released
    pub fn live_instances(&self) -> usize {
        self.ceiling - self.gate.available_permits()
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Admit a request and allocate a fresh instance in `Provisioning`.
    ///
    /// Waits in arrival order for a free slot; gives up with
    /// [`SandboxError::AdmissionRejected`] after the admission timeout.
    pub async fn acquire(&self, limits: ResourceLimits) -> Result<SandboxInstance> {
        let started = Instant::now();

        let permit = match timeout(self.admission_timeout, self.gate.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(SandboxError::Infrastructure(
                    "admission gate closed".to_string(),
                ))
            }
            Err(_) => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(
                    "Admission rejected after {}ms: {} sandboxes live",
                    waited_ms,
                    self.live_instances()
                );
                return Err(SandboxError::AdmissionRejected {
                    ceiling: self.ceiling,
                    waited_ms,
                });
            }
        };

        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKDIR_PREFIX).rand_bytes(16);
        let workdir = match &self.work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| {
            SandboxError::Infrastructure(format!("failed to create working directory: {}", e))
        })?;

        let mut instance = SandboxInstance::new(
            self.engine.clone(),
            self.session_id,
            limits,
            workdir,
            permit,
        );
        instance.transition(InstanceState::Provisioning)?;

        debug!(
            "Acquired sandbox {} after {}ms ({}/{} live)",
            instance.id(),
            started.elapsed().as_millis(),
            self.live_instances(),
            self.ceiling
        );

        Ok(instance)
    }

    /// Tear an instance down: container, working directory, then admission slot.
    ///
    /// Safe to call more than once. Cleanup failures are logged and never keep
    /// the slot occupied.
    pub async fn release(&self, instance: &mut SandboxInstance) {
        if instance.state() == InstanceState::Reclaimed {
            debug!("Sandbox {} already reclaimed", instance.id());
            return;
        }

        let final_state = instance.state();

        // Cleared only after removal returns, so Drop still sees it if this future is abandoned
        if let Some(container_ref) = instance.container_ref() {
            if let Err(e) = self.engine.remove_container(&container_ref, true).await {
                warn!(
                    "Failed to remove container {} of sandbox {}: {}",
                    container_ref,
                    instance.id(),
                    e
                );
            }
            instance.clear_container();
        }

        if let Some(workdir) = instance.take_workdir() {
            let path = workdir.path().to_path_buf();
            if let Err(e) = workdir.close() {
                warn!(
                    "Failed to remove working directory {}: {}",
                    path.display(),
                    e
                );
            }
        }

        drop(instance.take_permit());

        if let Err(e) = instance.mark_reclaimed() {
            warn!("{}", e);
        }

        info!(
            "Reclaimed sandbox {} (final state {}, lived {}ms)",
            instance.id(),
            final_state,
            (chrono::Utc::now() - instance.created_at()).num_milliseconds()
        );
    }

    /// Remove containers labelled as ours that belong to another (dead) session.
    ///
    /// Returns (orphaned, removed, errors).
    pub async fn cleanup_orphaned_containers(
        &self,
        dry_run: bool,
    ) -> Result<(usize, usize, Vec<String>)> {
        let containers = self
            .engine
            .list_labelled_containers(MANAGED_LABEL, "true")
            .await?;

        let session = self.session_id.to_string();
        let mut orphaned_count = 0;
        let mut removed_count = 0;
        let mut errors = Vec::new();

        for container in containers {
            if container.labels.get(SESSION_LABEL) == Some(&session) {
                continue;
            }

            orphaned_count += 1;
            warn!(
                "Found orphaned container: {} (name: {}, state: {})",
                container.id, container.name, container.state
            );

            if dry_run {
                continue;
            }

            match self.engine.remove_container(&container.id, true).await {
                Ok(_) => {
                    info!("Removed orphaned container: {}", container.id);
                    removed_count += 1;
                }
                Err(e) => {
                    let error_msg = format!(
                        "Failed to remove orphaned container {}: {}",
                        container.id, e
                    );
                    warn!("{}", error_msg);
                    errors.push(error_msg);
                }
            }
        }

        if dry_run {
            info!(
                "Dry run complete: found {} orphaned containers (none removed)",
                orphaned_count
            );
        } else if orphaned_count > 0 {
            info!(
                "Orphan sweep complete: removed {}/{} containers",
                removed_count, orphaned_count
            );
        }

        Ok((orphaned_count, removed_count, errors))
    }
}
