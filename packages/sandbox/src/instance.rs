// ABOUTME: One ephemeral sandbox: its container, private working directory and admission slot
// ABOUTME: Enforces the lifecycle state machine and cleans up in Drop if never released

use crate::engine::{Engine, INSTANCE_LABEL, MANAGED_LABEL, SESSION_LABEL};
use crate::error::{Result, SandboxError};
use crate::limiter::ResourceLimits;
use crate::types::ExecutionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    Created,
    Provisioning,
    Running,
    Completed,
    TimedOut,
    Crashed,
    Killed,
    Reclaimed,
}

impl InstanceState {
    pub fn can_transition_to(self, next: InstanceState) -> bool {
        use InstanceState::*;
        match (self, next) {
            (Created, Provisioning) => true,
            (Provisioning, Running) => true,
            (Running, Completed | TimedOut | Crashed | Killed) => true,
            (Reclaimed, _) => false,
            (_, Reclaimed) => true,
            _ => false,
        }
    }

    /// Outcome state for an execution status. `InfrastructureFailure` has no
    /// outcome state of its own.
    pub fn for_status(status: ExecutionStatus) -> Option<InstanceState> {
        match status {
            ExecutionStatus::Completed => Some(InstanceState::Completed),
            ExecutionStatus::TimedOut => Some(InstanceState::TimedOut),
            ExecutionStatus::Crashed => Some(InstanceState::Crashed),
            ExecutionStatus::Killed => Some(InstanceState::Killed),
            ExecutionStatus::InfrastructureFailure => None,
        }
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

pub struct SandboxInstance {
    id: Uuid,
    session_id: Uuid,
    state: InstanceState,
    limits: ResourceLimits,
    container_id: Option<String>,
    /// Set once creation is requested; the container may exist before its id is known
    container_requested: bool,
    workdir_path: PathBuf,
    workdir: Option<TempDir>,
    permit: Option<OwnedSemaphorePermit>,
    created_at: DateTime<Utc>,
    engine: Arc<dyn Engine>,
}

impl SandboxInstance {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        session_id: Uuid,
        limits: ResourceLimits,
        workdir: TempDir,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            state: InstanceState::Created,
            limits,
            container_id: None,
            container_requested: false,
            workdir_path: workdir.path().to_path_buf(),
            workdir: Some(workdir),
            permit: Some(permit),
            created_at: Utc::now(),
            engine,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.as_deref()
    }

    /// Host path of the private working directory (gone once reclaimed)
    pub fn workdir(&self) -> &Path {
        &self.workdir_path
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Container name; unique per instance
    pub fn container_name(&self) -> String {
        format!("timebox-{}", self.id)
    }

    /// Labels identifying the container as ours for orphan sweeps
    pub fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (SESSION_LABEL.to_string(), self.session_id.to_string()),
            (INSTANCE_LABEL.to_string(), self.id.to_string()),
        ])
    }

    pub(crate) fn transition(&mut self, next: InstanceState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SandboxError::InvalidStateTransition(format!(
                "sandbox {} cannot move from {} to {}",
                self.id, self.state, next
            )));
        }
        debug!("Sandbox {}: {} -> {}", self.id, self.state, next);
        self.state = next;
        Ok(())
    }

    pub(crate) fn mark_container_requested(&mut self) {
        self.container_requested = true;
    }

    pub(crate) fn attach_container(&mut self, container_id: String) {
        self.container_requested = true;
        self.container_id = Some(container_id);
    }

    /// Reference to remove the container by: its id, or its name while
    /// creation is still in flight. `None` when no container was ever requested.
    pub(crate) fn container_ref(&self) -> Option<String> {
        match &self.container_id {
            Some(id) => Some(id.clone()),
            None if self.container_requested => Some(self.container_name()),
            None => None,
        }
    }

    pub(crate) fn clear_container(&mut self) {
        self.container_id = None;
        self.container_requested = false;
    }

    /// Move a running instance into the outcome state matching `status`.
    /// An infrastructure failure while running is recorded as `Killed`, since
    /// release will tear the container down forcibly.
    pub(crate) fn record_outcome(&mut self, status: ExecutionStatus) -> Result<()> {
        if self.state != InstanceState::Running {
            return Ok(());
        }
        let next = InstanceState::for_status(status).unwrap_or(InstanceState::Killed);
        self.transition(next)
    }

    pub(crate) fn take_workdir(&mut self) -> Option<TempDir> {
        self.workdir.take()
    }

    pub(crate) fn take_permit(&mut self) -> Option<OwnedSemaphorePermit> {
        self.permit.take()
    }

    pub(crate) fn mark_reclaimed(&mut self) -> Result<()> {
        self.transition(InstanceState::Reclaimed)
    }
}

impl std::fmt::Debug for SandboxInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxInstance")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("container_id", &self.container_id)
            .field("workdir", &self.workdir_path)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl Drop for SandboxInstance {
    fn drop(&mut self) {
        if self.state == InstanceState::Reclaimed {
            return;
        }

        warn!(
            "Sandbox {} dropped in state {} without release, cleaning up",
            self.id, self.state
        );

        // The TempDir and permit release themselves; the container needs the engine.
        if let Some(container_id) = self.container_ref() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let engine = self.engine.clone();
                    handle.spawn(async move {
                        if let Err(e) = engine.remove_container(&container_id, true).await {
                            warn!("Fallback removal of {} failed: {}", container_id, e);
                        }
                    });
                }
                Err(_) => warn!(
                    "No runtime available to remove container {}; it will be swept as an orphan",
                    container_id
                ),
            }
        }
    }
}
