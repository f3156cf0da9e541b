// ABOUTME: Wall-clock watchdog, cancellation and per-container resource ceilings
// ABOUTME: Deadline expiry and caller cancellation share one SIGTERM, grace, SIGKILL termination path

use crate::engine::{self, ContainerSpec, Engine, ExitInfo};
use crate::error::{Result, SandboxError};
use crate::settings::SandboxSettings;
use crate::types::ExecutionRequest;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, warn};

/// Docker refuses memory limits below 6 MB
pub const MIN_MEMORY_MB: u64 = 6;

/// Effective limits for one sandbox, after defaults are applied
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceLimits {
    pub time_limit: Duration,
    pub memory_mb: u64,
    pub cpu_cores: f64,
    pub pids_limit: i64,
    pub network: bool,
}

impl ResourceLimits {
    /// Resolve a request's limits against the configured defaults and ceilings
    pub fn for_request(request: &ExecutionRequest, settings: &SandboxSettings) -> Result<Self> {
        let time_limit = match request.time_limit_ms {
            Some(0) => {
                return Err(SandboxError::InvalidRequest(
                    "timeLimitMs must be greater than zero".to_string(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => settings.default_time_limit,
        };

        if time_limit > settings.max_time_limit {
            return Err(SandboxError::InvalidRequest(format!(
                "timeLimitMs {} exceeds the maximum of {}",
                time_limit.as_millis(),
                settings.max_time_limit.as_millis()
            )));
        }

        let memory_mb = request.memory_limit_mb.unwrap_or(settings.default_memory_mb);
        if memory_mb < MIN_MEMORY_MB {
            return Err(SandboxError::InvalidRequest(format!(
                "memoryLimitMb must be at least {}",
                MIN_MEMORY_MB
            )));
        }

        let cpu_cores = request.cpu_limit.unwrap_or(settings.default_cpu_cores);
        if !cpu_cores.is_finite() || cpu_cores <= 0.0 {
            return Err(SandboxError::InvalidRequest(
                "cpuLimit must be a positive number of cores".to_string(),
            ));
        }

        if request.network && !settings.allow_network {
            return Err(SandboxError::InvalidRequest(
                "network access is disabled on this host".to_string(),
            ));
        }

        Ok(Self {
            time_limit,
            memory_mb,
            cpu_cores,
            pids_limit: settings.pids_limit,
            network: request.network,
        })
    }

    /// Copy the engine-enforced ceilings into a container spec
    pub fn apply(&self, spec: &mut ContainerSpec) {
        spec.memory_mb = self.memory_mb;
        spec.cpu_cores = self.cpu_cores;
        spec.pids_limit = self.pids_limit;
        spec.network_enabled = self.network;
    }
}

/// Caller side of a cancellation channel
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Request termination; the execution finishes as `Killed`
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Execution side of a cancellation channel
#[derive(Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Pending forever if every handle
    /// is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                if *self.rx.borrow() {
                    return;
                }
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// Timing of the termination path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminationPolicy {
    /// How long the process gets to exit after SIGTERM
    pub grace: Duration,
    /// How long to wait for the exit to be observed after SIGKILL
    pub settle: Duration,
}

impl TerminationPolicy {
    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            grace: settings.termination_grace,
            settle: settings.kill_settle,
        }
    }

    pub fn bound(&self) -> Duration {
        self.grace + self.settle
    }
}

/// Why supervision ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process exited on its own before the deadline
    Exited(ExitInfo),
    DeadlineExpired,
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct Supervision {
    pub termination: Termination,
    /// From process start until the exit was observed (or termination gave up)
    pub elapsed: Duration,
    /// Exit observed during termination, if any
    pub final_exit: Option<ExitInfo>,
}

pub struct Watchdog {
    engine: Arc<dyn Engine>,
    policy: TerminationPolicy,
}

impl Watchdog {
    pub fn new(engine: Arc<dyn Engine>, policy: TerminationPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> TerminationPolicy {
        self.policy
    }

    /// Race the container's exit against the deadline and the cancel signal.
    /// Call right after the container starts; the deadline counts from here.
    pub async fn supervise(
        &self,
        container_id: &str,
        limit: Duration,
        cancel: &mut CancelSignal,
    ) -> std::result::Result<Supervision, engine::EngineError> {
        let started = Instant::now();
        let mut wait = self.engine.wait_container(container_id);
        let deadline = tokio::time::sleep(limit);
        tokio::pin!(deadline);

        let termination = tokio::select! {
            biased;
            _ = &mut deadline => Termination::DeadlineExpired,
            _ = cancel.cancelled() => Termination::Cancelled,
            exit = &mut wait => {
                let exit = exit?;
                let elapsed = started.elapsed();
                if elapsed < limit {
                    return Ok(Supervision {
                        termination: Termination::Exited(exit),
                        elapsed,
                        final_exit: Some(exit),
                    });
                }
                // Exit raced the deadline; the deadline wins
                debug!(
                    "Container {} exited with {} at the deadline",
                    container_id, exit.exit_code
                );
                return Ok(Supervision {
                    termination: Termination::DeadlineExpired,
                    elapsed,
                    final_exit: Some(exit),
                });
            }
        };

        match termination {
            Termination::DeadlineExpired => warn!(
                "Container {} exceeded its {}ms time limit, terminating",
                container_id,
                limit.as_millis()
            ),
            _ => warn!("Container {} cancelled by caller, terminating", container_id),
        }

        let final_exit = self.terminate(container_id, &mut wait).await;

        Ok(Supervision {
            termination,
            elapsed: started.elapsed(),
            final_exit,
        })
    }

    /// SIGTERM, wait up to the grace window, then SIGKILL and wait up to the settle window
    async fn terminate<F>(&self, container_id: &str, wait: &mut F) -> Option<ExitInfo>
    where
        F: Future<Output = engine::Result<ExitInfo>> + Unpin,
    {
        if let Err(e) = self.engine.signal_container(container_id, "SIGTERM").await {
            warn!("Failed to send SIGTERM to {}: {}", container_id, e);
        }

        match timeout(self.policy.grace, &mut *wait).await {
            Ok(Ok(exit)) => {
                debug!("Container {} exited after SIGTERM", container_id);
                return Some(exit);
            }
            Ok(Err(e)) => {
                warn!("Lost track of {} during termination: {}", container_id, e);
                return None;
            }
            Err(_) => debug!(
                "Container {} ignored SIGTERM for {}ms, sending SIGKILL",
                container_id,
                self.policy.grace.as_millis()
            ),
        }

        if let Err(e) = self.engine.signal_container(container_id, "SIGKILL").await {
            warn!("Failed to send SIGKILL to {}: {}", container_id, e);
        }

        match timeout(self.policy.settle, wait).await {
            Ok(Ok(exit)) => Some(exit),
            Ok(Err(e)) => {
                warn!("Lost track of {} after SIGKILL: {}", container_id, e);
                None
            }
            Err(_) => {
                error!(
                    "Container {} still running {}ms after SIGKILL",
                    container_id,
                    self.policy.settle.as_millis()
                );
                None
            }
        }
    }
}
