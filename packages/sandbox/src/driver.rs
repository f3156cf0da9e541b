// ABOUTME: Runs one payload inside a provisioned sandbox instance
// ABOUTME: Writes the payload, creates and starts the container, captures output and hands the wait to the watchdog

use crate::capture::{self, OutputCapture, SharedCapture};
use crate::collector::{RawOutcome, RawTermination};
use crate::engine::{ContainerSpec, Engine, VolumeMount};
use crate::image::ImageHandle;
use crate::instance::{InstanceState, SandboxInstance};
use crate::limiter::{CancelSignal, Termination, TerminationPolicy, Watchdog};
use crate::settings::SandboxSettings;
use crate::types::{CapturedOutput, ExecutionRequest, Runtime};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Where the working directory is mounted inside the container
pub const SANDBOX_MOUNT: &str = "/sandbox";

/// Sticky, writable but not listable by other users
#[cfg(unix)]
const WORKDIR_MODE: u32 = 0o1733;

/// Engine-side log ceiling as a multiple of the capture caps; covers json-file framing
const LOG_HEADROOM: usize = 4;
pub const STDIN_FILE: &str = "stdin.txt";
pub const TIME_REPORT_FILE: &str = ".time_stats";

pub struct ExecutionDriver {
    engine: Arc<dyn Engine>,
    image: Arc<ImageHandle>,
    watchdog: Watchdog,
    stdout_cap: usize,
    stderr_cap: usize,
    /// How long to wait for the output stream to close once the process is gone
    output_settle: Duration,
}

impl ExecutionDriver {
    pub fn new(engine: Arc<dyn Engine>, image: Arc<ImageHandle>, settings: &SandboxSettings) -> Self {
        Self {
            watchdog: Watchdog::new(engine.clone(), TerminationPolicy::from_settings(settings)),
            engine,
            image,
            stdout_cap: settings.stdout_cap_bytes,
            stderr_cap: settings.stderr_cap_bytes,
            output_settle: settings.kill_settle,
        }
    }

    /// Shell command run inside the container. GNU time wraps the interpreter
    /// and writes its report into the working directory.
    pub fn command_for(runtime: Runtime, has_stdin: bool) -> Vec<String> {
        let stdin = if has_stdin {
            format!("{}/{}", SANDBOX_MOUNT, STDIN_FILE)
        } else {
            "/dev/null".to_string()
        };
        let script = format!(
            "exec /usr/bin/time -v -o {mount}/{report} {interpreter} -u {entry} < {stdin}",
            mount = SANDBOX_MOUNT,
            report = TIME_REPORT_FILE,
            interpreter = runtime.interpreter(),
            entry = runtime.entrypoint(),
            stdin = stdin,
        );
        vec!["sh".to_string(), "-c".to_string(), script]
    }

    /// Execute `request` in `instance`, which must be `Provisioning`.
    ///
    /// Never fails: engine errors come back as an engine-failure outcome so the
    /// caller always proceeds to release.
    pub async fn run(
        &self,
        instance: &mut SandboxInstance,
        request: &ExecutionRequest,
        mut cancel: CancelSignal,
    ) -> RawOutcome {
        let capture: SharedCapture = Arc::new(Mutex::new(OutputCapture::new(
            self.stdout_cap,
            self.stderr_cap,
        )));

        if let Err(e) = write_payload(instance.workdir(), request).await {
            return self.failure(&capture, format!("failed to write payload: {}", e), None);
        }

        let spec = self.container_spec(instance, request);
        instance.mark_container_requested();
        let container_id = match self.engine.create_container(&spec).await {
            Ok(id) => id,
            Err(e) => {
                return self.failure(&capture, format!("failed to create container: {}", e), None)
            }
        };
        instance.attach_container(container_id.clone());

        if let Err(e) = self.engine.start_container(&container_id).await {
            return self.failure(&capture, format!("failed to start container: {}", e), None);
        }
        let started = Instant::now();

        if let Err(e) = instance.transition(InstanceState::Running) {
            return self.failure(&capture, e.to_string(), Some(started));
        }
        info!(
            "Sandbox {} running in container {} (limit {}ms)",
            instance.id(),
            container_id,
            instance.limits().time_limit.as_millis()
        );

        let mut drain = match self.engine.attach_output(&container_id).await {
            Ok(stream) => tokio::spawn(capture::drain(stream, capture.clone())),
            Err(e) => {
                return self.failure(
                    &capture,
                    format!("failed to attach to container output: {}", e),
                    Some(started),
                )
            }
        };

        let supervision = self
            .watchdog
            .supervise(&container_id, instance.limits().time_limit, &mut cancel)
            .await;

        if timeout(self.output_settle, &mut drain).await.is_err() {
            warn!(
                "Output stream of {} still open {}ms after exit, keeping what was captured",
                container_id,
                self.output_settle.as_millis()
            );
            drain.abort();
        }

        let (termination, elapsed) = match supervision {
            Ok(supervision) => {
                let termination = match supervision.termination {
                    Termination::Exited(exit) => RawTermination::Exited(exit),
                    Termination::DeadlineExpired => RawTermination::TimedOut,
                    Termination::Cancelled => RawTermination::Cancelled,
                };
                (termination, supervision.elapsed)
            }
            Err(e) => (
                RawTermination::EngineFailure(format!("lost track of container: {}", e)),
                started.elapsed(),
            ),
        };

        let resource_report =
            tokio::fs::read_to_string(instance.workdir().join(TIME_REPORT_FILE))
                .await
                .ok();

        debug!(
            "Sandbox {} finished: {:?} after {}ms",
            instance.id(),
            termination,
            elapsed.as_millis()
        );

        let (stdout, stderr) = snapshot(&capture);
        RawOutcome {
            termination,
            stdout,
            stderr,
            elapsed,
            resource_report,
        }
    }

    fn container_spec(&self, instance: &SandboxInstance, request: &ExecutionRequest) -> ContainerSpec {
        let mut env_vars: HashMap<String, String> = request.env.clone();
        // Forward signals from docker-init to the whole process group
        env_vars.insert("TINI_KILL_PROCESS_GROUP".to_string(), "1".to_string());
        env_vars.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());

        let mut spec = ContainerSpec {
            image: self.image.id().to_string(),
            name: instance.container_name(),
            command: Self::command_for(request.runtime, request.stdin.is_some()),
            working_dir: SANDBOX_MOUNT.to_string(),
            mounts: vec![VolumeMount {
                host_path: instance.workdir().to_string_lossy().into_owned(),
                container_path: SANDBOX_MOUNT.to_string(),
                readonly: false,
            }],
            env_vars,
            memory_mb: 0,
            cpu_cores: 0.0,
            pids_limit: 0,
            network_enabled: false,
            labels: instance.labels(),
            log_max_bytes: ((self.stdout_cap + self.stderr_cap) * LOG_HEADROOM) as u64,
        };
        instance.limits().apply(&mut spec);
        spec
    }

    fn failure(
        &self,
        capture: &SharedCapture,
        message: String,
        started: Option<Instant>,
    ) -> RawOutcome {
        warn!("Sandbox execution failed: {}", message);
        let (stdout, stderr) = snapshot(capture);
        RawOutcome {
            termination: RawTermination::EngineFailure(message),
            stdout,
            stderr,
            elapsed: started.map(|s| s.elapsed()).unwrap_or_default(),
            resource_report: None,
        }
    }
}

fn snapshot(capture: &SharedCapture) -> (CapturedOutput, CapturedOutput) {
    match capture.lock() {
        Ok(capture) => capture.finish(),
        Err(poisoned) => poisoned.into_inner().finish(),
    }
}

/// Write the entrypoint (and stdin, if any) into the working directory, readable
/// by whatever user the image runs as.
async fn write_payload(workdir: &Path, request: &ExecutionRequest) -> std::io::Result<()> {
    let entrypoint = workdir.join(request.runtime.entrypoint());
    tokio::fs::write(&entrypoint, &request.code).await?;

    if let Some(stdin) = &request.stdin {
        tokio::fs::write(workdir.join(STDIN_FILE), stdin).await?;
    }

    #[cfg(unix)]
    {
        use std::fs::Permissions;
        use std::os::unix::fs::PermissionsExt;

        // Capabilities are dropped inside the container, so ownership does not help.
        // Others may add files (the time report) but not list, rename or replace ours.
        tokio::fs::set_permissions(&entrypoint, Permissions::from_mode(0o644)).await?;
        if request.stdin.is_some() {
            tokio::fs::set_permissions(workdir.join(STDIN_FILE), Permissions::from_mode(0o644))
                .await?;
        }
        tokio::fs::set_permissions(workdir, Permissions::from_mode(WORKDIR_MODE)).await?;
    }

    Ok(())
}
