// ABOUTME: Scripted in-memory container engine for unit tests
// ABOUTME: Decides each container's behaviour from the payload written into its working directory

use crate::engine::{
    ContainerSpec, Engine, EngineError, ExitInfo, ImageDetails, ManagedContainer, OutputChunk,
    OutputStream, Result, StreamType,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub(crate) const IMAGE_TAG: &str = "python-with-time";
pub(crate) const IMAGE_ID: &str =
    "sha256:3f1c0e4e8a5b1f6f9d2c7a0b4e6d8f1a2b3c4d5e6f708192a3b4c5d6e7f80912";

/// What a scripted container does once started
#[derive(Debug, Clone)]
pub(crate) struct Behavior {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i64,
    pub oom_killed: bool,
    /// `None` runs until signalled
    pub run_for: Option<Duration>,
    pub ignores_sigterm: bool,
    pub time_report: Option<String>,
}

impl Behavior {
    pub fn exits(exit_code: i64) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code,
            oom_killed: false,
            run_for: Some(Duration::from_millis(20)),
            ignores_sigterm: false,
            time_report: None,
        }
    }

    pub fn prints(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::exits(0)
        }
    }

    pub fn hangs() -> Self {
        Self {
            run_for: None,
            ..Self::exits(0)
        }
    }

    pub fn with_stderr(mut self, stderr: impl Into<Vec<u8>>) -> Self {
        self.stderr = stderr.into();
        self
    }

    pub fn oom(mut self) -> Self {
        self.exit_code = 137;
        self.oom_killed = true;
        self
    }

    pub fn after(mut self, run_for: Duration) -> Self {
        self.run_for = Some(run_for);
        self
    }

    pub fn ignoring_sigterm(mut self) -> Self {
        self.ignores_sigterm = true;
        self
    }

    pub fn with_time_report(mut self, report: impl Into<String>) -> Self {
        self.time_report = Some(report.into());
        self
    }
}

struct MockContainer {
    spec: ContainerSpec,
    behavior: Behavior,
    started: bool,
    exit: Arc<watch::Sender<Option<ExitInfo>>>,
}

type Script = Box<dyn Fn(&str) -> Behavior + Send + Sync>;

pub(crate) struct ScriptedEngine {
    script: Script,
    containers: Mutex<HashMap<String, MockContainer>>,
    next_id: AtomicUsize,
    running: Arc<AtomicUsize>,
    pub max_running: Arc<AtomicUsize>,
    pub created: AtomicUsize,
    pub removed: AtomicUsize,
    pub signals: Mutex<Vec<(String, String)>>,
    pub specs: Mutex<Vec<ContainerSpec>>,
    pub orphans: Mutex<Vec<ManagedContainer>>,
    pub unreachable: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_start: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl ScriptedEngine {
    /// Every container prints nothing and exits 0
    pub fn new() -> Self {
        Self::with_script(|_| Behavior::exits(0))
    }

    pub fn with_script(script: impl Fn(&str) -> Behavior + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            containers: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            running: Arc::new(AtomicUsize::new(0)),
            max_running: Arc::new(AtomicUsize::new(0)),
            created: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
            signals: Mutex::new(Vec::new()),
            specs: Mutex::new(Vec::new()),
            orphans: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }

    /// Containers created but not yet removed
    pub fn existing(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn signals_sent(&self) -> Vec<String> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .map(|(_, signal)| signal.clone())
            .collect()
    }

    pub fn last_spec(&self) -> Option<ContainerSpec> {
        self.specs.lock().unwrap().last().cloned()
    }

    fn exit_sender(&self, container_id: &str) -> Result<Arc<watch::Sender<Option<ExitInfo>>>> {
        self.containers
            .lock()
            .unwrap()
            .get(container_id)
            .map(|c| c.exit.clone())
            .ok_or_else(|| EngineError::NotFound(container_id.to_string()))
    }
}

/// Record the container's exit once; later calls are ignored
fn finish(exit: &watch::Sender<Option<ExitInfo>>, running: &AtomicUsize, info: ExitInfo) {
    let changed = exit.send_if_modified(|current| {
        if current.is_none() {
            *current = Some(info);
            true
        } else {
            false
        }
    });
    if changed {
        running.fetch_sub(1, Ordering::SeqCst);
    }
}

fn workdir_of(spec: &ContainerSpec) -> Option<PathBuf> {
    spec.mounts.first().map(|m| PathBuf::from(&m.host_path))
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(EngineError::ConnectionError("daemon not running".to_string()));
        }
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>> {
        if image == IMAGE_TAG || image == IMAGE_ID {
            Ok(Some(ImageDetails {
                id: IMAGE_ID.to_string(),
                tags: vec![format!("{}:latest", IMAGE_TAG)],
                created: None,
            }))
        } else {
            Ok(None)
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(EngineError::ContainerError("no space left on device".to_string()));
        }

        let code = workdir_of(spec)
            .and_then(|dir| std::fs::read_to_string(dir.join("main.py")).ok())
            .unwrap_or_default();
        let behavior = (self.script)(&code);

        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (exit, _) = watch::channel(None);
        self.containers.lock().unwrap().insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                behavior,
                started: false,
                exit: Arc::new(exit),
            },
        );
        self.specs.lock().unwrap().push(spec.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineError::ContainerError(
                "OCI runtime create failed".to_string(),
            ));
        }

        let (behavior, exit, workdir) = {
            let mut containers = self.containers.lock().unwrap();
            let container = containers
                .get_mut(container_id)
                .ok_or_else(|| EngineError::NotFound(container_id.to_string()))?;
            container.started = true;
            (
                container.behavior.clone(),
                container.exit.clone(),
                workdir_of(&container.spec),
            )
        };

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        if let Some(run_for) = behavior.run_for {
            let running = self.running.clone();
            tokio::spawn(async move {
                tokio::time::sleep(run_for).await;
                if let (Some(report), Some(dir)) = (&behavior.time_report, workdir) {
                    let _ = std::fs::write(dir.join(".time_stats"), report);
                }
                finish(
                    &exit,
                    &running,
                    ExitInfo {
                        exit_code: behavior.exit_code,
                        oom_killed: behavior.oom_killed,
                    },
                );
            });
        }

        Ok(())
    }

    async fn attach_output(&self, container_id: &str) -> Result<OutputStream> {
        let (behavior, exit) = {
            let containers = self.containers.lock().unwrap();
            let container = containers
                .get(container_id)
                .ok_or_else(|| EngineError::NotFound(container_id.to_string()))?;
            (container.behavior.clone(), container.exit.clone())
        };

        let (tx, stream) = OutputStream::channel();
        let mut exited = exit.subscribe();

        tokio::spawn(async move {
            for (stream, data) in [
                (StreamType::Stdout, behavior.stdout),
                (StreamType::Stderr, behavior.stderr),
            ] {
                for piece in data.chunks(4096) {
                    let chunk = OutputChunk {
                        stream,
                        data: piece.to_vec(),
                    };
                    if tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            }
            // Output closes when the process does
            let _ = exited.wait_for(|e| e.is_some()).await;
        });

        Ok(stream)
    }

    async fn wait_container(&self, container_id: &str) -> Result<ExitInfo> {
        let mut exited = self.exit_sender(container_id)?.subscribe();
        let info = *exited
            .wait_for(|e| e.is_some())
            .await
            .map_err(|_| EngineError::ContainerError("container vanished".to_string()))?;
        Ok(info.unwrap_or(ExitInfo {
            exit_code: 137,
            oom_killed: false,
        }))
    }

    async fn signal_container(&self, container_id: &str, signal: &str) -> Result<()> {
        self.signals
            .lock()
            .unwrap()
            .push((container_id.to_string(), signal.to_string()));

        let (ignores_sigterm, started, exit) = {
            let containers = self.containers.lock().unwrap();
            match containers.get(container_id) {
                Some(c) => (c.behavior.ignores_sigterm, c.started, c.exit.clone()),
                None => return Ok(()),
            }
        };
        if !started {
            return Ok(());
        }

        match signal {
            "SIGKILL" => finish(
                &exit,
                &self.running,
                ExitInfo {
                    exit_code: 137,
                    oom_killed: false,
                },
            ),
            "SIGTERM" if !ignores_sigterm => finish(
                &exit,
                &self.running,
                ExitInfo {
                    exit_code: 143,
                    oom_killed: false,
                },
            ),
            _ => {}
        }
        Ok(())
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(EngineError::ContainerError("device or resource busy".to_string()));
        }

        // Docker accepts a container name wherever it accepts an id
        let removed = {
            let mut containers = self.containers.lock().unwrap();
            let key = if containers.contains_key(container_id) {
                Some(container_id.to_string())
            } else {
                containers
                    .iter()
                    .find(|(_, c)| c.spec.name == container_id)
                    .map(|(id, _)| id.clone())
            };
            key.and_then(|key| containers.remove(&key))
        };
        if let Some(container) = removed {
            if container.started && force {
                finish(
                    &container.exit,
                    &self.running,
                    ExitInfo {
                        exit_code: 137,
                        oom_killed: false,
                    },
                );
            }
            self.removed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.orphans.lock().unwrap().retain(|o| o.id != container_id);
        }
        Ok(())
    }

    async fn list_labelled_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ManagedContainer>> {
        let mut listed: Vec<ManagedContainer> = self
            .orphans
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.labels.get(label).map(String::as_str) == Some(value))
            .cloned()
            .collect();

        let containers = self.containers.lock().unwrap();
        for (id, container) in containers.iter() {
            if container.spec.labels.get(label).map(String::as_str) == Some(value) {
                listed.push(ManagedContainer {
                    id: id.clone(),
                    name: container.spec.name.clone(),
                    state: if container.started { "running" } else { "created" }.to_string(),
                    labels: container.spec.labels.clone(),
                });
            }
        }
        Ok(listed)
    }
}

/// Wraps an engine and stalls inside `create_container` (after the container
/// exists) and `remove_container` (before removal takes effect).
pub(crate) struct SlowEngine {
    pub inner: Arc<ScriptedEngine>,
    pub create_delay: Duration,
    pub remove_delay: Duration,
}

#[async_trait]
impl Engine for SlowEngine {
    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn inspect_image(&self, image: &str) -> Result<Option<ImageDetails>> {
        self.inner.inspect_image(image).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let id = self.inner.create_container(spec).await?;
        tokio::time::sleep(self.create_delay).await;
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<()> {
        self.inner.start_container(container_id).await
    }

    async fn attach_output(&self, container_id: &str) -> Result<OutputStream> {
        self.inner.attach_output(container_id).await
    }

    async fn wait_container(&self, container_id: &str) -> Result<ExitInfo> {
        self.inner.wait_container(container_id).await
    }

    async fn signal_container(&self, container_id: &str, signal: &str) -> Result<()> {
        self.inner.signal_container(container_id, signal).await
    }

    async fn remove_container(&self, container_id: &str, force: bool) -> Result<()> {
        tokio::time::sleep(self.remove_delay).await;
        self.inner.remove_container(container_id, force).await
    }

    async fn list_labelled_containers(
        &self,
        label: &str,
        value: &str,
    ) -> Result<Vec<ManagedContainer>> {
        self.inner.list_labelled_containers(label, value).await
    }
}
