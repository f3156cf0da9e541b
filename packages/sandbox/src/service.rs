// ABOUTME: Entry point for sandboxed code execution
// ABOUTME: Validates requests and guarantees every admitted instance is released before a result is returned

use crate::collector;
use crate::driver::ExecutionDriver;
use crate::engine::{DockerEngine, Engine};
use crate::error::{Result, SandboxError};
use crate::image::{ImageHandle, ImageRegistry};
use crate::limiter::{cancel_pair, CancelHandle, CancelSignal, ResourceLimits};
use crate::manager::SandboxManager;
use crate::settings::SandboxSettings;
use crate::types::{ExecutionRequest, ExecutionResult};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SandboxService {
    engine: Arc<dyn Engine>,
    image: Arc<ImageHandle>,
    manager: Arc<SandboxManager>,
    driver: ExecutionDriver,
    settings: SandboxSettings,
}

impl SandboxService {
    /// Connect to the local Docker daemon and prepare the sandbox pool.
    ///
    /// Fails fast when the daemon is unreachable or the runtime image has not been built.
    pub async fn connect(settings: SandboxSettings) -> Result<Self> {
        let engine =
            DockerEngine::connect().map_err(|e| SandboxError::EngineUnavailable(e.to_string()))?;
        Self::with_engine(Arc::new(engine), settings).await
    }

    /// Build the service on top of an existing engine
    pub async fn with_engine(engine: Arc<dyn Engine>, settings: SandboxSettings) -> Result<Self> {
        settings.validate()?;

        engine
            .ping()
            .await
            .map_err(|e| SandboxError::EngineUnavailable(e.to_string()))?;

        let image = Arc::new(
            ImageRegistry::resolve_runtime_image(engine.as_ref(), &settings.image).await?,
        );
        let manager = Arc::new(SandboxManager::new(engine.clone(), &settings));

        if settings.sweep_orphans {
            match manager.cleanup_orphaned_containers(false).await {
                Ok((orphaned, removed, _)) if orphaned > 0 => {
                    info!(
                        "Removed {}/{} containers left over by earlier sessions",
                        removed, orphaned
                    )
                }
                Ok(_) => debug!("No orphaned sandbox containers found"),
                Err(e) => warn!("Orphan sweep failed: {}", e),
            }
        }

        let driver = ExecutionDriver::new(engine.clone(), image.clone(), &settings);

        info!(
            "Sandbox service ready: image {} ({}), up to {} concurrent sandboxes",
            image.tag(),
            image.id(),
            settings.max_concurrent
        );

        Ok(Self {
            engine,
            image,
            manager,
            driver,
            settings,
        })
    }

    pub fn image(&self) -> &ImageHandle {
        &self.image
    }

    pub fn manager(&self) -> &SandboxManager {
        &self.manager
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.settings
    }

    pub fn engine(&self) -> Arc<dyn Engine> {
        self.engine.clone()
    }

    /// Run one request to completion.
    ///
    /// `Err` is reserved for requests that never ran: admission rejection and
    /// invalid input. Everything else, including engine failures, is a result.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        self.execute_with_cancel(request, CancelSignal::never())
            .await
    }

    /// Like [`execute`](Self::execute), returning a handle that terminates the
    /// run early with status `Killed`
    pub fn execute_cancellable(
        &self,
        request: ExecutionRequest,
    ) -> (
        CancelHandle,
        impl Future<Output = Result<ExecutionResult>> + Send + '_,
    ) {
        let (handle, signal) = cancel_pair();
        (handle, self.execute_with_cancel(request, signal))
    }

    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancelSignal,
    ) -> Result<ExecutionResult> {
        validate_request(&request)?;
        let limits = ResourceLimits::for_request(&request, &self.settings)?;
        let time_limit = limits.time_limit;

        let mut instance = match self.manager.acquire(limits).await {
            Ok(instance) => instance,
            Err(e @ SandboxError::AdmissionRejected { .. }) => return Err(e),
            Err(e) => {
                warn!("Failed to provision sandbox: {}", e);
                return Ok(ExecutionResult::infrastructure_failure(e.to_string(), 0));
            }
        };

        let outcome = self.driver.run(&mut instance, &request, cancel).await;
        let result = collector::collect(outcome, time_limit);

        if let Err(e) = instance.record_outcome(result.status) {
            warn!("{}", e);
        }
        self.manager.release(&mut instance).await;

        info!(
            "Execution {} finished: {} in {}ms (exit code {:?})",
            instance.id(),
            result.status,
            result.duration_ms,
            result.exit_code
        );

        Ok(result)
    }
}

/// Checks that do not depend on configuration
fn validate_request(request: &ExecutionRequest) -> Result<()> {
    if request.code.contains('\0') {
        return Err(SandboxError::InvalidRequest(
            "code must not contain NUL bytes".to_string(),
        ));
    }

    for (key, value) in &request.env {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            return Err(SandboxError::InvalidRequest(format!(
                "invalid environment variable name: {:?}",
                key
            )));
        }
        if value.contains('\0') {
            return Err(SandboxError::InvalidRequest(format!(
                "environment variable {} contains a NUL byte",
                key
            )));
        }
    }

    Ok(())
}
