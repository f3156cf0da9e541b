// ABOUTME: Time-bounded, resource-limited execution of untrusted code in ephemeral Docker sandboxes
// ABOUTME: Exposes the sandbox service plus the manager, driver, watchdog and collector it is built from

pub mod capture;
pub mod collector;
pub mod driver;
pub mod engine;
pub mod error;
pub mod image;
pub mod instance;
pub mod limiter;
pub mod manager;
pub mod scoring;
pub mod service;
pub mod settings;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{DockerEngine, Engine, EngineError};
pub use error::{Result, SandboxError};
pub use image::{ImageHandle, ImageRegistry};
pub use instance::{InstanceState, SandboxInstance};
pub use limiter::{cancel_pair, CancelHandle, CancelSignal, ResourceLimits};
pub use manager::SandboxManager;
pub use scoring::{all_accepted, score_submission, ScoringResult, ScoringStatus, TestCase};
pub use service::SandboxService;
pub use settings::SandboxSettings;
pub use types::{
    CapturedOutput, ExecutionRequest, ExecutionResult, ExecutionStatus, FailureKind, Runtime,
};
