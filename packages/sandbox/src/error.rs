// ABOUTME: Error types for sandboxed code execution
// ABOUTME: Separates caller-visible admission/validation failures from engine and infrastructure faults

use crate::engine::EngineError;
use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Pool saturated; the caller should retry with backoff
    #[error("Admission rejected: {ceiling} sandboxes already live, gave up after {waited_ms}ms")]
    AdmissionRejected { ceiling: usize, waited_ms: u64 },

    /// Runtime image missing at startup
    #[error(
        "Runtime image '{image}' not found. Build it first with: \
         docker build -t {image} docker/python-with-time"
    )]
    ImageNotFound { image: String },

    /// Container engine unreachable at startup
    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Container engine errors
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Provisioning or teardown failed outside the engine
    #[error("Infrastructure failure: {0}")]
    Infrastructure(String),

    /// Invalid execution request
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    /// Illegal sandbox lifecycle transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] timebox_config::ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SandboxError {
    /// True when the failure belongs to the sandbox rather than the submitted code or request.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            SandboxError::Engine(_)
                | SandboxError::EngineUnavailable(_)
                | SandboxError::Infrastructure(_)
                | SandboxError::ImageNotFound { .. }
                | SandboxError::Io(_)
        )
    }
}

/// Type alias for Results that return SandboxError
pub type Result<T> = std::result::Result<T, SandboxError>;
