// ABOUTME: Request and result types of the sandbox execution contract
// ABOUTME: Serialized in camelCase for callers that speak JSON

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Language runtime the payload is written for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    #[default]
    Python,
}

impl Runtime {
    /// File name the payload is written to inside the working directory
    pub fn entrypoint(&self) -> &'static str {
        match self {
            Runtime::Python => "main.py",
        }
    }

    /// Interpreter invocation for the entrypoint
    pub fn interpreter(&self) -> &'static str {
        match self {
            Runtime::Python => "python",
        }
    }
}

/// A single code execution request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub code: String,
    #[serde(default)]
    pub runtime: Runtime,
    /// Wall-clock limit; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
    /// Fractional CPU cores
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default)]
    pub network: bool,
}

impl ExecutionRequest {
    pub fn new(code: impl Into<String>, time_limit_ms: u64) -> Self {
        Self {
            code: code.into(),
            runtime: Runtime::Python,
            time_limit_ms: Some(time_limit_ms),
            memory_limit_mb: None,
            cpu_limit: None,
            env: HashMap::new(),
            stdin: None,
            network: false,
        }
    }

    pub fn with_memory_limit_mb(mut self, memory_limit_mb: u64) -> Self {
        self.memory_limit_mb = Some(memory_limit_mb);
        self
    }

    pub fn with_cpu_limit(mut self, cores: f64) -> Self {
        self.cpu_limit = Some(cores);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_network(mut self, network: bool) -> Self {
        self.network = network;
        self
    }
}

/// Terminal status of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Completed,
    TimedOut,
    Crashed,
    Killed,
    InfrastructureFailure,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Completed => "Completed",
            ExecutionStatus::TimedOut => "TimedOut",
            ExecutionStatus::Crashed => "Crashed",
            ExecutionStatus::Killed => "Killed",
            ExecutionStatus::InfrastructureFailure => "InfrastructureFailure",
        };
        write!(f, "{}", s)
    }
}

/// Why a crashed execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    CompilationError,
    RuntimeError,
    MemoryLimitExceeded,
}

/// One captured output stream, possibly cut at the configured cap.
///
/// When `truncated` is set, `text` is at most the cap in bytes. It falls short
/// of the cap only when the cut would split a multi-byte UTF-8 character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

impl CapturedOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}

/// Normalized outcome of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
    /// Present only for `Completed` and `Crashed`
    pub exit_code: Option<i64>,
    pub duration_ms: u64,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_kb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionResult {
    /// Result for a failure of the sandbox itself, never of the submitted code
    pub fn infrastructure_failure(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::InfrastructureFailure,
            stdout: CapturedOutput::default(),
            stderr: CapturedOutput::default(),
            exit_code: None,
            duration_ms,
            timed_out: false,
            failure: None,
            max_memory_kb: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}
