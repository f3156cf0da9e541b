// ABOUTME: Scores a submission against a set of input/expected-output test cases
// ABOUTME: Runs every case in its own sandbox and maps execution results to judge verdicts

use crate::error::SandboxError;
use crate::service::SandboxService;
use crate::types::{ExecutionRequest, ExecutionResult, ExecutionStatus, FailureKind};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Attempts per case when the pool is saturated
const ADMISSION_ATTEMPTS: u32 = 4;
const ADMISSION_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: i64,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default, alias = "output")]
    pub expected_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringStatus {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Timeout")]
    Timeout,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
}

impl std::fmt::Display for ScoringStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScoringStatus::Accepted => "Accepted",
            ScoringStatus::WrongAnswer => "Wrong Answer",
            ScoringStatus::CompilationError => "Compilation Error",
            ScoringStatus::RuntimeError => "Runtime Error",
            ScoringStatus::Timeout => "Timeout",
            ScoringStatus::MemoryLimitExceeded => "Memory Limit Exceeded",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResult {
    pub case_id: i64,
    pub status: ScoringStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    pub max_memory_kb: Option<u64>,
}

/// Run `code` against every case. Results come back in case order.
pub async fn score_submission(
    service: &SandboxService,
    code: &str,
    cases: &[TestCase],
) -> Vec<ScoringResult> {
    let parallelism = service.manager().ceiling().max(1);

    stream::iter(cases)
        .map(|case| score_case(service, code, case))
        .buffered(parallelism)
        .collect()
        .await
}

/// True when there is at least one case and every case passed
pub fn all_accepted(results: &[ScoringResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.status == ScoringStatus::Accepted)
}

async fn score_case(service: &SandboxService, code: &str, case: &TestCase) -> ScoringResult {
    let mut request = ExecutionRequest {
        time_limit_ms: case.time_limit_ms,
        memory_limit_mb: case.memory_limit_mb,
        ..ExecutionRequest::new(code, 0)
    };
    request.stdin = case.input.clone();

    let mut backoff = ADMISSION_BACKOFF;
    let mut attempt = 1;
    let outcome = loop {
        match service.execute(request.clone()).await {
            Err(SandboxError::AdmissionRejected { .. }) if attempt < ADMISSION_ATTEMPTS => {
                debug!(
                    "Case {} not admitted (attempt {}), retrying in {}ms",
                    case.id,
                    attempt,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            other => break other,
        }
    };

    match outcome {
        Ok(result) => verdict(case, result),
        Err(e) => {
            warn!("Case {} could not be executed: {}", case.id, e);
            ScoringResult {
                case_id: case.id,
                status: ScoringStatus::RuntimeError,
                stdout: String::new(),
                stderr: e.to_string(),
                elapsed_ms: 0,
                max_memory_kb: None,
            }
        }
    }
}

/// Judge one execution result against the case's expected output
pub fn verdict(case: &TestCase, result: ExecutionResult) -> ScoringResult {
    let status = match result.status {
        ExecutionStatus::Completed => {
            let expected = case.expected_output.as_deref().unwrap_or("");
            if result.stdout.text.trim() == expected.trim() {
                ScoringStatus::Accepted
            } else {
                ScoringStatus::WrongAnswer
            }
        }
        ExecutionStatus::TimedOut | ExecutionStatus::Killed => ScoringStatus::Timeout,
        ExecutionStatus::Crashed => match result.failure {
            Some(FailureKind::MemoryLimitExceeded) => ScoringStatus::MemoryLimitExceeded,
            Some(FailureKind::CompilationError) => ScoringStatus::CompilationError,
            _ => ScoringStatus::RuntimeError,
        },
        ExecutionStatus::InfrastructureFailure => ScoringStatus::RuntimeError,
    };

    let stderr = match (&result.message, result.status) {
        (Some(message), ExecutionStatus::InfrastructureFailure) => message.clone(),
        _ => result.stderr.text,
    };

    ScoringResult {
        case_id: case.id,
        status,
        stdout: result.stdout.text,
        stderr,
        elapsed_ms: result.duration_ms,
        max_memory_kb: result.max_memory_kb,
    }
}
