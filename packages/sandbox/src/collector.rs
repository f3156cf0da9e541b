// ABOUTME: Normalizes raw container outcomes into execution results
// ABOUTME: Applies status precedence, failure classification and GNU time report parsing

use crate::engine::ExitInfo;
use crate::types::{CapturedOutput, ExecutionResult, ExecutionStatus, FailureKind};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

lazy_static! {
    static ref MAX_RSS: Regex =
        Regex::new(r"Maximum resident set size \(kbytes\):\s*(\d+)").unwrap();
}

/// Exit status of a process killed by SIGKILL (128 + 9)
pub const SIGKILL_EXIT_CODE: i64 = 137;

/// How the run ended, before interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum RawTermination {
    /// Exited on its own within the time limit
    Exited(ExitInfo),
    /// Terminated by the watchdog
    TimedOut,
    /// Terminated on caller request
    Cancelled,
    /// The engine failed; the message is for operators
    EngineFailure(String),
}

#[derive(Debug, Clone)]
pub struct RawOutcome {
    pub termination: RawTermination,
    pub stdout: CapturedOutput,
    pub stderr: CapturedOutput,
    pub elapsed: Duration,
    /// Contents of the GNU time report, when one was written
    pub resource_report: Option<String>,
}

/// Build the caller-facing result for one run
pub fn collect(outcome: RawOutcome, time_limit: Duration) -> ExecutionResult {
    let duration_ms = outcome.elapsed.as_millis() as u64;
    let max_memory_kb = outcome
        .resource_report
        .as_deref()
        .and_then(parse_max_memory_kb);

    let mut result = ExecutionResult {
        status: ExecutionStatus::Completed,
        stdout: outcome.stdout,
        stderr: outcome.stderr,
        exit_code: None,
        duration_ms,
        timed_out: false,
        failure: None,
        max_memory_kb,
        message: None,
    };

    match outcome.termination {
        RawTermination::Exited(exit) if exit.exit_code == 0 && !exit.oom_killed => {
            result.exit_code = Some(0);
        }
        RawTermination::Exited(exit) => {
            result.status = ExecutionStatus::Crashed;
            result.exit_code = Some(exit.exit_code);
            result.failure = Some(classify_failure(exit, &result.stderr.text));
        }
        RawTermination::TimedOut => {
            result.status = ExecutionStatus::TimedOut;
            result.timed_out = true;
            result.message = Some(format!(
                "Execution exceeded the time limit of {}ms",
                time_limit.as_millis()
            ));
        }
        RawTermination::Cancelled => {
            result.status = ExecutionStatus::Killed;
            result.message = Some("Execution cancelled".to_string());
        }
        RawTermination::EngineFailure(message) => {
            result.status = ExecutionStatus::InfrastructureFailure;
            result.message = Some(message);
        }
    }

    result
}

/// Why a non-zero exit happened
pub fn classify_failure(exit: ExitInfo, stderr: &str) -> FailureKind {
    if exit.oom_killed || exit.exit_code == SIGKILL_EXIT_CODE {
        FailureKind::MemoryLimitExceeded
    } else if stderr.contains("SyntaxError:") || stderr.contains("IndentationError:") {
        FailureKind::CompilationError
    } else {
        FailureKind::RuntimeError
    }
}

/// Peak resident set size from a `time -v` report
pub fn parse_max_memory_kb(report: &str) -> Option<u64> {
    MAX_RSS.captures(report)?.get(1)?.as_str().parse().ok()
}
