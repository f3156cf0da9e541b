// ABOUTME: Maps command results and errors onto process exit codes
// ABOUTME: 0 for success, 1 for a failed or rejected submission, 2 for infrastructure or configuration faults

use timebox_sandbox::{
    all_accepted, ExecutionResult, ExecutionStatus, SandboxError, ScoringResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Success,
    Failure,
    Infrastructure,
}

impl CommandOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            CommandOutcome::Success => 0,
            CommandOutcome::Failure => 1,
            CommandOutcome::Infrastructure => 2,
        }
    }

    pub fn for_execution(result: &ExecutionResult) -> Self {
        match result.status {
            ExecutionStatus::Completed => CommandOutcome::Success,
            ExecutionStatus::InfrastructureFailure => CommandOutcome::Infrastructure,
            _ => CommandOutcome::Failure,
        }
    }

    pub fn for_scores(results: &[ScoringResult]) -> Self {
        if all_accepted(results) {
            CommandOutcome::Success
        } else {
            CommandOutcome::Failure
        }
    }

    /// Requests the sandbox refused are the caller's fault. Everything else
    /// (configuration, unreadable inputs, engine faults, saturation) is ours.
    pub fn for_error(error: &anyhow::Error) -> Self {
        let rejected = error.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<SandboxError>(),
                Some(SandboxError::InvalidRequest(_))
            )
        });
        if rejected {
            CommandOutcome::Failure
        } else {
            CommandOutcome::Infrastructure
        }
    }
}
