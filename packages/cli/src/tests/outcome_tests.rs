use crate::input::InputError;
use crate::outcome::CommandOutcome;
use anyhow::Context;
use pretty_assertions::assert_eq;
use rstest::rstest;
use timebox_sandbox::{
    CapturedOutput, ExecutionResult, ExecutionStatus, SandboxError, ScoringResult, ScoringStatus,
};

fn result_with(status: ExecutionStatus) -> ExecutionResult {
    ExecutionResult {
        status,
        stdout: CapturedOutput::default(),
        stderr: CapturedOutput::default(),
        exit_code: None,
        duration_ms: 12,
        timed_out: status == ExecutionStatus::TimedOut,
        failure: None,
        max_memory_kb: None,
        message: None,
    }
}

fn scored(case_id: i64, status: ScoringStatus) -> ScoringResult {
    ScoringResult {
        case_id,
        status,
        stdout: String::new(),
        stderr: String::new(),
        elapsed_ms: 5,
        max_memory_kb: None,
    }
}

#[test]
fn test_exit_codes() {
    assert_eq!(CommandOutcome::Success.exit_code(), 0);
    assert_eq!(CommandOutcome::Failure.exit_code(), 1);
    assert_eq!(CommandOutcome::Infrastructure.exit_code(), 2);
}

#[rstest]
#[case(ExecutionStatus::Completed, CommandOutcome::Success)]
#[case(ExecutionStatus::TimedOut, CommandOutcome::Failure)]
#[case(ExecutionStatus::Crashed, CommandOutcome::Failure)]
#[case(ExecutionStatus::Killed, CommandOutcome::Failure)]
#[case(ExecutionStatus::InfrastructureFailure, CommandOutcome::Infrastructure)]
fn test_outcome_for_execution(#[case] status: ExecutionStatus, #[case] expected: CommandOutcome) {
    assert_eq!(CommandOutcome::for_execution(&result_with(status)), expected);
}

#[test]
fn test_outcome_for_scores() {
    let passing = vec![
        scored(1, ScoringStatus::Accepted),
        scored(2, ScoringStatus::Accepted),
    ];
    let failing = vec![
        scored(1, ScoringStatus::Accepted),
        scored(2, ScoringStatus::WrongAnswer),
    ];

    assert_eq!(CommandOutcome::for_scores(&passing), CommandOutcome::Success);
    assert_eq!(CommandOutcome::for_scores(&failing), CommandOutcome::Failure);
    assert_eq!(CommandOutcome::for_scores(&[]), CommandOutcome::Failure);
}

#[test]
fn test_invalid_request_is_caller_failure() {
    let err: anyhow::Result<()> =
        Err(SandboxError::InvalidRequest("time limit must be positive".into()))
            .context("Sandbox refused to run main.py");

    assert_eq!(
        CommandOutcome::for_error(&err.unwrap_err()),
        CommandOutcome::Failure
    );
}

#[rstest]
#[case(SandboxError::EngineUnavailable("connection refused".into()))]
#[case(SandboxError::ImageNotFound { image: "python-with-time".into() })]
#[case(SandboxError::AdmissionRejected { ceiling: 4, waited_ms: 5000 })]
fn test_sandbox_faults_are_infrastructure(#[case] error: SandboxError) {
    let err = anyhow::Error::new(error).context("Failed to start the sandbox service");

    assert_eq!(CommandOutcome::for_error(&err), CommandOutcome::Infrastructure);
}

#[test]
fn test_input_errors_are_infrastructure() {
    let err = anyhow::Error::new(InputError::Empty {
        path: "cases.json".into(),
    });

    assert_eq!(CommandOutcome::for_error(&err), CommandOutcome::Infrastructure);
}
