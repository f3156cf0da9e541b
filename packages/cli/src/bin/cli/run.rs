// ABOUTME: `timebox run` executes one Python file in a fresh sandbox
// ABOUTME: Prints the captured output and status, or the raw result as JSON

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use timebox_cli::{input, render, CommandOutcome};
use timebox_sandbox::ExecutionRequest;
use tracing::debug;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Python source file to execute
    pub file: PathBuf,

    /// Wall-clock limit in milliseconds (default: TIMEBOX_DEFAULT_TIME_LIMIT_MS)
    #[arg(long)]
    pub time_limit_ms: Option<u64>,

    /// Memory limit in megabytes (default: TIMEBOX_DEFAULT_MEMORY_LIMIT_MB)
    #[arg(long)]
    pub memory_limit_mb: Option<u64>,

    /// File whose contents are fed to the program on stdin
    #[arg(long)]
    pub stdin: Option<PathBuf>,

    /// Request network access (only honoured when TIMEBOX_ALLOW_NETWORK is set)
    #[arg(long)]
    pub network: bool,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn build_request(args: &RunArgs) -> Result<ExecutionRequest> {
    let code = input::load_source(&args.file)?;

    let mut request = ExecutionRequest::new(code, 0).with_network(args.network);
    request.time_limit_ms = args.time_limit_ms;
    request.memory_limit_mb = args.memory_limit_mb;
    if let Some(path) = &args.stdin {
        request = request.with_stdin(input::load_stdin(path)?);
    }
    Ok(request)
}

pub async fn run_command(args: RunArgs) -> Result<CommandOutcome> {
    let request = build_request(&args)?;
    let service = super::connect().await?;

    debug!(file = %args.file.display(), "Running submission");
    let result = service
        .execute(request)
        .await
        .with_context(|| format!("Sandbox refused to run {}", args.file.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render::execution_report(&result));
    }

    Ok(CommandOutcome::for_execution(&result))
}
