// ABOUTME: `timebox score` judges a Python file against input/expected-output test cases
// ABOUTME: Cases come from a JSON array; verdicts print as a table or JSON

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use timebox_cli::{input, render, CommandOutcome};
use timebox_sandbox::score_submission;
use tracing::info;

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Python source file to score
    pub file: PathBuf,

    /// JSON file holding an array of test cases
    #[arg(long)]
    pub cases: PathBuf,

    /// Print verdicts as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn score_command(args: ScoreArgs) -> Result<CommandOutcome> {
    let code = input::load_source(&args.file)?;
    let cases = input::load_cases(&args.cases)?;
    let service = super::connect().await?;

    info!(cases = cases.len(), file = %args.file.display(), "Scoring submission");
    let results = score_submission(&service, &code, &cases).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", render::score_table(&results));
        println!("{}", render::score_summary(&results));
    }

    Ok(CommandOutcome::for_scores(&results))
}
