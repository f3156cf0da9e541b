use clap::{Parser, Subcommand};
use colored::*;
use std::process;
use timebox_cli::CommandOutcome;

mod cli;

use cli::cleanup::CleanupArgs;
use cli::image::ImageCommands;
use cli::run::RunArgs;
use cli::score::ScoreArgs;

#[derive(Parser)]
#[command(name = "timebox")]
#[command(about = "Timebox - run untrusted Python in time-bounded Docker sandboxes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Python file in a fresh sandbox
    Run(RunArgs),
    /// Score a Python file against a JSON list of test cases
    Score(ScoreArgs),
    /// Inspect the runtime image
    #[command(subcommand)]
    Image(ImageCommands),
    /// Remove sandbox containers left behind by dead sessions (stop other timebox runs first)
    Cleanup(CleanupArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    timebox_cli::init_tracing();

    let cli = Cli::parse();

    let outcome = match handle_command(cli.command).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            CommandOutcome::for_error(&e)
        }
    };

    process::exit(outcome.exit_code());
}

async fn handle_command(command: Commands) -> anyhow::Result<CommandOutcome> {
    match command {
        Commands::Run(args) => cli::run::run_command(args).await,
        Commands::Score(args) => cli::score::score_command(args).await,
        Commands::Image(cmd) => cmd.execute().await,
        Commands::Cleanup(args) => cli::cleanup::cleanup_command(args).await,
    }
}
