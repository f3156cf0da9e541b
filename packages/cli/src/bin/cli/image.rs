// ABOUTME: `timebox image check` resolves the configured runtime image
// ABOUTME: Prints the pinned image id so operators can confirm what sandboxes will run

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use timebox_cli::CommandOutcome;
use timebox_sandbox::{DockerEngine, Engine, ImageRegistry};

#[derive(Subcommand)]
pub enum ImageCommands {
    /// Resolve the runtime image and print its pinned id
    Check,
}

impl ImageCommands {
    pub async fn execute(&self) -> Result<CommandOutcome> {
        match self {
            ImageCommands::Check => check_command().await,
        }
    }
}

async fn check_command() -> Result<CommandOutcome> {
    let settings = super::cli_settings()?;
    let engine = DockerEngine::connect().context("Failed to connect to Docker")?;
    engine
        .ping()
        .await
        .context("Docker daemon is not responding")?;

    let handle = ImageRegistry::resolve_runtime_image(&engine, &settings.image).await?;

    println!("{} {}", "Image:".bold(), handle.tag());
    println!("{} {}", "Id:".bold(), handle.id().green());
    println!(
        "{} {}",
        "Resolved:".bold(),
        handle.resolved_at().format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(CommandOutcome::Success)
}
