// ABOUTME: `timebox cleanup` removes sandbox containers whose session is gone
// ABOUTME: Supports a dry run that only lists what would be removed

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use std::sync::Arc;
use timebox_cli::CommandOutcome;
use timebox_sandbox::{DockerEngine, Engine, SandboxManager};

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// List orphaned containers without removing them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn cleanup_command(args: CleanupArgs) -> Result<CommandOutcome> {
    let settings = super::cli_settings()?;
    let engine = DockerEngine::connect().context("Failed to connect to Docker")?;
    engine
        .ping()
        .await
        .context("Docker daemon is not responding")?;

    // A fresh manager owns a new session, so every labelled container counts as orphaned.
    let manager = SandboxManager::new(Arc::new(engine), &settings);
    let (orphaned, removed, errors) = manager
        .cleanup_orphaned_containers(args.dry_run)
        .await
        .context("Failed to sweep orphaned containers")?;

    if args.dry_run {
        println!("{} orphaned sandbox container(s) found", orphaned);
    } else {
        println!(
            "{} Removed {}/{} orphaned sandbox container(s)",
            "✓".green(),
            removed,
            orphaned
        );
    }

    for error in &errors {
        eprintln!("{} {}", "✗".red(), error);
    }

    if errors.is_empty() {
        Ok(CommandOutcome::Success)
    } else {
        Ok(CommandOutcome::Infrastructure)
    }
}
