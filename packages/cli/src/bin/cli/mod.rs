pub mod cleanup;
pub mod image;
pub mod run;
pub mod score;

use anyhow::{Context, Result};
use timebox_sandbox::{SandboxService, SandboxSettings};

/// Environment settings with the startup orphan sweep turned off.
///
/// Several CLI invocations may share one daemon, and each one is its own
/// session. Sweeping is left to `timebox cleanup`.
pub fn cli_settings() -> Result<SandboxSettings> {
    let mut settings =
        SandboxSettings::from_env().context("Invalid sandbox configuration in environment")?;
    settings.sweep_orphans = false;
    Ok(settings)
}

pub async fn connect() -> Result<SandboxService> {
    let settings = cli_settings()?;
    SandboxService::connect(settings)
        .await
        .context("Failed to start the sandbox service")
}
