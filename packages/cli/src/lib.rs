// ABOUTME: Shared pieces of the timebox operator CLI
// ABOUTME: Input loading, terminal rendering, and exit status mapping used by the binary

pub mod input;
pub mod outcome;
pub mod render;

pub use input::{load_cases, load_source, InputError};
pub use outcome::CommandOutcome;

use timebox_config::constants;

/// Install the tracing subscriber. `RUST_LOG` wins, `info` otherwise.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(constants::RUST_LOG)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[cfg(test)]
mod tests;
