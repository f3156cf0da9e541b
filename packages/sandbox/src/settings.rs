// ABOUTME: Sandbox administrative settings loaded from the environment
// ABOUTME: Concurrency ceiling, default limits, capture caps and termination windows

use crate::limiter::MIN_MEMORY_MB;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use timebox_config::{constants, env_flag, env_opt, env_or, ConfigError};
use tracing::debug;

pub const DEFAULT_IMAGE: &str = "python-with-time";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSettings {
    // Runtime Image
    pub image: String,

    // Admission Control
    pub max_concurrent: usize,
    pub admission_timeout: Duration,

    // Default Limits
    pub default_time_limit: Duration,
    /// Requests asking for more wall-clock time than this are rejected
    pub max_time_limit: Duration,
    pub default_memory_mb: u64,
    pub default_cpu_cores: f64,
    pub pids_limit: i64,

    // Output Capture
    pub stdout_cap_bytes: usize,
    pub stderr_cap_bytes: usize,

    // Termination
    pub termination_grace: Duration,
    pub kill_settle: Duration,

    /// Whether requests may opt into network access at all
    pub allow_network: bool,

    /// Parent directory for per-instance working directories (system temp dir when unset)
    pub work_root: Option<PathBuf>,

    /// Remove containers left behind by earlier sessions when the service starts.
    /// Disable when several services share one Docker daemon.
    pub sweep_orphans: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            max_concurrent: 4,
            admission_timeout: Duration::from_secs(5),
            default_time_limit: Duration::from_secs(10),
            max_time_limit: Duration::from_secs(60),
            default_memory_mb: 128,
            default_cpu_cores: 0.5,
            pids_limit: 64,
            stdout_cap_bytes: 64 * 1024,
            stderr_cap_bytes: 64 * 1024,
            termination_grace: Duration::from_millis(500),
            kill_settle: Duration::from_secs(2),
            allow_network: false,
            work_root: None,
            sweep_orphans: true,
        }
    }
}

impl SandboxSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = Self {
            image: env_or(constants::TIMEBOX_IMAGE, defaults.image)?,
            max_concurrent: env_or(constants::TIMEBOX_MAX_CONCURRENT, defaults.max_concurrent)?,
            admission_timeout: env_millis(
                constants::TIMEBOX_ADMISSION_TIMEOUT_MS,
                defaults.admission_timeout,
            )?,
            default_time_limit: env_millis(
                constants::TIMEBOX_DEFAULT_TIME_LIMIT_MS,
                defaults.default_time_limit,
            )?,
            max_time_limit: env_millis(
                constants::TIMEBOX_MAX_TIME_LIMIT_MS,
                defaults.max_time_limit,
            )?,
            default_memory_mb: env_or(
                constants::TIMEBOX_DEFAULT_MEMORY_LIMIT_MB,
                defaults.default_memory_mb,
            )?,
            default_cpu_cores: env_or(
                constants::TIMEBOX_DEFAULT_CPU_LIMIT,
                defaults.default_cpu_cores,
            )?,
            pids_limit: env_or(constants::TIMEBOX_PIDS_LIMIT, defaults.pids_limit)?,
            stdout_cap_bytes: env_or(
                constants::TIMEBOX_STDOUT_CAP_BYTES,
                defaults.stdout_cap_bytes,
            )?,
            stderr_cap_bytes: env_or(
                constants::TIMEBOX_STDERR_CAP_BYTES,
                defaults.stderr_cap_bytes,
            )?,
            termination_grace: env_millis(
                constants::TIMEBOX_TERMINATION_GRACE_MS,
                defaults.termination_grace,
            )?,
            kill_settle: env_millis(constants::TIMEBOX_KILL_SETTLE_MS, defaults.kill_settle)?,
            allow_network: env_flag(constants::TIMEBOX_ALLOW_NETWORK, defaults.allow_network)?,
            work_root: env_opt(constants::TIMEBOX_WORK_ROOT)?,
            sweep_orphans: env_flag(constants::TIMEBOX_SWEEP_ORPHANS, defaults.sweep_orphans)?,
        };

        settings.validate()?;
        debug!("Loaded sandbox settings: {:?}", settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: constants::TIMEBOX_IMAGE.to_string(),
                value: self.image.clone(),
                reason: "image tag cannot be empty".to_string(),
            });
        }

        positive(constants::TIMEBOX_MAX_CONCURRENT, self.max_concurrent as u64)?;
        positive(
            constants::TIMEBOX_DEFAULT_TIME_LIMIT_MS,
            self.default_time_limit.as_millis() as u64,
        )?;
        if self.default_memory_mb < MIN_MEMORY_MB {
            return Err(ConfigError::OutOfRange {
                name: constants::TIMEBOX_DEFAULT_MEMORY_LIMIT_MB.to_string(),
                details: format!(
                    "{}MB is below the {}MB minimum",
                    self.default_memory_mb, MIN_MEMORY_MB
                ),
            });
        }
        positive(constants::TIMEBOX_PIDS_LIMIT, self.pids_limit.max(0) as u64)?;
        positive(constants::TIMEBOX_STDOUT_CAP_BYTES, self.stdout_cap_bytes as u64)?;
        positive(constants::TIMEBOX_STDERR_CAP_BYTES, self.stderr_cap_bytes as u64)?;

        if !self.default_cpu_cores.is_finite() || self.default_cpu_cores <= 0.0 {
            return Err(ConfigError::MustBePositive {
                name: constants::TIMEBOX_DEFAULT_CPU_LIMIT.to_string(),
            });
        }

        if self.default_time_limit > self.max_time_limit {
            return Err(ConfigError::OutOfRange {
                name: constants::TIMEBOX_DEFAULT_TIME_LIMIT_MS.to_string(),
                details: format!(
                    "default {}ms exceeds maximum {}ms",
                    self.default_time_limit.as_millis(),
                    self.max_time_limit.as_millis()
                ),
            });
        }

        Ok(())
    }

    /// Upper bound on how long termination may take after a deadline or cancel
    pub fn grace_bound(&self) -> Duration {
        self.termination_grace + self.kill_settle
    }
}

fn env_millis(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_or(name, default.as_millis() as u64).map(Duration::from_millis)
}

fn positive(name: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive {
            name: name.to_string(),
        });
    }
    Ok(())
}
