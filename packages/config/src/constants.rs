// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used across Timebox

// Runtime Image
pub const TIMEBOX_IMAGE: &str = "TIMEBOX_IMAGE";
pub const DOCKER_HOST: &str = "DOCKER_HOST";

// Admission Control
pub const TIMEBOX_MAX_CONCURRENT: &str = "TIMEBOX_MAX_CONCURRENT";
pub const TIMEBOX_ADMISSION_TIMEOUT_MS: &str = "TIMEBOX_ADMISSION_TIMEOUT_MS";

// Default Limits
pub const TIMEBOX_DEFAULT_TIME_LIMIT_MS: &str = "TIMEBOX_DEFAULT_TIME_LIMIT_MS";
pub const TIMEBOX_DEFAULT_MEMORY_LIMIT_MB: &str = "TIMEBOX_DEFAULT_MEMORY_LIMIT_MB";
pub const TIMEBOX_DEFAULT_CPU_LIMIT: &str = "TIMEBOX_DEFAULT_CPU_LIMIT";
pub const TIMEBOX_MAX_TIME_LIMIT_MS: &str = "TIMEBOX_MAX_TIME_LIMIT_MS";
pub const TIMEBOX_PIDS_LIMIT: &str = "TIMEBOX_PIDS_LIMIT";

// Output Capture
pub const TIMEBOX_STDOUT_CAP_BYTES: &str = "TIMEBOX_STDOUT_CAP_BYTES";
pub const TIMEBOX_STDERR_CAP_BYTES: &str = "TIMEBOX_STDERR_CAP_BYTES";

// Termination
pub const TIMEBOX_TERMINATION_GRACE_MS: &str = "TIMEBOX_TERMINATION_GRACE_MS";
pub const TIMEBOX_KILL_SETTLE_MS: &str = "TIMEBOX_KILL_SETTLE_MS";

// Network
pub const TIMEBOX_ALLOW_NETWORK: &str = "TIMEBOX_ALLOW_NETWORK";

// Working Directories
pub const TIMEBOX_WORK_ROOT: &str = "TIMEBOX_WORK_ROOT";

// Startup
pub const TIMEBOX_SWEEP_ORPHANS: &str = "TIMEBOX_SWEEP_ORPHANS";

// Logging
pub const RUST_LOG: &str = "RUST_LOG";
