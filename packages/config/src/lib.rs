// ABOUTME: Configuration primitives shared by the Timebox packages
// ABOUTME: Environment variable names plus typed lookup helpers with validation errors

pub mod constants;

use std::env;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },
    #[error("{name} must be greater than zero")]
    MustBePositive { name: String },
    #[error("{name} is out of range: {details}")]
    OutOfRange { name: String, details: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Read an environment variable and parse it, falling back to `default` when unset or blank.
pub fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, raw.trim()),
        _ => {
            debug!("{} not set, using default", name);
            Ok(default)
        }
    }
}

/// Optional variant of [`env_or`]: `None` when the variable is unset or blank.
pub fn env_opt<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, raw.trim()).map(Some),
        _ => Ok(None),
    }
}

/// Boolean lookup accepting `true/false/1/0/yes/no/on/off`.
pub fn env_flag(name: &str, default: bool) -> Result<bool> {
    let raw = match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(default),
    };

    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
