//! Environment lookups shared by the service configs

use std::str::FromStr;

use crate::error::ConfigError;

/// Read a required environment variable; blank values count as missing
pub fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Read an optional environment variable, treating blank as unset
pub fn optional(name: &'static str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read an environment variable or fall back to a default
pub fn or_default(name: &'static str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

/// Read and parse an environment variable, falling back to a default when unset
pub fn parsed_or<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Strip trailing slashes so paths can be appended with `format!("{}/...")`
pub fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
