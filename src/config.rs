//! Protocol bounds and timeouts.
//!
//! `ServerConfig` carries every configurable limit the wire level enforces.
//! Defaults match the framework's documented bounds; each field can be
//! overridden through a `RESTLING_*` environment variable, following the
//! same decimal-or-`0x`-hex convention as [`crate::runtime_config`].

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Limits and timeouts applied to every connection and message.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Cap on transient-error retries per I/O call (default 5).
    pub max_retry_count: usize,
    /// Cap on received body bytes (default 16 MiB).
    pub max_body_size: usize,
    /// Cap on the accumulated header section (default 16 KiB).
    pub max_header_size: usize,
    /// Cap on a single header name (default 256).
    pub max_header_name_len: usize,
    /// Cap on a single header value, folding included (default 8 KiB).
    pub max_header_value_len: usize,
    /// How long a keep-alive session waits between requests (default 15 s).
    pub idle_timeout: Duration,
    /// Per-socket receive timeout applied to accepted connections (default 30 s).
    pub receive_timeout: Duration,
    /// Content-Length above which a recognized body spills to disk (default 1 MiB).
    pub spill_threshold: usize,
    /// Directory for scratch body files (default `Receives`).
    pub scratch_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_retry_count: 5,
            max_body_size: 16 * 1024 * 1024,
            max_header_size: 16 * 1024,
            max_header_name_len: 256,
            max_header_value_len: 8 * 1024,
            idle_timeout: Duration::from_secs(15),
            receive_timeout: Duration::from_secs(30),
            spill_threshold: 1024 * 1024,
            scratch_dir: PathBuf::from("Receives"),
        }
    }
}

impl ServerConfig {
    /// Load the default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retry_count: env_usize("RESTLING_MAX_RETRY_COUNT", defaults.max_retry_count),
            max_body_size: env_usize("RESTLING_MAX_BODY_SIZE", defaults.max_body_size),
            max_header_size: env_usize("RESTLING_MAX_HEADER_SIZE", defaults.max_header_size),
            max_header_name_len: env_usize(
                "RESTLING_MAX_HEADER_NAME_LENGTH",
                defaults.max_header_name_len,
            ),
            max_header_value_len: env_usize(
                "RESTLING_MAX_HEADER_VALUE_LENGTH",
                defaults.max_header_value_len,
            ),
            idle_timeout: env_secs("RESTLING_IDLE_TIMEOUT_SECS", defaults.idle_timeout),
            receive_timeout: env_secs("RESTLING_RECEIVE_TIMEOUT_SECS", defaults.receive_timeout),
            spill_threshold: env_usize("RESTLING_SPILL_THRESHOLD", defaults.spill_threshold),
            scratch_dir: env::var("RESTLING_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
        }
    }
}

pub(crate) fn parse_usize(value: &str) -> Option<usize> {
    if let Some(hex) = value.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| parse_usize(&v))
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_bounds() {
        let config = ServerConfig::default();
        assert_eq!(config.max_retry_count, 5);
        assert_eq!(config.max_body_size, 16 * 1024 * 1024);
        assert_eq!(config.max_header_size, 16 * 1024);
        assert_eq!(config.max_header_name_len, 256);
        assert_eq!(config.max_header_value_len, 8 * 1024);
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.receive_timeout, Duration::from_secs(30));
        assert_eq!(config.spill_threshold, 1024 * 1024);
        assert_eq!(config.scratch_dir, PathBuf::from("Receives"));
    }

    #[test]
    fn numeric_values_accept_hex() {
        assert_eq!(parse_usize("4096"), Some(4096));
        assert_eq!(parse_usize("0x1000"), Some(4096));
        assert_eq!(parse_usize("nope"), None);
    }
}
