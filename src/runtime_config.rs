//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the coroutine runtime that
//! backs the I/O dispatcher's worker pool.
//!
//! ## Environment Variables
//!
//! ### `RESTLING_STACK_SIZE`
//!
//! Stack size for worker coroutines, in decimal (`65536`) or hexadecimal
//! (`0x10000`). Default: `0x10000` (64 KB). Sessions run whole
//! receive/handle/send iterations on one coroutine, so the stack must hold
//! the deepest handler call chain; many concurrent sessions multiply
//! whatever is configured here.
//!
//! ### `RESTLING_WORKERS`
//!
//! Number of runtime worker threads. Default: available parallelism × 4 —
//! session coroutines block on socket timeouts and file I/O, so the pool is
//! oversubscribed relative to the core count.

use std::env;

use crate::config::parse_usize;

/// Runtime configuration loaded from environment variables.
///
/// Load this at startup with [`RuntimeConfig::from_env()`] and hand it to
/// the I/O dispatcher before any coroutine is spawned.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for worker coroutines in bytes (default 64 KB).
    pub stack_size: usize,
    /// Worker threads backing the coroutine runtime.
    pub worker_threads: usize,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let stack_size = env::var("RESTLING_STACK_SIZE")
            .ok()
            .and_then(|v| parse_usize(&v))
            .unwrap_or(defaults.stack_size);
        let worker_threads = env::var("RESTLING_WORKERS")
            .ok()
            .and_then(|v| parse_usize(&v))
            .filter(|&n| n > 0)
            .unwrap_or(defaults.worker_threads);

        RuntimeConfig {
            stack_size,
            worker_threads,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        RuntimeConfig {
            stack_size: 0x10000,
            worker_threads: parallelism * 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_is_oversubscribed() {
        let config = RuntimeConfig::default();
        assert_eq!(config.stack_size, 0x10000);
        assert!(config.worker_threads >= 4);
        assert_eq!(config.worker_threads % 4, 0);
    }
}
