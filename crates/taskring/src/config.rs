//! Worker pool configuration
//!
//! Compile-time defaults with runtime environment overrides, builder
//! methods for programmatic use.
//!
//! # Example
//!
//! ```ignore
//! use taskring::config::PoolConfig;
//!
//! // Defaults with env overrides
//! let config = PoolConfig::from_env();
//!
//! // Or customize programmatically
//! let config = PoolConfig::from_env().num_workers(8);
//! ```

use taskring_core::backoff::WaitStrategy;
use taskring_core::env::env_get;

/// Default number of worker threads
const NUM_WORKERS: usize = 4;

/// Worker pool configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Idle policy between empty polls
    pub wait: WaitStrategy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl PoolConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `TASKRING_NUM_WORKERS` - Number of worker threads
    /// - `TASKRING_WAIT` - Idle policy: `spin` or `yield`
    pub fn from_env() -> Self {
        Self {
            num_workers: env_get("TASKRING_NUM_WORKERS", NUM_WORKERS),
            wait: WaitStrategy::from_env(),
        }
    }

    /// Set the number of worker threads (minimum 1).
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Set the idle policy between empty polls.
    pub fn wait(mut self, wait: WaitStrategy) -> Self {
        self.wait = wait;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = PoolConfig::from_env().num_workers(2).wait(WaitStrategy::Spin);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.wait, WaitStrategy::Spin);
    }

    #[test]
    fn test_num_workers_floor() {
        let config = PoolConfig::from_env().num_workers(0);
        assert_eq!(config.num_workers, 1);
    }
}
