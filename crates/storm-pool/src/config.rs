//! Pool configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration consumed when a [`Pool`](crate::Pool) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Hard cap on connections that are dialed or checked out at once (default: 5).
    pub max_connections: usize,
    /// Unused connections are closed once they have been idle this long (default: 30s).
    pub idle_ttl: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            idle_ttl: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    pub fn new(max_connections: usize, idle_ttl: Duration) -> Self {
        Self {
            max_connections,
            idle_ttl,
        }
    }

    /// Check the configuration can back a pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroMaxConnections);
        }
        Ok(())
    }
}
