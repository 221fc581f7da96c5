//! Broker error types.

use thiserror::Error;

/// Why an `acquire` did not produce a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The caller's cancellation fired before a connection was handed over.
    #[error("acquire cancelled before a connection became available")]
    Cancelled,

    /// The pool was closed before or while the caller was waiting.
    #[error("the daemon connection pool has been closed")]
    PoolClosed,

    /// A new connection was dialed for this caller and `connect` failed.
    #[error("a connection to the daemon could not be established: {0}")]
    Unavailable(String),
}

/// Rejected pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_connections must be at least 1")]
    ZeroMaxConnections,
}

pub type PoolResult<T> = Result<T, PoolError>;
