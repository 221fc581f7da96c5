//! Backend connection and provider traits.
//!
//! The broker knows nothing about the backend protocol. A connection is any
//! stateful session that can be established and torn down; the provider is
//! the factory that hands the broker fresh, not-yet-connected handles.

use std::future::Future;

/// A stateful session to the backend daemon.
///
/// Handles are created unconnected by a [`Provider`], connected once by the
/// broker before first use, and closed either when they sit idle past the
/// pool's TTL or when the pool shuts down.
pub trait Connection: Send + 'static {
    /// Error returned by `connect` and `close`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Establish the session. Called exactly once per handle, from the
    /// broker's coordinator task.
    fn connect(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Tear the session down.
    fn close(&mut self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Factory for new backend handles.
///
/// Any `FnMut() -> C` closure is a provider, which is how application
/// settings (host, credentials, protocol version) are captured.
pub trait Provider<C>: Send + 'static {
    /// Produce a new, unconnected handle.
    fn create(&mut self) -> C;
}

impl<C, F> Provider<C> for F
where
    F: FnMut() -> C + Send + 'static,
{
    fn create(&mut self) -> C {
        self()
    }
}
