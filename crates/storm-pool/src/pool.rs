//! Public pool handle.

use std::future::{Future, pending};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::config::PoolConfig;
use crate::connection::{Connection, Provider};
use crate::coordinator::{self, Event, Mailbox};
use crate::error::{ConfigError, PoolError, PoolResult};
use crate::waiter::reply_slot;

/// Snapshot of the broker's counters, taken between two coordinator events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured capacity.
    pub max_connections: usize,
    /// Connections dialed and not idle: checked out, or released but not yet processed.
    pub in_flight: usize,
    /// Connections parked in the idle set.
    pub idle: usize,
    /// Callers queued for a connection.
    pub waiters: usize,
}

/// Handle to a bounded pool of daemon connections.
///
/// Cloning is cheap; every clone talks to the same coordinator task. The
/// coordinator also exits once every handle and pending request is gone.
///
/// Connections obtained with [`acquire`](Self::acquire) must be given back
/// with [`release`](Self::release). A connection that is never released
/// keeps its capacity slot for the lifetime of the pool.
pub struct Pool<C> {
    mailbox: Mailbox<C>,
    done: watch::Receiver<bool>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            done: self.done.clone(),
        }
    }
}

impl<C: Connection> Pool<C> {
    /// Start a pool. Must be called inside a tokio runtime.
    pub fn new<P>(config: PoolConfig, provider: P) -> Result<Self, ConfigError>
    where
        P: Provider<C>,
    {
        config.validate()?;
        let (mailbox, done) = coordinator::spawn(config, provider);
        Ok(Self { mailbox, done })
    }

    /// Get a connected connection, waiting as long as it takes.
    pub async fn acquire(&self) -> PoolResult<C> {
        self.acquire_until(pending()).await
    }

    /// Get a connection, giving up with [`PoolError::Cancelled`] after `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> PoolResult<C> {
        self.acquire_until(tokio::time::sleep(timeout)).await
    }

    /// Get a connection, giving up with [`PoolError::Cancelled`] once
    /// `cancelled` resolves.
    ///
    /// An idle connection is handed over straight away. Otherwise a new one
    /// is dialed if the pool is under capacity, or the caller queues behind
    /// earlier callers. Dropping the returned future is also a cancellation;
    /// a connection already handed to it goes back to the pool.
    pub async fn acquire_until<F>(&self, cancelled: F) -> PoolResult<C>
    where
        F: Future<Output = ()>,
    {
        let (waiter, mut slot) = reply_slot(self.mailbox.clone());
        if self.mailbox.send(Event::Acquire(waiter)).is_err() {
            return Err(PoolError::PoolClosed);
        }

        tokio::select! {
            biased;

            reply = slot.recv() => reply,
            () = cancelled => slot.cancel(),
        }
    }

    /// Give a connection back. Never blocks.
    ///
    /// The head waiter gets it first; otherwise it becomes idle. A
    /// connection returned after the pool closed is closed instead.
    pub fn release(&self, conn: C) {
        self.mailbox.release(conn);
    }

    /// Current counters, or [`PoolError::PoolClosed`] once the pool has shut down.
    pub async fn stats(&self) -> PoolResult<PoolStats> {
        let (tx, rx) = oneshot::channel();
        if self.mailbox.send(Event::Stats(tx)).is_err() {
            return Err(PoolError::PoolClosed);
        }
        rx.await.map_err(|_| PoolError::PoolClosed)
    }

    /// Shut the pool down and wait for the coordinator to exit.
    ///
    /// Queued callers fail with [`PoolError::PoolClosed`] and idle
    /// connections are closed. Checked-out connections are not waited for;
    /// they are closed when released. Calling this more than once is fine.
    pub async fn close(&self) {
        let _ = self.mailbox.send(Event::Shutdown);
        let mut done = self.done.clone();
        let _ = done.wait_for(|closed| *closed).await;
    }

    /// Whether the coordinator has exited.
    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }
}
