//! The coordinator task, sole owner of pool state.
//!
//! All state transitions happen here, one event at a time: callers talk to
//! the coordinator through its mailbox and never touch the idle set or the
//! waiter queue directly.
//!
//! ```text
//! Acquire ─► idle head? ─yes─► handoff ─fail─► Release path
//!               │no
//!               ▼
//!          under cap? ─yes─► dial ─err─► Unavailable
//!               │no            │ok
//!               ▼              ▼
//!          enqueue waiter   handoff ─fail─► Release path
//!
//! Release ─► waiters (FIFO, skip abandoned) ─none─► idle tail, in_flight -= 1
//! ```

use tokio::runtime::Handle;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::PoolConfig;
use crate::connection::{Connection, Provider};
use crate::error::PoolError;
use crate::idle::{ExpiryTimer, IdleSet};
use crate::pool::PoolStats;
use crate::waiter::{Waiter, WaiterQueue};

/// Messages processed by the coordinator.
pub(crate) enum Event<C> {
    Acquire(Waiter<C>),
    Release(C),
    Stats(oneshot::Sender<PoolStats>),
    Shutdown,
}

/// Sending side of the coordinator's mailbox.
pub(crate) struct Mailbox<C> {
    tx: mpsc::UnboundedSender<Event<C>>,
}

impl<C> Clone for Mailbox<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C: Connection> Mailbox<C> {
    /// Queue an event. Gives it back if the coordinator has exited.
    pub(crate) fn send(&self, event: Event<C>) -> Result<(), Event<C>> {
        self.tx.send(event).map_err(|SendError(event)| event)
    }

    /// Return a connection to the pool, closing it if the pool is gone.
    pub(crate) fn release(&self, conn: C) {
        if let Err(Event::Release(conn)) = self.send(Event::Release(conn)) {
            close_detached(conn);
        }
    }
}

#[cfg(test)]
impl<C> Mailbox<C> {
    /// A mailbox read by the test instead of a coordinator.
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<Event<C>>) -> Self {
        Self { tx }
    }
}

/// Spawn the coordinator and return its mailbox and completion signal.
pub(crate) fn spawn<C, P>(config: PoolConfig, provider: P) -> (Mailbox<C>, watch::Receiver<bool>)
where
    C: Connection,
    P: Provider<C>,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let (done_tx, done_rx) = watch::channel(false);

    tokio::spawn(async move {
        let coordinator = Coordinator::new(config, provider);
        coordinator.run(rx, done_tx).await;
    });

    (Mailbox { tx }, done_rx)
}

pub(crate) struct Coordinator<C, P> {
    config: PoolConfig,
    provider: P,
    /// Connections dialed and not currently idle.
    in_flight: usize,
    idle: IdleSet<C>,
    waiters: WaiterQueue<C>,
    expiry: ExpiryTimer,
}

impl<C, P> Coordinator<C, P>
where
    C: Connection,
    P: Provider<C>,
{
    fn new(config: PoolConfig, provider: P) -> Self {
        Self {
            idle: IdleSet::new(config.idle_ttl, config.max_connections),
            waiters: WaiterQueue::new(),
            expiry: ExpiryTimer::new(),
            in_flight: 0,
            provider,
            config,
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event<C>>,
        done: watch::Sender<bool>,
    ) {
        debug!(
            max_connections = self.config.max_connections,
            idle_ttl = ?self.config.idle_ttl,
            "connection pool coordinator started"
        );

        loop {
            tokio::select! {
                biased;

                () = self.expiry.fired() => self.evict_expired(Instant::now()).await,
                event = events.recv() => match event {
                    Some(Event::Acquire(waiter)) => self.acquire(waiter).await,
                    Some(Event::Release(conn)) => self.release(conn),
                    Some(Event::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    // Every handle is gone when the mailbox reports `None`.
                    Some(Event::Shutdown) | None => break,
                },
            }
        }

        self.shutdown(&mut events).await;
        let _ = done.send(true);
    }

    async fn acquire(&mut self, waiter: Waiter<C>) {
        if waiter.is_abandoned() {
            return;
        }

        // The timer may be due but not yet observed; never hand out an expired connection.
        self.evict_expired(Instant::now()).await;

        if let Some(conn) = self.idle.pop() {
            self.in_flight += 1;
            self.rearm();
            if let Err(conn) = waiter.handoff(conn) {
                debug!("acquirer left before idle handoff");
                self.release(conn);
            }
            return;
        }

        if self.in_flight < self.config.max_connections {
            let mut conn = self.provider.create();
            if let Err(e) = conn.connect().await {
                error!(error = %e, "failed to establish daemon RPC connection");
                waiter.refuse(PoolError::Unavailable(e.to_string()));
                return;
            }

            self.in_flight += 1;
            debug!(in_flight = self.in_flight, "dialed new daemon connection");
            if let Err(conn) = waiter.handoff(conn) {
                debug!("acquirer left while dialing");
                self.release(conn);
            }
            return;
        }

        self.waiters.push(waiter);
        debug!(waiters = self.waiters.len(), "pool at capacity, request queued");
    }

    fn release(&mut self, conn: C) {
        debug_assert!(self.in_flight > 0, "release without a matching acquire");
        let Some(conn) = self.waiters.offer(conn) else {
            return;
        };

        self.idle.push(conn, Instant::now());
        self.in_flight = self.in_flight.saturating_sub(1);
        if !self.expiry.is_armed() {
            self.rearm();
        }
    }

    /// Close every idle connection that is due at `now`, then aim the timer at the new head.
    async fn evict_expired(&mut self, now: Instant) {
        while let Some(conn) = self.idle.pop_expired(now) {
            debug!("closing idle connection");
            close_quietly(conn).await;
        }
        self.rearm();
    }

    fn rearm(&mut self) {
        match self.idle.next_expiry() {
            Some(deadline) => self.expiry.arm(deadline),
            None => self.expiry.disarm(),
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            max_connections: self.config.max_connections,
            in_flight: self.in_flight,
            idle: self.idle.len(),
            waiters: self.waiters.len(),
        }
    }

    async fn shutdown(&mut self, events: &mut mpsc::UnboundedReceiver<Event<C>>) {
        events.close();
        self.expiry.disarm();
        self.waiters.refuse_all(PoolError::PoolClosed);

        while let Some(conn) = self.idle.pop() {
            close_quietly(conn).await;
        }

        // Whatever was queued before the mailbox closed.
        while let Ok(event) = events.try_recv() {
            match event {
                Event::Acquire(waiter) => waiter.refuse(PoolError::PoolClosed),
                Event::Release(conn) => {
                    debug_assert!(self.in_flight > 0, "release without a matching acquire");
                    self.in_flight = self.in_flight.saturating_sub(1);
                    close_quietly(conn).await;
                }
                Event::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                Event::Shutdown => {}
            }
        }

        info!(in_flight = self.in_flight, "connection pool closed");
    }
}

async fn close_quietly<C: Connection>(mut conn: C) {
    if let Err(e) = conn.close().await {
        warn!(error = %e, "failed to close daemon connection");
    }
}

/// Close a connection that can no longer reach the coordinator.
fn close_detached<C: Connection>(conn: C) {
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(close_quietly(conn));
        }
        Err(_) => warn!("connection returned to a closed pool outside a runtime, dropping it"),
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use super::*;

    struct Conn;

    impl Connection for Conn {
        type Error = io::Error;

        async fn connect(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn coordinator() -> Coordinator<Conn, fn() -> Conn> {
        let provider: fn() -> Conn = || Conn;
        Coordinator::new(PoolConfig::new(1, Duration::from_secs(30)), provider)
    }

    #[tokio::test]
    async fn release_parks_connection_idle() {
        let mut coordinator = coordinator();
        coordinator.in_flight = 1;

        coordinator.release(Conn);
        let stats = coordinator.stats();
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.idle, 1);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "release without a matching acquire")]
    async fn double_release_panics_in_debug_builds() {
        let mut coordinator = coordinator();
        coordinator.in_flight = 1;

        coordinator.release(Conn);
        coordinator.release(Conn);
    }

    #[cfg(debug_assertions)]
    #[tokio::test]
    #[should_panic(expected = "release without a matching acquire")]
    async fn unmatched_release_during_shutdown_panics_in_debug_builds() {
        let mut coordinator = coordinator();
        let (tx, mut events) = mpsc::unbounded_channel();
        let _ = tx.send(Event::Release(Conn));

        coordinator.shutdown(&mut events).await;
    }
}
