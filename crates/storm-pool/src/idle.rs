//! Idle set and expiry timer.
//!
//! Every idle connection shares the same TTL, so appending at the tail keeps
//! the set ordered by deadline and the head is always the next to expire.
//! The coordinator keeps a single [`ExpiryTimer`] aimed at that head.

use std::collections::VecDeque;
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep_until};

/// A connected handle waiting to be reused.
#[derive(Debug)]
struct IdleEntry<C> {
    conn: C,
    idle_since: Instant,
}

/// FIFO of idle connections ordered by expiry.
#[derive(Debug)]
pub(crate) struct IdleSet<C> {
    ttl: Duration,
    entries: VecDeque<IdleEntry<C>>,
}

impl<C> IdleSet<C> {
    pub(crate) fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Park a connection at the tail.
    pub(crate) fn push(&mut self, conn: C, now: Instant) {
        self.entries.push_back(IdleEntry {
            conn,
            idle_since: now,
        });
    }

    /// Take the longest-idle connection.
    pub(crate) fn pop(&mut self) -> Option<C> {
        self.entries.pop_front().map(|entry| entry.conn)
    }

    /// Take the head if it has expired at `now`.
    pub(crate) fn pop_expired(&mut self, now: Instant) -> Option<C> {
        match self.entries.front() {
            Some(entry) if entry.idle_since + self.ttl <= now => self.pop(),
            _ => None,
        }
    }

    /// Deadline of the head entry.
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.entries
            .front()
            .map(|entry| entry.idle_since + self.ttl)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The one outstanding wake-up for idle expiry.
///
/// Re-arming resets the same sleep rather than stacking timers.
pub(crate) struct ExpiryTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl ExpiryTimer {
    /// A disarmed timer. Must be called inside a tokio runtime.
    pub(crate) fn new() -> Self {
        Self {
            sleep: Box::pin(sleep_until(Instant::now())),
            armed: false,
        }
    }

    pub(crate) fn arm(&mut self, deadline: Instant) {
        self.sleep.as_mut().reset(deadline);
        self.armed = true;
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }

    /// Resolves when the armed deadline passes; never resolves while disarmed.
    pub(crate) async fn fired(&mut self) {
        if !self.armed {
            return pending().await;
        }
        self.sleep.as_mut().await;
        self.armed = false;
    }
}
