//! Acquisition requests and the cancellation-safe handoff.
//!
//! Each `acquire` creates a single-use reply slot backed by a oneshot
//! channel. The coordinator keeps the sending half ([`Waiter`]); the caller
//! keeps the receiving half ([`ReplySlot`]). Closing the receiver is the
//! abandon transition and a successful send is the fulfil transition; the
//! channel guarantees only one of them wins.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use crate::connection::Connection;
use crate::coordinator::Mailbox;
use crate::error::{PoolError, PoolResult};

/// Create the two halves of a reply slot.
pub(crate) fn reply_slot<C: Connection>(mailbox: Mailbox<C>) -> (Waiter<C>, ReplySlot<C>) {
    let (tx, rx) = oneshot::channel();
    (Waiter { tx }, ReplySlot { rx, mailbox })
}

/// Coordinator side of a pending acquire.
#[derive(Debug)]
pub(crate) struct Waiter<C> {
    tx: oneshot::Sender<PoolResult<C>>,
}

impl<C> Waiter<C> {
    /// Hand `conn` to the caller.
    ///
    /// Gives the connection back if the caller already abandoned the slot.
    pub(crate) fn handoff(self, conn: C) -> Result<(), C> {
        if let Err(Ok(conn)) = self.tx.send(Ok(conn)) {
            return Err(conn);
        }
        Ok(())
    }

    /// Answer the caller with an error instead of a connection.
    pub(crate) fn refuse(self, err: PoolError) {
        let _ = self.tx.send(Err(err));
    }

    pub(crate) fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// FIFO of callers waiting for a connection.
#[derive(Debug)]
pub(crate) struct WaiterQueue<C> {
    waiters: VecDeque<Waiter<C>>,
}

impl<C> WaiterQueue<C> {
    pub(crate) fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    pub(crate) fn push(&mut self, waiter: Waiter<C>) {
        self.waiters.push_back(waiter);
    }

    /// Offer `conn` to waiters from the head.
    ///
    /// Abandoned waiters are discarded along the way. Returns the connection
    /// if nobody took it.
    pub(crate) fn offer(&mut self, mut conn: C) -> Option<C> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.handoff(conn) {
                Ok(()) => return None,
                Err(returned) => conn = returned,
            }
        }
        Some(conn)
    }

    /// Answer every waiter with `err`.
    pub(crate) fn refuse_all(&mut self, err: PoolError) {
        for waiter in self.waiters.drain(..) {
            waiter.refuse(err.clone());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

/// Caller side of a pending acquire.
///
/// Dropping the slot abandons it. A connection that was handed over but never
/// received is routed back to the pool rather than dropped.
pub(crate) struct ReplySlot<C: Connection> {
    rx: oneshot::Receiver<PoolResult<C>>,
    mailbox: Mailbox<C>,
}

impl<C: Connection> ReplySlot<C> {
    /// Wait for the coordinator's answer.
    pub(crate) async fn recv(&mut self) -> PoolResult<C> {
        match (&mut self.rx).await {
            Ok(reply) => reply,
            // The coordinator dropped the waiter without answering: it exited.
            Err(_) => Err(PoolError::PoolClosed),
        }
    }

    /// Abandon the slot.
    ///
    /// If the coordinator answered before the abandon took effect the answer
    /// stands and is returned.
    pub(crate) fn cancel(&mut self) -> PoolResult<C> {
        self.rx.close();
        match self.rx.try_recv() {
            Ok(reply) => reply,
            Err(_) => Err(PoolError::Cancelled),
        }
    }
}

impl<C: Connection> Drop for ReplySlot<C> {
    fn drop(&mut self) {
        self.rx.close();
        if let Ok(Ok(conn)) = self.rx.try_recv() {
            self.mailbox.release(conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tokio::sync::mpsc;

    use super::*;
    use crate::coordinator::Event;

    fn waiter() -> (Waiter<u32>, oneshot::Receiver<PoolResult<u32>>) {
        let (tx, rx) = oneshot::channel();
        (Waiter { tx }, rx)
    }

    #[derive(Debug, PartialEq)]
    struct Conn(u32);

    impl Connection for Conn {
        type Error = io::Error;

        async fn connect(&mut self) -> io::Result<()> {
            Ok(())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn slot_with_mailbox() -> (
        Waiter<Conn>,
        ReplySlot<Conn>,
        mpsc::UnboundedReceiver<Event<Conn>>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (waiter, slot) = reply_slot(Mailbox::from_sender(tx));
        (waiter, slot, rx)
    }

    #[test]
    fn cancel_after_handoff_returns_the_connection() {
        let (waiter, mut slot, mut events) = slot_with_mailbox();
        waiter.handoff(Conn(7)).unwrap();

        assert_eq!(slot.cancel(), Ok(Conn(7)));
        drop(slot);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn dropping_a_fulfilled_slot_releases_the_connection() {
        let (waiter, slot, mut events) = slot_with_mailbox();
        waiter.handoff(Conn(7)).unwrap();

        drop(slot);
        match events.try_recv() {
            Ok(Event::Release(conn)) => assert_eq!(conn, Conn(7)),
            _ => panic!("connection was not sent back to the mailbox"),
        }
    }

    #[test]
    fn handoff_after_cancel_is_refused() {
        let (waiter, mut slot, mut events) = slot_with_mailbox();

        assert_eq!(slot.cancel(), Err(PoolError::Cancelled));
        assert!(waiter.is_abandoned());
        assert_eq!(waiter.handoff(Conn(7)), Err(Conn(7)));
        drop(slot);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn handoff_to_live_waiter_succeeds() {
        let (w, mut rx) = waiter();
        assert!(w.handoff(7).is_ok());
        assert_eq!(rx.try_recv().unwrap(), Ok(7));
    }

    #[test]
    fn handoff_to_abandoned_waiter_returns_connection() {
        let (w, mut rx) = waiter();
        rx.close();
        assert!(w.is_abandoned());
        assert_eq!(w.handoff(7), Err(7));
    }

    #[test]
    fn offer_skips_abandoned_waiters_in_order() {
        let mut queue = WaiterQueue::new();
        let (gone, mut gone_rx) = waiter();
        let (first, mut first_rx) = waiter();
        let (second, mut second_rx) = waiter();
        gone_rx.close();
        queue.push(gone);
        queue.push(first);
        queue.push(second);

        assert_eq!(queue.offer(1), None);
        assert_eq!(first_rx.try_recv().unwrap(), Ok(1));
        assert!(second_rx.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn offer_returns_connection_when_nobody_waits() {
        let mut queue = WaiterQueue::new();
        let (gone, mut gone_rx) = waiter();
        gone_rx.close();
        queue.push(gone);

        assert_eq!(queue.offer(3), Some(3));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn refuse_all_answers_every_waiter() {
        let mut queue = WaiterQueue::new();
        let (a, mut a_rx) = waiter();
        let (b, mut b_rx) = waiter();
        queue.push(a);
        queue.push(b);

        queue.refuse_all(PoolError::PoolClosed);
        assert_eq!(a_rx.try_recv().unwrap(), Err(PoolError::PoolClosed));
        assert_eq!(b_rx.try_recv().unwrap(), Err(PoolError::PoolClosed));
        assert_eq!(queue.len(), 0);
    }
}
