//! Mailboxes
//!
//! A mailbox is one subscriber's bounded inbox. It is split in two halves:
//!
//! - [`Mailbox`]: the consumer half, owned by exactly one subscriber. It can be
//!   drained with [`Mailbox::recv`] or consumed as a `futures::Stream`.
//! - [`MailboxSender`]: the delivery half, held by the registry (and by any
//!   in-flight publish snapshot) behind the [`MailboxSink`] capability.
//!
//! The delivery half keeps its channel sender behind a mutex so that closing
//! and delivering are mutually exclusive: once `close` has returned, no later
//! `try_deliver` can enqueue, even one issued from a stale snapshot.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

pub use tokio::sync::mpsc::error::TryRecvError;

/// Identity of a mailbox, used to unsubscribe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MailboxId(Uuid);

impl MailboxId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MailboxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailbox-{}", self.0)
    }
}

/// Outcome of a single non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The message was enqueued.
    Delivered,
    /// The mailbox was at capacity; the incoming message was discarded.
    Full,
    /// The mailbox was closed, or its consumer went away.
    Closed,
}

/// Delivery-side capability of a mailbox.
///
/// Any bounded FIFO with a non-blocking enqueue and an idempotent close can
/// back a subscription. Implementations must tolerate `try_deliver` after
/// `close` and report it as [`Delivery::Closed`].
pub trait MailboxSink<T>: Send + Sync {
    fn id(&self) -> MailboxId;

    /// Attempt to enqueue without blocking.
    fn try_deliver(&self, message: T) -> Delivery;

    /// Close the mailbox. Returns `true` only for the call that closed it.
    fn close(&self) -> bool;

    fn is_closed(&self) -> bool;
}

/// Channel-backed delivery half of a mailbox.
pub struct MailboxSender<T> {
    id: MailboxId,
    sender: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T> fmt::Debug for MailboxSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxSender")
            .field("id", &self.id)
            .field("closed", &self.sender.lock().is_none())
            .finish()
    }
}

impl<T: Send> MailboxSink<T> for MailboxSender<T> {
    fn id(&self) -> MailboxId {
        self.id
    }

    fn try_deliver(&self, message: T) -> Delivery {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Delivery::Closed;
        };

        match sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn close(&self) -> bool {
        // Dropping the only sender lets the consumer drain and then see end-of-stream.
        self.sender.lock().take().is_some()
    }

    fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Consumer half of a subscription.
///
/// Yields messages in the order they were enqueued and returns `None` once the
/// mailbox has been closed (by unsubscribe or shutdown) and drained.
#[derive(Debug)]
pub struct Mailbox<T> {
    id: MailboxId,
    topic: Arc<str>,
    capacity: usize,
    receiver: mpsc::Receiver<T>,
}

impl<T> Mailbox<T> {
    pub fn id(&self) -> MailboxId {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of messages currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// True once the mailbox has been closed; queued messages may still remain.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Wait for the next message. `None` means end-of-stream.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next message without waiting.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }
}

impl<T> Stream for Mailbox<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

/// Create a connected mailbox pair for `topic` holding at most `capacity` messages.
///
/// `capacity` must be non-zero; the engine validates this at construction.
pub(crate) fn channel<T>(topic: Arc<str>, capacity: usize) -> (Arc<MailboxSender<T>>, Mailbox<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let id = MailboxId::new();

    let sender = Arc::new(MailboxSender {
        id,
        sender: Mutex::new(Some(tx)),
    });
    let mailbox = Mailbox {
        id,
        topic,
        capacity,
        receiver: rx,
    };

    (sender, mailbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn pair(capacity: usize) -> (Arc<MailboxSender<u32>>, Mailbox<u32>) {
        channel(Arc::from("t"), capacity)
    }

    #[test]
    fn test_halves_share_identity() {
        let (sender, mailbox) = pair(4);
        assert_eq!(sender.id(), mailbox.id());
        assert_eq!(mailbox.topic(), "t");
        assert_eq!(mailbox.capacity(), 4);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_drop_newest_when_full() {
        let (sender, mut mailbox) = pair(2);

        assert_eq!(sender.try_deliver(1), Delivery::Delivered);
        assert_eq!(sender.try_deliver(2), Delivery::Delivered);
        assert_eq!(sender.try_deliver(3), Delivery::Full);
        assert_eq!(mailbox.len(), 2);

        // queued messages survive in order, the rejected one is gone
        assert_eq!(mailbox.try_recv().unwrap(), 1);
        assert_eq!(mailbox.try_recv().unwrap(), 2);
        assert_eq!(mailbox.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_close_is_reported_once() {
        let (sender, _mailbox) = pair(2);
        assert!(!sender.is_closed());
        assert!(sender.close());
        assert!(!sender.close());
        assert!(sender.is_closed());
    }

    #[test]
    fn test_deliver_after_close_is_a_drop() {
        let (sender, mut mailbox) = pair(2);
        sender.close();

        assert_eq!(sender.try_deliver(7), Delivery::Closed);
        assert_eq!(mailbox.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_deliver_to_dropped_consumer() {
        let (sender, mailbox) = pair(2);
        drop(mailbox);
        assert_eq!(sender.try_deliver(1), Delivery::Closed);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends_stream() {
        let (sender, mut mailbox) = pair(4);
        sender.try_deliver(10);
        sender.try_deliver(11);
        sender.close();

        assert!(mailbox.is_closed());
        assert_eq!(mailbox.recv().await, Some(10));
        assert_eq!(mailbox.recv().await, Some(11));
        assert_eq!(mailbox.recv().await, None);
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let (sender, mut mailbox) = pair(4);

        let consumer = tokio::spawn(async move { mailbox.recv().await });
        tokio::task::yield_now().await;
        sender.close();

        let received = tokio::time::timeout(std::time::Duration::from_secs(1), consumer)
            .await
            .expect("consumer stayed suspended after close")
            .unwrap();
        assert_eq!(received, None);
    }

    #[tokio::test]
    async fn test_mailbox_as_stream() {
        let (sender, mailbox) = pair(8);
        for i in 0..5 {
            sender.try_deliver(i);
        }
        sender.close();

        let collected: Vec<u32> = mailbox.collect().await;
        assert_eq!(collected, vec![0, 1, 2, 3, 4]);
    }
}
