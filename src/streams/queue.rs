//! # Per-connection delivery queues.
//!
//! Each emitter→receiver connection owns exactly one queue, shaped by its
//! [`DeliveryPolicy`]:
//!
//! ```text
//! Unlimited        tokio::sync::mpsc unbounded channel
//! Throttle { n }   tokio::sync::mpsc bounded channel of n (send() blocks the producer)
//! LatestMessage    LatestSlot: one mutex-guarded slot + Notify
//! ```
//!
//! Queues carry [`DeliveryItem`]s: regular messages plus a final `Closed`
//! marker that tells the delivery loop the stream has ended and at what
//! originating time.
//!
//! ## Rules
//! - A queue has exactly one producer (the emitter) and one consumer (the
//!   connection's delivery loop); FIFO order is therefore per-receiver order.
//! - `LatestSlot` hands the replaced message back to the caller so the drop
//!   can be reported; it never discards silently.

use std::sync::Mutex;

use tokio::sync::{Notify, mpsc};

use crate::clock::Timestamp;
use crate::policies::{DeliveryMode, DeliveryPolicy};
use crate::streams::envelope::Message;

/// One unit on a delivery queue.
#[derive(Debug)]
pub(crate) enum DeliveryItem<T> {
    /// A posted message awaiting delivery.
    Message(Message<T>),
    /// End of stream; carries the final originating time.
    Closed(Timestamp),
}

/// Sending half of a connection queue.
pub(crate) enum QueueTx<T> {
    Unbounded(mpsc::UnboundedSender<DeliveryItem<T>>),
    Bounded(mpsc::Sender<DeliveryItem<T>>),
    Latest(std::sync::Arc<LatestSlot<T>>),
}

/// Receiving half of a connection queue.
pub(crate) enum QueueRx<T> {
    Unbounded(mpsc::UnboundedReceiver<DeliveryItem<T>>),
    Bounded(mpsc::Receiver<DeliveryItem<T>>),
    Latest(std::sync::Arc<LatestSlot<T>>),
}

impl<T> QueueRx<T> {
    /// Receives the next item, or `None` once the queue is closed and empty.
    pub(crate) async fn recv(&mut self) -> Option<DeliveryItem<T>> {
        match self {
            QueueRx::Unbounded(rx) => rx.recv().await,
            QueueRx::Bounded(rx) => rx.recv().await,
            QueueRx::Latest(slot) => slot.recv().await,
        }
    }
}

/// Builds the queue pair dictated by `policy`.
pub(crate) fn build_queue<T>(policy: &DeliveryPolicy) -> (QueueTx<T>, QueueRx<T>) {
    match policy.mode {
        DeliveryMode::Unlimited => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueTx::Unbounded(tx), QueueRx::Unbounded(rx))
        }
        DeliveryMode::Throttle { max_queue_size } => {
            let (tx, rx) = mpsc::channel(max_queue_size.max(1));
            (QueueTx::Bounded(tx), QueueRx::Bounded(rx))
        }
        DeliveryMode::LatestMessage => {
            let slot = std::sync::Arc::new(LatestSlot::new());
            (QueueTx::Latest(slot.clone()), QueueRx::Latest(slot))
        }
    }
}

/// Single-message hand-off buffer for the latest-message policy.
///
/// The slot is the shared state between the producer's post path and the
/// consumer's delivery loop; the mutex guards the swap so the two execution
/// contexts never touch the buffered message concurrently.
pub(crate) struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    notify: Notify,
}

struct SlotState<T> {
    pending: Option<Message<T>>,
    closed_at: Option<Timestamp>,
    closed_delivered: bool,
}

impl<T> LatestSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed_at: None,
                closed_delivered: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Stores a message, returning the undelivered one it replaced (if any).
    pub(crate) fn put(&self, msg: Message<T>) -> Option<Message<T>> {
        let replaced = {
            let mut state = self.state.lock().expect("latest slot lock poisoned");
            state.pending.replace(msg)
        };
        self.notify.notify_one();
        replaced
    }

    /// Marks the stream closed at `final_time`. Any pending message is still
    /// delivered before the close marker.
    pub(crate) fn close(&self, final_time: Timestamp) {
        {
            let mut state = self.state.lock().expect("latest slot lock poisoned");
            state.closed_at.get_or_insert(final_time);
        }
        self.notify.notify_one();
    }

    /// Consumer side: next item, or `None` after the close marker was taken.
    pub(crate) async fn recv(&self) -> Option<DeliveryItem<T>> {
        loop {
            {
                let mut state = self.state.lock().expect("latest slot lock poisoned");
                if let Some(msg) = state.pending.take() {
                    return Some(DeliveryItem::Message(msg));
                }
                if let Some(t) = state.closed_at {
                    if state.closed_delivered {
                        return None;
                    }
                    state.closed_delivered = true;
                    return Some(DeliveryItem::Closed(t));
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::envelope::{Envelope, StreamId};

    fn msg(n: u64) -> Message<u64> {
        Message {
            value: n,
            envelope: Envelope {
                source_id: StreamId(1),
                stream_name: "s".into(),
                sequence_id: n,
                originating_time: Timestamp::from_unix_millis(n as i64),
                creation_time: Timestamp::from_unix_millis(n as i64),
            },
        }
    }

    #[tokio::test]
    async fn test_latest_slot_keeps_only_newest() {
        let slot = LatestSlot::new();
        assert!(slot.put(msg(1)).is_none());
        let replaced = slot.put(msg(2)).expect("first message replaced");
        assert_eq!(replaced.value, 1);

        match slot.recv().await {
            Some(DeliveryItem::Message(m)) => assert_eq!(m.value, 2),
            other => panic!("expected newest message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_latest_slot_delivers_pending_before_close() {
        let slot = LatestSlot::new();
        slot.put(msg(5));
        slot.close(Timestamp::from_unix_millis(9));

        assert!(matches!(
            slot.recv().await,
            Some(DeliveryItem::Message(m)) if m.value == 5
        ));
        assert!(matches!(
            slot.recv().await,
            Some(DeliveryItem::Closed(t)) if t == Timestamp::from_unix_millis(9)
        ));
        assert!(slot.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_latest_slot_recv_waits_for_put() {
        let slot = std::sync::Arc::new(LatestSlot::new());
        let consumer = {
            let slot = slot.clone();
            tokio::spawn(async move { slot.recv().await })
        };
        tokio::task::yield_now().await;
        slot.put(msg(3));

        match consumer.await.unwrap() {
            Some(DeliveryItem::Message(m)) => assert_eq!(m.value, 3),
            other => panic!("expected message, got {other:?}"),
        }
    }
}
