//! # Emitter: the typed, single-producer publish endpoint of a stream.
//!
//! [`Emitter<T>`] is a cheap cloneable handle; producer components keep a
//! clone inside their run closures. [`Emitter::post`] validates temporal
//! order, stamps the envelope, and fans the message out to every connected
//! receiver according to that connection's [`DeliveryPolicy`].
//!
//! ## Post path
//! ```text
//! post(value, originating_time)
//!   ├─ reject if closed                         → PostError::Closed
//!   ├─ reject if time <= last accepted time     → PostError::NonMonotonicTime
//!   ├─ seq += 1, stamp Envelope (creation_time from the pipeline Clock)
//!   └─ for each connection:
//!        ├─ attempt_synchronous? try inline delivery (receiver idle, queue empty)
//!        ├─ Unlimited  → unbounded enqueue
//!        ├─ Throttle   → try_send; on full: publish ThrottleEngaged, then block
//!        └─ Latest     → swap into slot; replaced message → MessageDropped
//! ```
//!
//! ## Rules
//! - Posts on one emitter are serialized; the per-stream sequence number and
//!   the monotonicity check share one lock.
//! - A rejected post enqueues nothing anywhere.
//! - After `close`, all further posts fail with [`PostError::Closed`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering as AtomicOrdering;

use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, timeout_at};

use crate::clock::{Clock, Timestamp};
use crate::error::PostError;
use crate::events::{Event, EventKind};
use crate::streams::envelope::{Envelope, Message, StreamId};
use crate::streams::queue::{DeliveryItem, QueueTx};
use crate::streams::receiver::ReceiverCore;

/// Typed publish endpoint of one stream.
///
/// Created through [`Pipeline::create_emitter`](crate::Pipeline::create_emitter);
/// cloning the handle does not create a new stream.
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

pub(crate) struct EmitterInner<T> {
    id: StreamId,
    name: Arc<str>,
    clock: Arc<Clock>,
    state: tokio::sync::Mutex<EmitterState<T>>,
}

struct EmitterState<T> {
    seq: u64,
    last: Option<Envelope>,
    connections: Vec<Connection<T>>,
    closed: bool,
}

/// One wired emitter→receiver edge.
pub(crate) struct Connection<T> {
    pub(crate) core: Arc<ReceiverCore<T>>,
    pub(crate) tx: QueueTx<T>,
}

impl<T: Clone + Send + 'static> Emitter<T> {
    pub(crate) fn new(id: StreamId, name: Arc<str>, clock: Arc<Clock>) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                id,
                name,
                clock,
                state: tokio::sync::Mutex::new(EmitterState {
                    seq: 0,
                    last: None,
                    connections: Vec::new(),
                    closed: false,
                }),
            }),
        }
    }

    /// Stream name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Stream identity.
    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    /// Metadata of the most recently accepted post, if any.
    ///
    /// Consumers use this to skip duplicate work when time has not advanced.
    pub async fn last_envelope(&self) -> Option<Envelope> {
        self.inner.state.lock().await.last.clone()
    }

    /// Posts a value at `originating_time`, fanning it out to all connections.
    ///
    /// May suspend the caller only on a [`Throttle`](crate::DeliveryMode::Throttle)
    /// connection with a full queue — that is the backpressure contract.
    ///
    /// ### Errors
    /// - [`PostError::NonMonotonicTime`] if `originating_time` is not strictly
    ///   greater than the previous accepted post. Nothing is enqueued; the
    ///   per-stream sequence number does not advance.
    /// - [`PostError::Closed`] after the stream closed.
    pub async fn post(&self, value: T, originating_time: Timestamp) -> Result<(), PostError> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(PostError::Closed {
                stream: self.inner.name.to_string(),
            });
        }
        if let Some(last) = &state.last {
            if originating_time <= last.originating_time {
                return Err(PostError::NonMonotonicTime {
                    stream: self.inner.name.to_string(),
                    last: last.originating_time,
                    offered: originating_time,
                });
            }
        }

        state.seq += 1;
        let envelope = Envelope {
            source_id: self.inner.id,
            stream_name: self.inner.name.clone(),
            sequence_id: state.seq,
            originating_time,
            creation_time: self.inner.clock.now(),
        };
        state.last = Some(envelope.clone());

        for conn in &state.connections {
            conn.deliver(Message {
                value: value.clone(),
                envelope: envelope.clone(),
            })
            .await;
        }
        Ok(())
    }

    /// Wires a new connection. Pre-run only; enforced by the pipeline.
    pub(crate) async fn attach(&self, conn: Connection<T>) -> Result<(), PostError> {
        let mut state = self.inner.state.lock().await;
        if state.closed {
            return Err(PostError::Closed {
                stream: self.inner.name.to_string(),
            });
        }
        state.connections.push(conn);
        Ok(())
    }

    /// Type-erased handle for lifecycle management by the pipeline.
    pub(crate) fn control(&self) -> Arc<dyn EmitterControl> {
        self.inner.clone()
    }
}

impl<T: Clone + Send + 'static> Connection<T> {
    /// Delivers one message according to this connection's policy.
    async fn deliver(&self, msg: Message<T>) {
        let mut msg = msg;
        if self.core.policy.attempt_synchronous {
            match self.core.try_deliver_inline(msg).await {
                Ok(()) => return,
                Err(back) => msg = back,
            }
        }

        match &self.tx {
            QueueTx::Unbounded(tx) => {
                self.core.depth.fetch_add(1, AtomicOrdering::AcqRel);
                if tx.send(DeliveryItem::Message(msg)).is_err() {
                    self.core.depth.fetch_sub(1, AtomicOrdering::AcqRel);
                }
            }
            QueueTx::Bounded(tx) => {
                self.core.depth.fetch_add(1, AtomicOrdering::AcqRel);
                match tx.try_send(DeliveryItem::Message(msg)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(item)) => {
                        self.core.bus.publish(
                            Event::now(EventKind::ThrottleEngaged)
                                .with_component(self.core.name.clone())
                                .with_stream(self.core.stream.clone()),
                        );
                        // Backpressure: block the producer until a slot frees up.
                        if tx.send(item).await.is_err() {
                            self.core.depth.fetch_sub(1, AtomicOrdering::AcqRel);
                        }
                    }
                    Err(TrySendError::Closed(_)) => {
                        self.core.depth.fetch_sub(1, AtomicOrdering::AcqRel);
                    }
                }
            }
            QueueTx::Latest(slot) => match slot.put(msg) {
                Some(dropped) => {
                    self.core.bus.publish(
                        Event::now(EventKind::MessageDropped)
                            .with_component(self.core.name.clone())
                            .with_stream(self.core.stream.clone())
                            .with_time(dropped.envelope.originating_time)
                            .with_error("superseded by newer message"),
                    );
                }
                None => {
                    self.core.depth.fetch_add(1, AtomicOrdering::AcqRel);
                }
            },
        }
    }
}

/// Type-erased emitter lifecycle surface used by the pipeline.
#[async_trait]
pub(crate) trait EmitterControl: Send + Sync {
    /// Closes the stream at `final_time`: every connection receives a close
    /// marker after its queued messages, then the queues shut down.
    ///
    /// A full throttle queue blocks the marker only until `deadline`; past it
    /// the sender is dropped anyway so the delivery loop still sees its queue
    /// close once (if ever) it drains.
    async fn close(&self, final_time: Timestamp, deadline: Instant);
}

#[async_trait]
impl<T: Send + 'static> EmitterControl for EmitterInner<T> {
    async fn close(&self, final_time: Timestamp, deadline: Instant) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        for conn in state.connections.drain(..) {
            match conn.tx {
                QueueTx::Unbounded(tx) => {
                    let _ = tx.send(DeliveryItem::Closed(final_time));
                }
                QueueTx::Bounded(tx) => {
                    // A stalled receiver must not wedge shutdown behind a
                    // full queue; the drain phase reports it instead.
                    let _ = timeout_at(deadline, tx.send(DeliveryItem::Closed(final_time))).await;
                }
                QueueTx::Latest(slot) => slot.close(final_time),
            }
            // Dropping the sender here lets the delivery loop drain and exit.
        }
    }
}
