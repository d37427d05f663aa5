//! # Scheduler: per-receiver delivery loops on a shared worker pool.
//!
//! The scheduler turns each wired connection into one long-lived delivery
//! loop task. Loops for different receivers run concurrently on the tokio
//! worker pool; deliveries for one receiver are serialized by that receiver's
//! own loop (and its `busy` lock, shared with the inline fast path).
//!
//! ## Delivery loop
//! ```text
//! loop {
//!   item = queue.recv()                      (None → emitter dropped, exit)
//!   ├─ Closed(t)   → on_closed(t), publish ReceiverClosed, exit
//!   └─ Message(m)  → acquire global permit (if configured)
//!                    ├─ older than maximum_latency? drop + MessageDropped
//!                    └─ deliver under the receiver's busy lock
//! }
//! ```
//!
//! ## Rules
//! - An optional global semaphore caps deliveries in flight across the whole
//!   pipeline tree; `None` leaves parallelism to the tokio worker pool.
//! - Draining is the exit path: loops run until their queue closes, so every
//!   message enqueued before shutdown is delivered (or dropped by an explicit
//!   policy) before the loop ends.
//! - Faults escalate through a [`FaultHandle`], never by unwinding.

use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering as AtomicOrdering;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::config::FaultPolicy;
use crate::error::PipelineError;
use crate::events::{Event, EventKind};
use crate::streams::{DeliveryItem, QueueRx, ReceiverCore};

/// Work-distribution authority shared by a pipeline and its subpipelines.
///
/// Owns only the global concurrency cap; the delivery loops themselves are
/// owned by whichever (sub)pipeline wired them, so disposing a subpipeline
/// tears down only its own loops.
pub struct Scheduler {
    limit: Option<usize>,
    semaphore: Option<Arc<Semaphore>>,
}

impl Scheduler {
    pub(crate) fn new(limit: Option<usize>) -> Arc<Self> {
        let limit = limit.map(|n| n.max(1));
        Arc::new(Self {
            limit,
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
        })
    }

    /// The configured cap on simultaneous deliveries, if any.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.limit
    }

    /// Spawns the delivery loop for one connection.
    pub(crate) fn spawn_delivery_loop<T: Send + 'static>(
        &self,
        core: Arc<ReceiverCore<T>>,
        mut rx: QueueRx<T>,
    ) -> WorkerHandle {
        let semaphore = self.semaphore.clone();
        let name = core.name.clone();

        let join = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    DeliveryItem::Closed(final_time) => {
                        core.close(final_time).await;
                        break;
                    }
                    DeliveryItem::Message(msg) => {
                        let _permit = match &semaphore {
                            Some(sem) => match sem.clone().acquire_owned().await {
                                Ok(permit) => Some(permit),
                                Err(_closed) => break,
                            },
                            None => None,
                        };

                        if let Some(max) = core.policy.maximum_latency {
                            let age = msg.envelope.latency(core.clock.now());
                            if age > max {
                                core.bus.publish(
                                    Event::now(EventKind::MessageDropped)
                                        .with_component(core.name.clone())
                                        .with_stream(core.stream.clone())
                                        .with_time(msg.envelope.originating_time)
                                        .with_error("exceeded maximum latency"),
                                );
                                core.depth.fetch_sub(1, AtomicOrdering::AcqRel);
                                continue;
                            }
                        }

                        core.deliver(msg).await;
                        core.depth.fetch_sub(1, AtomicOrdering::AcqRel);
                    }
                }
            }
        });

        WorkerHandle { name, join }
    }
}

/// Handle to one spawned delivery loop, owned by the wiring (sub)pipeline.
pub(crate) struct WorkerHandle {
    /// Receiver name, reported when a drain exceeds the grace period.
    pub(crate) name: Arc<str>,
    /// Join handle; aborted only after the grace period expires.
    pub(crate) join: JoinHandle<()>,
}

/// Escalation path for failures observed inside delivery loops.
///
/// The first raised fault wins; it is stored for the disposer to surface and
/// the pipeline's token is cancelled so components stop producing.
#[derive(Clone)]
pub(crate) struct FaultHandle {
    token: CancellationToken,
    slot: Arc<Mutex<Option<PipelineError>>>,
    policy: FaultPolicy,
}

impl FaultHandle {
    pub(crate) fn new(token: CancellationToken, policy: FaultPolicy) -> Self {
        Self {
            token,
            slot: Arc::new(Mutex::new(None)),
            policy,
        }
    }

    /// Reports a receiver failure, escalating only under [`FaultPolicy::Abort`].
    ///
    /// Under [`FaultPolicy::Continue`] the event already published by the
    /// caller is the whole story; the stream keeps flowing.
    pub(crate) fn report(&self, err: PipelineError) {
        match self.policy {
            FaultPolicy::Abort => self.raise(err),
            FaultPolicy::Continue => {}
        }
    }

    /// Unconditionally faults the pipeline with `err` (first fault wins).
    pub(crate) fn raise(&self, err: PipelineError) {
        {
            let mut slot = self.slot.lock().expect("fault slot poisoned");
            slot.get_or_insert(err);
        }
        self.token.cancel();
    }

    /// Takes the recorded fault, if any. Called once by the disposer.
    pub(crate) fn take(&self) -> Option<PipelineError> {
        self.slot.lock().expect("fault slot poisoned").take()
    }
}
