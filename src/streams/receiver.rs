//! # Receiver side of a connection: the [`Receive`] trait and delivery state.
//!
//! A receiver is a typed, single-consumer sink bound to exactly one upstream
//! emitter. User code supplies a [`Receive<T>`] implementation (or a
//! [`ReceiveFn`] closure); the runtime wraps it in a `ReceiverCore` that owns
//! the serialization lock, the queue-depth counter, and error escalation.
//!
//! ## Ordering guarantee
//! For a single receiver, callbacks are invoked in strictly increasing
//! `originating_time` order. Deliveries for one receiver never run
//! concurrently: every invocation happens under the core's `busy` lock,
//! whether it arrives through the queue or through the inline fast path.
//!
//! ## Failure handling
//! An error (or panic) inside `on_message` is caught per-delivery, attributed
//! to the receiver and its stream, published as a `ReceiverFailed` event, and
//! escalated per the pipeline's fault policy. It is never silently swallowed.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use futures::FutureExt;

use crate::clock::{Clock, Timestamp};
use crate::core::FaultHandle;
use crate::error::{PipelineError, ReceiverError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::DeliveryPolicy;
use crate::streams::envelope::{Envelope, Message};

/// # Typed message sink.
///
/// Implementations are invoked by a scheduler delivery loop with the value and
/// its envelope. Handlers must return promptly; long-running work should be
/// offloaded explicitly. A stalled handler stalls only its own stream.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use chronoflow::{Envelope, Receive, ReceiverError, Timestamp};
///
/// struct Printer;
///
/// #[async_trait]
/// impl Receive<String> for Printer {
///     fn name(&self) -> &str { "printer" }
///
///     async fn on_message(&self, value: String, envelope: Envelope) -> Result<(), ReceiverError> {
///         println!("{value} @ {:?}", envelope.originating_time);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Receive<T>: Send + Sync + 'static {
    /// Stable, human-readable receiver name.
    fn name(&self) -> &str;

    /// Handles one delivered message.
    async fn on_message(&self, value: T, envelope: Envelope) -> Result<(), ReceiverError>;

    /// Called exactly once after the last message, when the upstream stream
    /// closes. `final_time` is the stream's final originating time; no message
    /// with a greater originating time will ever arrive. Joins and aggregators
    /// use this to finalize.
    async fn on_closed(&self, final_time: Timestamp) {
        let _ = final_time;
    }
}

/// Shared handle to a receiver implementation.
pub type ReceiverRef<T> = Arc<dyn Receive<T>>;

/// Closure-backed receiver.
///
/// Wraps `F: Fn(T, Envelope) -> Fut`, producing a fresh future per delivery.
/// Shared state goes through an explicit `Arc` inside the closure.
///
/// ## Example
/// ```rust
/// use chronoflow::{Envelope, Receive, ReceiveFn, ReceiverError};
///
/// let sink = ReceiveFn::arc("sink", |value: u64, _env: Envelope| async move {
///     if value == 0 {
///         return Err(ReceiverError::Fail { error: "zero is not a reading".into() });
///     }
///     Ok(())
/// });
/// assert_eq!(sink.name(), "sink");
/// ```
pub struct ReceiveFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ReceiveFn<F> {
    /// Creates a new closure-backed receiver.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the receiver and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<T, F, Fut> Receive<T> for ReceiveFn<F>
where
    T: Send + 'static,
    F: Fn(T, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ReceiverError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_message(&self, value: T, envelope: Envelope) -> Result<(), ReceiverError> {
        (self.f)(value, envelope).await
    }
}

/// Runtime state for one connection's receiver side.
///
/// Shared between the emitter's post path (inline delivery attempt) and the
/// connection's delivery loop. The `busy` lock serializes invocations; `depth`
/// counts queued-but-undelivered messages so the inline path can tell whether
/// skipping the queue would reorder anything.
pub(crate) struct ReceiverCore<T> {
    pub(crate) name: Arc<str>,
    pub(crate) stream: Arc<str>,
    pub(crate) policy: DeliveryPolicy,
    pub(crate) depth: AtomicUsize,
    pub(crate) bus: Bus,
    pub(crate) clock: Arc<Clock>,
    handler: ReceiverRef<T>,
    busy: tokio::sync::Mutex<()>,
    last_delivered: std::sync::Mutex<Option<Timestamp>>,
    fault: FaultHandle,
}

impl<T: Send + 'static> ReceiverCore<T> {
    pub(crate) fn new(
        stream: Arc<str>,
        handler: ReceiverRef<T>,
        policy: DeliveryPolicy,
        bus: Bus,
        clock: Arc<Clock>,
        fault: FaultHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(handler.name()),
            stream,
            policy,
            depth: AtomicUsize::new(0),
            bus,
            clock,
            handler,
            busy: tokio::sync::Mutex::new(()),
            last_delivered: std::sync::Mutex::new(None),
            fault,
        })
    }

    /// Delivers one queued message, waiting for the serialization lock.
    pub(crate) async fn deliver(&self, msg: Message<T>) {
        let _guard = self.busy.lock().await;
        self.invoke_locked(msg).await;
    }

    /// Attempts zero-hop delivery on the posting task.
    ///
    /// Succeeds only when nothing is queued ahead of this message and the
    /// receiver is idle; otherwise hands the message back for normal queueing.
    pub(crate) async fn try_deliver_inline(&self, msg: Message<T>) -> Result<(), Message<T>> {
        if self.depth.load(AtomicOrdering::Acquire) != 0 {
            return Err(msg);
        }
        match self.busy.try_lock() {
            Ok(_guard) => {
                self.invoke_locked(msg).await;
                Ok(())
            }
            Err(_) => Err(msg),
        }
    }

    /// Delivers the end-of-stream notification.
    pub(crate) async fn close(&self, final_time: Timestamp) {
        let _guard = self.busy.lock().await;
        self.handler.on_closed(final_time).await;
        self.bus.publish(
            Event::now(EventKind::ReceiverClosed)
                .with_component(self.name.clone())
                .with_stream(self.stream.clone())
                .with_time(final_time),
        );
    }

    /// Invokes the handler. Caller must hold `busy`.
    async fn invoke_locked(&self, msg: Message<T>) {
        let time = msg.envelope.originating_time;
        {
            let mut last = self.last_delivered.lock().expect("ordering lock poisoned");
            // Structurally impossible unless the queue itself reordered.
            debug_assert!(
                last.map_or(true, |l| time > l),
                "receiver '{}' saw non-increasing time {time:?}",
                self.name
            );
            *last = Some(time);
        }

        let fut = self.handler.on_message(msg.value, msg.envelope);
        match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(ReceiverError::Canceled)) => {}
            Ok(Err(e)) => self.report_failure(time, e.to_string()),
            Err(panic_err) => {
                let info = {
                    let any = &*panic_err;
                    if let Some(msg) = any.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = any.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    }
                };
                self.report_failure(time, format!("panic: {info}"));
            }
        }
    }

    fn report_failure(&self, time: Timestamp, error: String) {
        self.bus.publish(
            Event::now(EventKind::ReceiverFailed)
                .with_component(self.name.clone())
                .with_stream(self.stream.clone())
                .with_time(time)
                .with_error(error.clone()),
        );
        self.fault.report(PipelineError::ReceiverFailed {
            receiver: self.name.to_string(),
            stream: self.stream.to_string(),
            error,
        });
    }
}
