//! # Runtime events emitted by pipelines, delivery loops, and replay.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Pipeline lifecycle**: run / stopping / completed / faulted, plus the
//!   subpipeline equivalents.
//! - **Component lifecycle**: completion and failure of source components.
//! - **Delivery**: receiver failures, policy drops, throttling, stream close.
//! - **Housekeeping**: drain results, subscriber overflow/panic, replay clamping.
//!
//! Each event carries a globally unique, monotonically increasing sequence
//! number (`seq`). Subscribers that receive events out of order can use `seq`
//! to restore the publish order.
//!
//! ## Example
//! ```rust
//! use chronoflow::{Event, EventKind, Timestamp};
//!
//! let ev = Event::now(EventKind::MessageDropped)
//!     .with_stream("camera")
//!     .with_component("detector")
//!     .with_time(Timestamp::from_unix_millis(42))
//!     .with_error("exceeded maximum latency");
//!
//! assert_eq!(ev.kind, EventKind::MessageDropped);
//! assert_eq!(ev.stream.as_deref(), Some("camera"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::clock::Timestamp;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Pipeline lifecycle ===
    /// Pipeline transitioned to Running; components may seed their first work.
    ///
    /// Sets: `pipeline`, `at`, `seq`.
    PipelineRun,

    /// Pipeline began its drain-then-stop sequence.
    ///
    /// Sets: `pipeline`, `at`, `seq`.
    PipelineStopping,

    /// Pipeline drained and stopped cleanly.
    ///
    /// Sets: `pipeline`, `at`, `seq`.
    PipelineCompleted,

    /// Pipeline stopped with an unrecoverable error.
    ///
    /// Sets: `pipeline`, `error`, `at`, `seq`.
    PipelineFaulted,

    /// A subpipeline transitioned to Running.
    ///
    /// Sets: `pipeline` (subpipeline name), `at`, `seq`.
    SubpipelineStarted,

    /// A subpipeline was disposed; its parent keeps running.
    ///
    /// Sets: `pipeline` (subpipeline name), `at`, `seq`.
    SubpipelineDisposed,

    // === Component lifecycle ===
    /// A source component finished on its own (finite source exhausted, or
    /// cooperative exit on cancellation).
    ///
    /// Sets: `pipeline`, `component`, `time` (final originating time, if finite), `at`, `seq`.
    ComponentCompleted,

    /// A component returned an error.
    ///
    /// Sets: `pipeline`, `component`, `error`, `at`, `seq`.
    ComponentFailed,

    // === Delivery ===
    /// A receiver callback returned an error or panicked; attributed to the
    /// failing receiver and its upstream stream. Never silently swallowed.
    ///
    /// Sets: `component` (receiver name), `stream`, `error`, `time` (originating), `at`, `seq`.
    ReceiverFailed,

    /// A receiver observed end-of-stream and was notified via `on_closed`.
    ///
    /// Sets: `component` (receiver name), `stream`, `time` (final originating time), `at`, `seq`.
    ReceiverClosed,

    /// A queued message was discarded by delivery policy (latest-message
    /// overwrite or maximum-latency expiry). A policy outcome, not an error.
    ///
    /// Sets: `component` (receiver name), `stream`, `time` (originating), `error` (reason), `at`, `seq`.
    MessageDropped,

    /// A throttled connection filled up and the producer is now blocked.
    ///
    /// Sets: `component` (receiver name), `stream`, `at`, `seq`.
    ThrottleEngaged,

    // === Replay ===
    /// A requested replay interval was clamped to the data actually present.
    ///
    /// Sets: `component` (driver name), `stream`, `error` (clamp detail), `at`, `seq`.
    ReplayClamped,

    // === Housekeeping ===
    /// All delivery queues drained within the grace period.
    ///
    /// Sets: `pipeline`, `at`, `seq`.
    DrainCompleted,

    /// Grace period exceeded; stragglers were force-terminated.
    ///
    /// Sets: `pipeline`, `error` (pending names), `at`, `seq`.
    GraceExceeded,

    /// A diagnostic subscriber's queue overflowed and an event was dropped
    /// for that subscriber only.
    ///
    /// Sets: `component` (subscriber name), `error` (reason), `at`, `seq`.
    SubscriberOverflow,

    /// A diagnostic subscriber panicked while handling an event.
    ///
    /// Sets: `component` (subscriber name), `error` (panic info), `at`, `seq`.
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Pipeline or subpipeline name, if applicable.
    pub pipeline: Option<Arc<str>>,
    /// Component or receiver name, if applicable.
    pub component: Option<Arc<str>>,
    /// Stream name, if applicable.
    pub stream: Option<Arc<str>>,
    /// Human-readable error/reason detail.
    pub error: Option<Arc<str>>,
    /// Originating (pipeline) time the event refers to.
    pub time: Option<Timestamp>,
    /// Count detail (e.g. number of dropped messages).
    pub count: Option<u64>,
}

impl Event {
    /// Creates an event of the given kind stamped with the current wall clock
    /// and the next global sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            pipeline: None,
            component: None,
            stream: None,
            error: None,
            time: None,
            count: None,
        }
    }

    /// Attaches a pipeline name.
    #[inline]
    pub fn with_pipeline(mut self, name: impl Into<Arc<str>>) -> Self {
        self.pipeline = Some(name.into());
        self
    }

    /// Attaches a component/receiver name.
    #[inline]
    pub fn with_component(mut self, name: impl Into<Arc<str>>) -> Self {
        self.component = Some(name.into());
        self
    }

    /// Attaches a stream name.
    #[inline]
    pub fn with_stream(mut self, name: impl Into<Arc<str>>) -> Self {
        self.stream = Some(name.into());
        self
    }

    /// Attaches a human-readable error/reason.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches an originating time.
    #[inline]
    pub fn with_time(mut self, t: Timestamp) -> Self {
        self.time = Some(t);
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, n: u64) -> Self {
        self.count = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub(crate) fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_component(subscriber)
            .with_error(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub(crate) fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_component(subscriber)
            .with_error(info)
    }
}
