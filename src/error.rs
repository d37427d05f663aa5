//! Error types used by the chronoflow runtime, emitters, and handlers.
//!
//! This module defines four error enums:
//!
//! - [`PipelineError`] — errors raised by the pipeline/scheduler runtime itself.
//! - [`PostError`] — errors raised by [`Emitter::post`](crate::Emitter::post).
//! - [`ReceiverError`] — errors raised inside receiver callbacks.
//! - [`ComponentError`] — errors raised by component execution.
//!
//! All types provide `as_label()` for stable snake_case identifiers in
//! logs/metrics. Temporal-ordering violations are never downgraded: they
//! surface as hard errors at the point of the offending call.

use std::time::Duration;
use thiserror::Error;

use crate::clock::Timestamp;
use crate::core::State;

/// # Errors produced by the pipeline runtime.
///
/// These represent failures of the scheduling/lifecycle machinery rather than
/// of any single message delivery: shutdown overruns, replay interval
/// violations, clock misuse, and faults escalated from components/receivers.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PipelineError {
    /// An attempt was made to move pipeline time backwards.
    #[error("invalid temporal order: requested {requested:?} is behind current {current:?}")]
    InvalidTemporalOrder {
        /// Current pipeline time.
        current: Timestamp,
        /// The (rejected) earlier time.
        requested: Timestamp,
    },

    /// `advance_to` was called on a clock that is not in replay mode.
    #[error("clock is not in replay mode; virtual time is driven by the OS clock")]
    NotReplaying,

    /// A replay interval was requested entirely outside the data present in the store.
    #[error(
        "replay interval [{requested_start:?}, {requested_end:?}] lies outside stored data [{available_start:?}, {available_end:?}]"
    )]
    ReplayBoundsExceeded {
        /// Requested interval start.
        requested_start: Timestamp,
        /// Requested interval end.
        requested_end: Timestamp,
        /// Earliest timestamp actually present.
        available_start: Timestamp,
        /// Latest timestamp actually present.
        available_end: Timestamp,
    },

    /// Shutdown grace period was exceeded; some workers were force-terminated.
    #[error("shutdown grace {grace:?} exceeded; pending: {pending:?}; forcing teardown")]
    ShutdownTimeout {
        /// The configured grace duration.
        grace: Duration,
        /// Names of components/receivers that did not drain in time.
        pending: Vec<String>,
    },

    /// An operation was attempted in the wrong lifecycle state
    /// (e.g. wiring a connection after `run`).
    #[error("pipeline '{pipeline}' is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// Pipeline name.
        pipeline: String,
        /// State required by the operation.
        expected: State,
        /// State the pipeline was actually in.
        actual: State,
    },

    /// A receiver callback failed and the fault policy aborts the pipeline.
    #[error("receiver '{receiver}' on stream '{stream}' failed: {error}")]
    ReceiverFailed {
        /// Receiver name.
        receiver: String,
        /// Upstream stream name.
        stream: String,
        /// Underlying error message.
        error: String,
    },

    /// A component failed during execution or shutdown.
    #[error("component '{component}' failed: {error}")]
    ComponentFailed {
        /// Component name.
        component: String,
        /// Underlying error message.
        error: String,
    },
}

impl PipelineError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PipelineError::InvalidTemporalOrder { .. } => "invalid_temporal_order",
            PipelineError::NotReplaying => "not_replaying",
            PipelineError::ReplayBoundsExceeded { .. } => "replay_bounds_exceeded",
            PipelineError::ShutdownTimeout { .. } => "shutdown_timeout",
            PipelineError::InvalidState { .. } => "invalid_state",
            PipelineError::ReceiverFailed { .. } => "receiver_failed",
            PipelineError::ComponentFailed { .. } => "component_failed",
        }
    }
}

/// # Errors produced by posting to an emitter.
///
/// A [`NonMonotonicTime`](PostError::NonMonotonicTime) rejection means the
/// offending message is never enqueued anywhere. Consecutive equal timestamps
/// are rejected like regressions: downstream joins rely on per-stream
/// timestamp uniqueness for determinism.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum PostError {
    /// The originating time is not strictly greater than the previous post.
    #[error("non-monotonic originating time on stream '{stream}': offered {offered:?} <= last {last:?}")]
    NonMonotonicTime {
        /// Stream name.
        stream: String,
        /// Originating time of the last accepted post.
        last: Timestamp,
        /// The rejected originating time.
        offered: Timestamp,
    },

    /// The stream was closed (pipeline stopping or already stopped).
    #[error("stream '{stream}' is closed")]
    Closed {
        /// Stream name.
        stream: String,
    },
}

impl PostError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PostError::NonMonotonicTime { .. } => "non_monotonic_time",
            PostError::Closed { .. } => "stream_closed",
        }
    }
}

/// # Errors produced by receiver callbacks.
///
/// Raised from [`Receive::on_message`](crate::Receive::on_message). The
/// scheduler catches these per-delivery, attributes them to the failing
/// receiver and stream, and surfaces them as `ReceiverFailed` events.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Handler failed to process this message.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler observed cancellation and stopped cooperatively.
    #[error("handler cancelled")]
    Canceled,
}

/// # Errors produced by component execution.
///
/// Returned from [`Component::run`](crate::Component::run).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ComponentError {
    /// Component failed while producing or processing.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the pipeline faults regardless of fault policy.
    #[error("fatal error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Component observed cancellation and stopped cooperatively.
    ///
    /// Treated as a graceful exit, not a failure.
    #[error("context cancelled")]
    Canceled,
}

impl ComponentError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ComponentError::Fail { .. } => "component_failed",
            ComponentError::Fatal { .. } => "component_fatal",
            ComponentError::Canceled => "component_canceled",
        }
    }

    /// True for [`ComponentError::Canceled`]: the component exited because it
    /// was asked to, not because something broke.
    pub fn is_graceful(&self) -> bool {
        matches!(self, ComponentError::Canceled)
    }
}
