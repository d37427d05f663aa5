//! Streams: envelopes, emitters, receivers, and delivery queues.
//!
//! A *stream* is an ordered, unbounded sequence of [`Envelope`]-wrapped values
//! of one fixed type, produced by exactly one [`Emitter`] and consumed by zero
//! or more receivers. Per-stream total order by originating time is enforced
//! at `post`; cross-stream order is never guaranteed.
//!
//! Internal modules:
//! - [`envelope`]: the timestamped, sequenced message metadata;
//! - [`emitter`]: the publish endpoint and per-connection fan-out;
//! - [`receiver`]: the [`Receive`] trait and per-receiver delivery state;
//! - [`queue`]: queue shapes backing each delivery policy.

mod emitter;
mod envelope;
mod queue;
mod receiver;

pub use emitter::Emitter;
pub use envelope::{Envelope, Message, StreamId};
pub use receiver::{Receive, ReceiveFn, ReceiverRef};

pub(crate) use emitter::{Connection, EmitterControl};
pub(crate) use queue::{DeliveryItem, QueueRx, build_queue};
pub(crate) use receiver::ReceiverCore;
