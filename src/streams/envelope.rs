//! # The message envelope: timestamped, sequenced metadata for one post.
//!
//! Every value posted to an [`Emitter`](crate::Emitter) is wrapped in an
//! [`Envelope`] carrying the stream identity, a per-stream sequence number,
//! and two timestamps:
//!
//! - `originating_time` — the logical time the message represents (e.g.
//!   sensor capture time); strictly increasing per stream.
//! - `creation_time` — pipeline time at `post`; used for latency measurement.
//!
//! Envelopes are immutable once posted. [`Message<T>`] pairs an envelope with
//! its value and is the unit owned by delivery queues until handed to a
//! receiver.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Timestamp;

/// Identity of one stream (one emitter) within a pipeline tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamId(pub(crate) u64);

impl StreamId {
    /// Raw numeric id (unique within a pipeline and its subpipelines).
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Timestamped, sequenced metadata for one posted message.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Identifies the originating stream.
    pub source_id: StreamId,
    /// Name of the originating stream (the emitter's name).
    pub stream_name: Arc<str>,
    /// Strictly increasing per-stream sequence number, starting at 1.
    pub sequence_id: u64,
    /// The logical timestamp the message represents. Strictly increasing
    /// per stream; ties are rejected at `post`.
    pub originating_time: Timestamp,
    /// Pipeline time at which the message was produced.
    pub creation_time: Timestamp,
}

impl Envelope {
    /// Age of this message at `now`, measured from creation time.
    ///
    /// This is the quantity checked against a delivery policy's
    /// `maximum_latency`.
    pub fn latency(&self, now: Timestamp) -> Duration {
        now.saturating_duration_since(self.creation_time)
    }
}

/// One queued unit of delivery: a value plus its envelope.
#[derive(Clone, Debug)]
pub struct Message<T> {
    /// The posted value.
    pub value: T,
    /// Metadata stamped at post time.
    pub envelope: Envelope,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(created_ms: i64) -> Envelope {
        Envelope {
            source_id: StreamId(7),
            stream_name: "test".into(),
            sequence_id: 1,
            originating_time: Timestamp::from_unix_millis(created_ms),
            creation_time: Timestamp::from_unix_millis(created_ms),
        }
    }

    #[test]
    fn test_latency_measures_age_from_creation() {
        let env = envelope(100);
        assert_eq!(
            env.latency(Timestamp::from_unix_millis(150)),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn test_latency_saturates_at_zero() {
        // A clock that has not caught up to creation time yields zero age,
        // never a negative one.
        let env = envelope(100);
        assert_eq!(env.latency(Timestamp::from_unix_millis(50)), Duration::ZERO);
    }
}
