//! # Store access for replay: reader contract and replay descriptors.
//!
//! A store holds one stream's persisted messages keyed by originating time.
//! Replay reads them back through a [`StoreReader`], re-posting each message
//! at its original originating time while the pipeline clock is advanced in
//! lockstep — downstream receivers cannot tell replay from live operation.

use std::time::Duration;

use crate::clock::Timestamp;

/// Cursor-based reader over one persisted stream.
///
/// Messages are yielded in strictly increasing originating-time order; the
/// store enforces that order at write time.
pub trait StoreReader<T>: Send + 'static {
    /// The closed interval `[first, last]` of originating times present, or
    /// `None` for an empty store.
    fn interval(&self) -> Option<(Timestamp, Timestamp)>;

    /// Moves the cursor to the first message at or after `start`.
    fn seek(&mut self, start: Timestamp);

    /// Yields the next message at the cursor, advancing it.
    fn next(&mut self) -> Option<(T, Timestamp)>;
}

/// Pacing of a replay run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReplayRate {
    /// Advance virtual time at `speed` times wall-clock rate
    /// (`1.0` reproduces the original timing).
    RealTime(f64),
    /// No pacing; virtual time jumps from message to message.
    AsFastAsPossible,
}

/// What to replay: the interval of originating times and the pacing.
///
/// An interval reaching outside the stored data is clamped to it; an interval
/// entirely outside the stored data is an error.
#[derive(Clone, Copy, Debug)]
pub struct ReplayDescriptor {
    /// First originating time to replay (inclusive).
    pub start: Timestamp,
    /// Last originating time to replay (inclusive).
    pub end: Timestamp,
    /// Pacing.
    pub rate: ReplayRate,
}

impl ReplayDescriptor {
    /// Replays `[start, end]` at original timing.
    pub fn between(start: Timestamp, end: Timestamp) -> Self {
        Self {
            start,
            end,
            rate: ReplayRate::RealTime(1.0),
        }
    }

    /// Replays everything the store holds.
    pub fn all() -> Self {
        Self {
            start: Timestamp::MIN,
            end: Timestamp::MAX,
            rate: ReplayRate::RealTime(1.0),
        }
    }

    /// Sets the pacing. A non-positive or non-finite `RealTime` speed is
    /// replaced by `1.0`.
    pub fn with_rate(mut self, rate: ReplayRate) -> Self {
        self.rate = match rate {
            ReplayRate::RealTime(s) if !(s.is_finite() && s > 0.0) => ReplayRate::RealTime(1.0),
            other => other,
        };
        self
    }

    /// Wall-clock delay before a message `delta` ahead of current virtual time.
    pub(crate) fn pacing_delay(&self, delta: Duration) -> Option<Duration> {
        match self.rate {
            ReplayRate::AsFastAsPossible => None,
            ReplayRate::RealTime(speed) => {
                if delta.is_zero() {
                    None
                } else {
                    Some(delta.div_f64(speed))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ReplayDescriptor, ReplayRate};

    #[test]
    fn invalid_speed_falls_back_to_original_timing() {
        let d = ReplayDescriptor::all().with_rate(ReplayRate::RealTime(0.0));
        assert_eq!(d.rate, ReplayRate::RealTime(1.0));
        let d = ReplayDescriptor::all().with_rate(ReplayRate::RealTime(f64::NAN));
        assert_eq!(d.rate, ReplayRate::RealTime(1.0));
    }

    #[test]
    fn pacing_scales_with_speed() {
        let d = ReplayDescriptor::all().with_rate(ReplayRate::RealTime(2.0));
        assert_eq!(
            d.pacing_delay(Duration::from_secs(1)),
            Some(Duration::from_millis(500))
        );
        let fast = ReplayDescriptor::all().with_rate(ReplayRate::AsFastAsPossible);
        assert_eq!(fast.pacing_delay(Duration::from_secs(1)), None);
    }
}
