//! # Pipeline time: [`Timestamp`] and [`Clock`].
//!
//! All ordering decisions in the runtime are made against *pipeline time*,
//! a monotonic virtual timeline decoupled from the OS clock. The [`Clock`]
//! maps between the two:
//!
//! ```text
//! Live mode:     virtual = epoch + (wall elapsed) × rate      (rate 1.0 = real time)
//! Replay mode:   virtual = originating time of the message being replayed
//!                (advanced explicitly by the replay driver, never by the OS clock)
//! ```
//!
//! ## Rules
//! - `now()` is monotonic within a single run; a stalled or stepped OS clock
//!   never makes pipeline time move backwards.
//! - In replay mode, only [`Clock::advance_to`] moves time, and it rejects
//!   backward movement with [`PipelineError::InvalidTemporalOrder`].
//! - Ownership: mutation of replay time belongs exclusively to the replay
//!   driver; every other party treats the clock as read-only.

use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::error::PipelineError;

/// A point on the pipeline timeline, in nanoseconds since the Unix epoch.
///
/// Cheap, totally ordered, and copyable. [`Timestamp::MAX`] doubles as the
/// "runs forever" completion sentinel for infinite source components.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Earliest representable time.
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    /// Latest representable time; sentinel for infinite streams.
    pub const MAX: Timestamp = Timestamp(i64::MAX);
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Creates a timestamp from nanoseconds since the Unix epoch.
    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Timestamp(nanos)
    }

    /// Creates a timestamp from milliseconds since the Unix epoch.
    pub const fn from_unix_millis(millis: i64) -> Self {
        Timestamp(millis * 1_000_000)
    }

    /// Creates a timestamp from a wall-clock instant.
    ///
    /// Times before the epoch map to negative nanoseconds.
    pub fn from_system(t: SystemTime) -> Self {
        match t.duration_since(UNIX_EPOCH) {
            Ok(d) => Timestamp(d.as_nanos().min(i64::MAX as u128) as i64),
            Err(e) => Timestamp(-(e.duration().as_nanos().min(i64::MAX as u128) as i64)),
        }
    }

    /// Nanoseconds since the Unix epoch.
    pub const fn as_unix_nanos(&self) -> i64 {
        self.0
    }

    /// Converts back to a wall-clock time.
    pub fn to_system(&self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_nanos(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_nanos(self.0.unsigned_abs())
        }
    }

    /// Adds a duration, saturating at [`Timestamp::MAX`].
    pub fn saturating_add(&self, d: Duration) -> Timestamp {
        let nanos = d.as_nanos().min(i64::MAX as u128) as i64;
        Timestamp(self.0.saturating_add(nanos))
    }

    /// Elapsed time since `earlier`, or [`Duration::ZERO`] if `earlier` is not earlier.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        if self.0 <= earlier.0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.0 - earlier.0) as u64)
        }
    }
}

impl std::fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Timestamp::MAX => write!(f, "t=inf"),
            Timestamp::MIN => write!(f, "t=-inf"),
            Timestamp(n) => write!(f, "t={n}ns"),
        }
    }
}

/// Clock mode: OS-driven or replay-driven.
enum Mode {
    Live {
        /// Monotonic anchor for elapsed measurement.
        started: Instant,
        /// Wall-clock time at `started`, for real<->virtual mapping.
        real_epoch: Timestamp,
        /// Virtual time at `started`.
        epoch: Timestamp,
        /// Virtual nanoseconds per real nanosecond.
        rate: f64,
    },
    Replay {
        /// Virtual time the replay started from.
        start: Timestamp,
        /// Current virtual time (last `advance_to`).
        current: Timestamp,
        /// Wall-clock time when the clock was created.
        real_epoch: Timestamp,
    },
}

/// Maps wall-clock time to monotonic pipeline time.
///
/// One clock is shared by a pipeline and all of its subpipelines. It is
/// read-mostly: the only mutation path is [`Clock::advance_to`] during replay.
///
/// ### Modes
/// - [`Clock::live`] — pipeline time tracks the OS clock 1:1.
/// - [`Clock::live_scaled`] — affine transform with an explicit epoch and rate
///   multiplier (e.g. accelerated simulation against live sources).
/// - [`Clock::replay`] — pipeline time is driven by the originating times of
///   replayed messages; the OS clock is irrelevant to ordering.
pub struct Clock {
    inner: Mutex<Inner>,
}

struct Inner {
    mode: Mode,
    /// Highest virtual time ever observed; `now()` never returns less.
    floor: Timestamp,
}

impl Clock {
    /// Creates a real-time clock: pipeline time equals wall-clock time.
    pub fn live() -> Self {
        let epoch = Timestamp::from_system(SystemTime::now());
        Self::live_scaled(epoch, 1.0)
    }

    /// Creates a live clock with an explicit virtual epoch and rate multiplier.
    ///
    /// Virtual time is `epoch + elapsed × rate`. A rate above 1.0 compresses
    /// wall time; below 1.0 stretches it.
    pub fn live_scaled(epoch: Timestamp, rate: f64) -> Self {
        Clock {
            inner: Mutex::new(Inner {
                mode: Mode::Live {
                    started: Instant::now(),
                    real_epoch: Timestamp::from_system(SystemTime::now()),
                    epoch,
                    rate,
                },
                floor: epoch,
            }),
        }
    }

    /// Creates a replay clock positioned at `start`.
    ///
    /// Time advances only through [`Clock::advance_to`].
    pub fn replay(start: Timestamp) -> Self {
        Clock {
            inner: Mutex::new(Inner {
                mode: Mode::Replay {
                    start,
                    current: start,
                    real_epoch: Timestamp::from_system(SystemTime::now()),
                },
                floor: start,
            }),
        }
    }

    /// Returns the current pipeline time. Monotonic within a run.
    pub fn now(&self) -> Timestamp {
        let mut inner = self.inner.lock().expect("clock lock poisoned");
        let t = match &inner.mode {
            Mode::Live {
                started,
                epoch,
                rate,
                ..
            } => {
                let elapsed = started.elapsed().as_nanos().min(i64::MAX as u128) as i64;
                let scaled = (elapsed as f64 * rate) as i64;
                Timestamp(epoch.0.saturating_add(scaled))
            }
            Mode::Replay { current, .. } => *current,
        };
        if t > inner.floor {
            inner.floor = t;
        }
        inner.floor
    }

    /// Maps a wall-clock time onto the virtual timeline.
    pub fn to_virtual(&self, real: SystemTime) -> Timestamp {
        let inner = self.inner.lock().expect("clock lock poisoned");
        let real = Timestamp::from_system(real);
        match &inner.mode {
            Mode::Live {
                real_epoch,
                epoch,
                rate,
                ..
            } => {
                let delta = (real.0 - real_epoch.0) as f64 * rate;
                Timestamp(epoch.0.saturating_add(delta as i64))
            }
            // Replay has no meaningful wall-clock rate; map 1:1 around the start.
            Mode::Replay {
                start, real_epoch, ..
            } => Timestamp(start.0.saturating_add(real.0 - real_epoch.0)),
        }
    }

    /// Maps a virtual timestamp back to wall-clock time. Inverse of [`Clock::to_virtual`].
    pub fn to_real(&self, virt: Timestamp) -> SystemTime {
        let inner = self.inner.lock().expect("clock lock poisoned");
        match &inner.mode {
            Mode::Live {
                real_epoch,
                epoch,
                rate,
                ..
            } => {
                let delta = if *rate == 0.0 {
                    0
                } else {
                    ((virt.0 - epoch.0) as f64 / rate) as i64
                };
                Timestamp(real_epoch.0.saturating_add(delta)).to_system()
            }
            Mode::Replay {
                start, real_epoch, ..
            } => Timestamp(real_epoch.0.saturating_add(virt.0 - start.0)).to_system(),
        }
    }

    /// Advances replay time to `t`.
    ///
    /// ### Errors
    /// - [`PipelineError::InvalidTemporalOrder`] if `t` is behind the current
    ///   replay time — pipeline time never moves backwards.
    /// - [`PipelineError::NotReplaying`] on a live clock.
    pub fn advance_to(&self, t: Timestamp) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().expect("clock lock poisoned");
        match &mut inner.mode {
            Mode::Replay { current, .. } => {
                if t < *current {
                    return Err(PipelineError::InvalidTemporalOrder {
                        current: *current,
                        requested: t,
                    });
                }
                *current = t;
                if t > inner.floor {
                    inner.floor = t;
                }
                Ok(())
            }
            Mode::Live { .. } => Err(PipelineError::NotReplaying),
        }
    }

    /// True if this clock is driven by replay rather than the OS clock.
    pub fn is_replay(&self) -> bool {
        matches!(
            self.inner.lock().expect("clock lock poisoned").mode,
            Mode::Replay { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_now_is_monotonic() {
        let clock = Clock::live();
        let mut prev = clock.now();
        for _ in 0..100 {
            let t = clock.now();
            assert!(t >= prev, "now() went backwards: {t:?} < {prev:?}");
            prev = t;
        }
    }

    #[test]
    fn test_replay_now_tracks_advance() {
        let clock = Clock::replay(Timestamp::from_unix_millis(100));
        assert_eq!(clock.now(), Timestamp::from_unix_millis(100));

        clock.advance_to(Timestamp::from_unix_millis(250)).unwrap();
        assert_eq!(clock.now(), Timestamp::from_unix_millis(250));
    }

    #[test]
    fn test_replay_rejects_backward_advance() {
        let clock = Clock::replay(Timestamp::from_unix_millis(200));
        clock.advance_to(Timestamp::from_unix_millis(300)).unwrap();

        let err = clock
            .advance_to(Timestamp::from_unix_millis(150))
            .unwrap_err();
        assert_eq!(err.as_label(), "invalid_temporal_order");
        // Rejected advance must not disturb current time.
        assert_eq!(clock.now(), Timestamp::from_unix_millis(300));
    }

    #[test]
    fn test_replay_accepts_equal_advance() {
        // advance_to is idempotent at the current time; only regression fails.
        let clock = Clock::replay(Timestamp::from_unix_millis(500));
        clock.advance_to(Timestamp::from_unix_millis(500)).unwrap();
        assert_eq!(clock.now(), Timestamp::from_unix_millis(500));
    }

    #[test]
    fn test_live_clock_rejects_advance() {
        let clock = Clock::live();
        let err = clock.advance_to(Timestamp::from_unix_millis(1)).unwrap_err();
        assert_eq!(err.as_label(), "not_replaying");
    }

    #[test]
    fn test_affine_round_trip() {
        let epoch = Timestamp::from_unix_millis(1_000);
        let clock = Clock::live_scaled(epoch, 2.0);

        let real = SystemTime::now() + Duration::from_secs(10);
        let virt = clock.to_virtual(real);
        let back = clock.to_real(virt);

        let drift = match back.duration_since(real) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(drift < Duration::from_millis(1), "round trip drifted {drift:?}");
    }

    #[test]
    fn test_scaled_clock_runs_faster() {
        let epoch = Timestamp::EPOCH;
        let clock = Clock::live_scaled(epoch, 1000.0);
        std::thread::sleep(Duration::from_millis(5));
        let t = clock.now();
        // 5ms of wall time at 1000x is at least 5 virtual seconds.
        assert!(
            t >= epoch.saturating_add(Duration::from_secs(1)),
            "scaled clock too slow: {t:?}"
        );
    }

    #[test]
    fn test_timestamp_ordering_and_arithmetic() {
        let a = Timestamp::from_unix_millis(10);
        let b = a.saturating_add(Duration::from_millis(5));
        assert!(b > a);
        assert_eq!(b.saturating_duration_since(a), Duration::from_millis(5));
        assert_eq!(a.saturating_duration_since(b), Duration::ZERO);
        assert_eq!(Timestamp::MAX.saturating_add(Duration::from_secs(1)), Timestamp::MAX);
    }

    #[test]
    fn test_timestamp_system_round_trip() {
        let now = SystemTime::now();
        let ts = Timestamp::from_system(now);
        let back = ts.to_system();
        let drift = match back.duration_since(now) {
            Ok(d) => d,
            Err(e) => e.duration(),
        };
        assert!(drift < Duration::from_micros(1));
    }
}
