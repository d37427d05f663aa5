//! # Delivery policy for emitter→receiver connections.
//!
//! [`DeliveryPolicy`] governs how the scheduler treats backlog on one specific
//! connection: queue bounds, throttling, drop semantics, and the inline
//! delivery optimization. Policies are attached at wiring time and are
//! immutable for the life of the connection.
//!
//! ## Modes
//! ```text
//! Unlimited           unbounded queue, every message delivered (default)
//! LatestMessage       1-slot queue, newer messages overwrite undelivered older ones
//! Throttle { n }      bounded queue of n, a full queue blocks the producer's post()
//! ```
//!
//! Orthogonal to the mode:
//! - `maximum_latency`: a queued-but-undelivered message older than this is
//!   dropped at dequeue instead of delivered (a policy outcome, not an error).
//! - `attempt_synchronous`: when the receiver is idle and its queue empty,
//!   deliver inline on the posting task, skipping a queue hop.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use chronoflow::{DeliveryPolicy, DeliveryMode};
//!
//! let policy = DeliveryPolicy::throttled(8).with_maximum_latency(Duration::from_millis(100));
//! assert_eq!(policy.queue_bound(), Some(8));
//! assert!(policy.maximum_latency.is_some());
//!
//! let latest = DeliveryPolicy::latest_message();
//! assert_eq!(latest.queue_bound(), Some(1));
//! ```

use std::time::Duration;

/// Queueing discipline for one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Unbounded queue; guaranteed delivery at the cost of memory under lag.
    Unlimited,
    /// Keep only the newest undelivered message; older ones are dropped.
    LatestMessage,
    /// Bounded queue; a full queue applies backpressure to the producer.
    Throttle {
        /// Maximum number of undelivered messages before `post` blocks.
        max_queue_size: usize,
    },
}

/// Per-connection configuration of queueing and backpressure behavior.
///
/// The default policy is [`DeliveryMode::Unlimited`] with no latency bound and
/// no inline delivery: every message is delivered, in order, eventually.
/// Explicit policies trade latency/memory for guaranteed delivery.
#[derive(Clone, Copy, Debug)]
pub struct DeliveryPolicy {
    /// Queueing discipline.
    pub mode: DeliveryMode,
    /// Maximum permissible age of a queued message (by creation time) before
    /// it is dropped instead of delivered. `None` = deliver regardless of age.
    pub maximum_latency: Option<Duration>,
    /// Try zero-hop inline delivery on the posting task when the receiver is idle.
    pub attempt_synchronous: bool,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl DeliveryPolicy {
    /// Unbounded queue, deliver everything.
    pub fn unlimited() -> Self {
        Self {
            mode: DeliveryMode::Unlimited,
            maximum_latency: None,
            attempt_synchronous: false,
        }
    }

    /// Keep only the newest undelivered message.
    pub fn latest_message() -> Self {
        Self {
            mode: DeliveryMode::LatestMessage,
            maximum_latency: None,
            attempt_synchronous: false,
        }
    }

    /// Bounded queue of `max_queue_size`; a full queue blocks the producer.
    ///
    /// `max_queue_size` is clamped to a minimum of 1.
    pub fn throttled(max_queue_size: usize) -> Self {
        Self {
            mode: DeliveryMode::Throttle {
                max_queue_size: max_queue_size.max(1),
            },
            maximum_latency: None,
            attempt_synchronous: false,
        }
    }

    /// Returns a copy with a maximum queued-message age.
    pub fn with_maximum_latency(mut self, latency: Duration) -> Self {
        self.maximum_latency = Some(latency);
        self
    }

    /// Returns a copy with the inline delivery optimization enabled.
    pub fn with_attempt_synchronous(mut self) -> Self {
        self.attempt_synchronous = true;
        self
    }

    /// The hard bound on undelivered messages, if any.
    ///
    /// - `Unlimited` → `None`
    /// - `LatestMessage` → `Some(1)`
    /// - `Throttle { n }` → `Some(n)`
    pub fn queue_bound(&self) -> Option<usize> {
        match self.mode {
            DeliveryMode::Unlimited => None,
            DeliveryMode::LatestMessage => Some(1),
            DeliveryMode::Throttle { max_queue_size } => Some(max_queue_size),
        }
    }

    /// True if this policy is allowed to discard messages.
    pub fn may_drop(&self) -> bool {
        self.maximum_latency.is_some() || matches!(self.mode, DeliveryMode::LatestMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unlimited_lossless() {
        let policy = DeliveryPolicy::default();
        assert_eq!(policy.mode, DeliveryMode::Unlimited);
        assert_eq!(policy.queue_bound(), None);
        assert!(!policy.may_drop());
        assert!(!policy.attempt_synchronous);
    }

    #[test]
    fn test_latest_message_bound_is_one() {
        let policy = DeliveryPolicy::latest_message();
        assert_eq!(policy.queue_bound(), Some(1));
        assert!(policy.may_drop());
    }

    #[test]
    fn test_throttled_clamps_zero_to_one() {
        let policy = DeliveryPolicy::throttled(0);
        assert_eq!(policy.queue_bound(), Some(1));
    }

    #[test]
    fn test_maximum_latency_makes_policy_lossy() {
        let policy =
            DeliveryPolicy::unlimited().with_maximum_latency(Duration::from_millis(50));
        assert!(policy.may_drop());
        assert_eq!(policy.queue_bound(), None);
    }

    #[test]
    fn test_builders_compose() {
        let policy = DeliveryPolicy::throttled(4)
            .with_attempt_synchronous()
            .with_maximum_latency(Duration::from_millis(10));
        assert!(policy.attempt_synchronous);
        assert!(policy.may_drop());
        assert_eq!(policy.queue_bound(), Some(4));
    }
}
