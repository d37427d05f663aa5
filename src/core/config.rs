//! # Global runtime configuration.
//!
//! Provides [`Config`], the settings shared by a pipeline and its
//! subpipelines, and [`FaultPolicy`], the receiver-failure escalation choice.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → no extra cap; parallelism is bounded by the tokio
//!   worker pool (which defaults to available hardware concurrency)
//! - `grace = 0s` → no waiting on shutdown, force teardown immediately

use std::time::Duration;

/// What to do when a receiver callback fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Fault the whole pipeline on the first receiver failure.
    #[default]
    Abort,
    /// Publish the failure and keep the pipeline running; only the failing
    /// delivery is lost.
    Continue,
}

/// Global configuration for a pipeline runtime.
///
/// ## Field semantics
/// - `grace`: maximum wait, applied separately to component stop and queue
///   drain, before stragglers are force-terminated and the pipeline faults
///   with `ShutdownTimeout`.
/// - `max_concurrent`: cap on simultaneously executing deliveries across the
///   whole pipeline tree (`0` = rely on the tokio worker pool alone).
/// - `bus_capacity`: diagnostic event ring buffer size (min 1; clamped).
/// - `fault_policy`: escalation for receiver callback failures.
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum time to wait for graceful shutdown phases.
    pub grace: Duration,

    /// Maximum number of deliveries executing simultaneously.
    ///
    /// - `0` = no semaphore; tokio's worker pool bounds parallelism
    /// - `n > 0` = at most `n` deliveries in flight across all receivers
    pub max_concurrent: usize,

    /// Capacity of the diagnostic event bus ring buffer.
    ///
    /// Slow subscribers lagging more than this many events observe `Lagged`
    /// and skip older items. Diagnostics only — never message payloads.
    pub bus_capacity: usize,

    /// Escalation policy for receiver callback failures.
    pub fault_policy: FaultPolicy,
}

impl Config {
    /// Returns the delivery concurrency cap as an `Option`.
    ///
    /// - `None` → no semaphore
    /// - `Some(n)` → at most `n` concurrent deliveries
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `max_concurrent = 0` (tokio worker pool bounds parallelism)
    /// - `bus_capacity = 1024`
    /// - `fault_policy = Abort`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            max_concurrent: 0,
            bus_capacity: 1024,
            fault_policy: FaultPolicy::Abort,
        }
    }
}
