//! Builder for constructing a [`Pipeline`] with explicit bindings.
//!
//! All capabilities are bound at construction time — clock, configuration,
//! diagnostic subscribers — so nothing in the runtime resolves through
//! ambient global state.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::core::config::Config;
use crate::core::pipeline::Pipeline;
use crate::core::scheduler::{FaultHandle, Scheduler};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for the root pipeline of a pipeline tree.
///
/// ## Example
/// ```no_run
/// use chronoflow::{Config, Pipeline};
///
/// # async fn demo() {
/// let pipeline = Pipeline::builder("app")
///     .with_config(Config::default())
///     .build();
/// # let _ = pipeline;
/// # }
/// ```
pub struct PipelineBuilder {
    name: String,
    cfg: Config,
    clock: Option<Arc<Clock>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl PipelineBuilder {
    /// Creates a builder with the default configuration and a live clock.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cfg: Config::default(),
            clock: None,
            subscribers: Vec::new(),
        }
    }

    /// Overrides the runtime configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Binds a clock. Pass [`Clock::replay`] to drive the pipeline from a
    /// persisted store instead of the OS clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Sets diagnostic event subscribers.
    ///
    /// Subscribers receive runtime events (lifecycle, failures, drops)
    /// through dedicated workers with bounded queues; a slow subscriber
    /// never blocks message flow.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the root pipeline.
    ///
    /// Must be called within a tokio runtime: subscriber workers and the bus
    /// listener are spawned here.
    pub fn build(self) -> Arc<Pipeline> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(Clock::live()));
        let scheduler = Scheduler::new(self.cfg.concurrency_limit());
        let token = CancellationToken::new();
        let fault = FaultHandle::new(token.clone(), self.cfg.fault_policy);

        spawn_subscriber_listener(&bus, &subs);

        Pipeline::new_root(self.name, self.cfg, clock, bus, subs, scheduler, token, fault)
    }
}

/// Forwards bus events to the subscriber set (fire-and-forget).
fn spawn_subscriber_listener(bus: &Bus, subs: &Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    let set = Arc::clone(subs);
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit_arc(Arc::new(ev)),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}
