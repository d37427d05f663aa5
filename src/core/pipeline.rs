//! # Pipeline: lifecycle, wiring, and coordinated teardown.
//!
//! ```text
//! ┌─────────────────────────────── Pipeline ───────────────────────────────┐
//! │ state: Constructed → Running → Stopping → Completed | Faulted          │
//! │                                                                        │
//! │  Component ──run(token)──▶ Emitter ──post──▶ queue ──▶ delivery loop   │
//! │     │                         │                             │          │
//! │     └── final time ───────────┴── close(final_time) ◀── drain/join ────┘
//! │                                                                        │
//! │  Subpipelines share the clock, bus, and scheduler; each owns a child   │
//! │  cancellation token and an independent fault slot.                     │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Wiring (`create_emitter`, `connect`, `add_component`) is only legal in
//!   `Constructed`. After `start`, the graph is frozen.
//! - Exactly one caller wins the `Stopping` transition and performs teardown;
//!   everyone else waits for a terminal state. The winner receives the fault,
//!   if any.
//! - Teardown order: subpipelines, then components (within grace), then
//!   stream closure at the pipeline's final time, then queue drain (within
//!   grace). Queued messages are delivered, not discarded; only a grace
//!   overrun forces aborts.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, Timestamp};
use crate::core::builder::PipelineBuilder;
use crate::core::component::ComponentRef;
use crate::core::config::Config;
use crate::core::scheduler::{FaultHandle, Scheduler, WorkerHandle};
use crate::core::shutdown;
use crate::core::state::State;
use crate::error::{ComponentError, PipelineError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::DeliveryPolicy;
use crate::streams::{Connection, Emitter, EmitterControl, ReceiverCore, ReceiverRef, StreamId, build_queue};
use crate::subscribers::SubscriberSet;

/// A temporal dataflow graph plus the machinery that runs it.
///
/// Created through [`Pipeline::builder`]. Wire streams and components while
/// `Constructed`, then [`run`](Pipeline::run) to completion or
/// [`start`](Pipeline::start) and later [`dispose`](Pipeline::dispose).
pub struct Pipeline {
    name: Arc<str>,
    cfg: Config,
    clock: Arc<Clock>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    scheduler: Arc<Scheduler>,
    token: CancellationToken,
    fault: FaultHandle,
    state_tx: watch::Sender<State>,
    next_stream_id: Arc<AtomicU64>,
    components: tokio::sync::Mutex<Vec<ComponentRef>>,
    component_joins: tokio::sync::Mutex<Vec<(Arc<str>, JoinHandle<()>)>>,
    emitters: tokio::sync::Mutex<Vec<Arc<dyn EmitterControl>>>,
    workers: tokio::sync::Mutex<Vec<WorkerHandle>>,
    children: tokio::sync::Mutex<Vec<Arc<Pipeline>>>,
    final_time: std::sync::Mutex<Option<Timestamp>>,
    is_root: bool,
}

impl Pipeline {
    /// Starts building a root pipeline.
    pub fn builder(name: impl Into<String>) -> PipelineBuilder {
        PipelineBuilder::new(name)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_root(
        name: String,
        cfg: Config,
        clock: Arc<Clock>,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        scheduler: Arc<Scheduler>,
        token: CancellationToken,
        fault: FaultHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name.as_str()),
            cfg,
            clock,
            bus,
            subs,
            scheduler,
            token,
            fault,
            state_tx: watch::channel(State::Constructed).0,
            next_stream_id: Arc::new(AtomicU64::new(1)),
            components: tokio::sync::Mutex::new(Vec::new()),
            component_joins: tokio::sync::Mutex::new(Vec::new()),
            emitters: tokio::sync::Mutex::new(Vec::new()),
            workers: tokio::sync::Mutex::new(Vec::new()),
            children: tokio::sync::Mutex::new(Vec::new()),
            final_time: std::sync::Mutex::new(None),
            is_root: true,
        })
    }

    /// Pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        *self.state_tx.borrow()
    }

    /// The clock all streams and components of this tree share.
    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// The diagnostic event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// The scheduler shared by this pipeline tree.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Creates a new typed stream owned by this pipeline.
    ///
    /// ### Errors
    /// [`PipelineError::InvalidState`] unless the pipeline is `Constructed`.
    pub async fn create_emitter<T: Clone + Send + 'static>(
        &self,
        name: impl Into<Arc<str>>,
    ) -> Result<Emitter<T>, PipelineError> {
        self.require(State::Constructed)?;
        let id = StreamId(self.next_stream_id.fetch_add(1, AtomicOrdering::Relaxed));
        let emitter = Emitter::new(id, name.into(), Arc::clone(&self.clock));
        self.emitters.lock().await.push(emitter.control());
        Ok(emitter)
    }

    /// Wires `handler` as a receiver of `emitter` under `policy`.
    ///
    /// Each connection gets its own queue and delivery loop; a receiver
    /// observes its stream's messages in originating-time order, one at a
    /// time. The emitter may belong to this pipeline or to an ancestor.
    ///
    /// ### Errors
    /// [`PipelineError::InvalidState`] unless the pipeline is `Constructed`.
    pub async fn connect<T: Clone + Send + 'static>(
        &self,
        emitter: &Emitter<T>,
        handler: ReceiverRef<T>,
        policy: DeliveryPolicy,
    ) -> Result<(), PipelineError> {
        self.require(State::Constructed)?;
        let (tx, rx) = build_queue(&policy);
        let core = ReceiverCore::new(
            Arc::from(emitter.name()),
            handler,
            policy,
            self.bus.clone(),
            Arc::clone(&self.clock),
            self.fault.clone(),
        );
        let worker = self.scheduler.spawn_delivery_loop(Arc::clone(&core), rx);
        self.workers.lock().await.push(worker);
        emitter
            .attach(Connection { core, tx })
            .await
            .map_err(|_| self.invalid_state(State::Constructed))
    }

    /// Registers a source/processing component, started on [`start`](Pipeline::start).
    ///
    /// ### Errors
    /// [`PipelineError::InvalidState`] unless the pipeline is `Constructed`.
    pub async fn add_component(&self, component: ComponentRef) -> Result<(), PipelineError> {
        self.require(State::Constructed)?;
        self.components.lock().await.push(component);
        Ok(())
    }

    /// Creates a subpipeline: an independently disposable subgraph sharing
    /// this tree's clock, bus, and scheduler.
    ///
    /// The child's cancellation token is derived from this pipeline's, so
    /// disposing the parent tears the child down first. The child keeps its
    /// own fault slot: its failures do not abort this pipeline.
    ///
    /// ### Errors
    /// [`PipelineError::InvalidState`] once this pipeline is stopping or stopped.
    pub async fn create_subpipeline(
        self: &Arc<Self>,
        name: impl Into<String>,
    ) -> Result<Arc<Pipeline>, PipelineError> {
        let current = self.state();
        if current != State::Constructed && current != State::Running {
            return Err(self.invalid_state(State::Running));
        }
        let token = self.token.child_token();
        let fault = FaultHandle::new(token.clone(), self.cfg.fault_policy);
        let name = name.into();
        let child = Arc::new(Self {
            name: Arc::from(name.as_str()),
            cfg: self.cfg.clone(),
            clock: Arc::clone(&self.clock),
            bus: self.bus.clone(),
            subs: Arc::clone(&self.subs),
            scheduler: Arc::clone(&self.scheduler),
            token,
            fault,
            state_tx: watch::channel(State::Constructed).0,
            next_stream_id: Arc::clone(&self.next_stream_id),
            components: tokio::sync::Mutex::new(Vec::new()),
            component_joins: tokio::sync::Mutex::new(Vec::new()),
            emitters: tokio::sync::Mutex::new(Vec::new()),
            workers: tokio::sync::Mutex::new(Vec::new()),
            children: tokio::sync::Mutex::new(Vec::new()),
            final_time: std::sync::Mutex::new(None),
            is_root: false,
        });
        self.children.lock().await.push(Arc::clone(&child));
        Ok(child)
    }

    /// Transitions to `Running` and launches all registered components.
    ///
    /// Returns as soon as the components are spawned. Use
    /// [`run`](Pipeline::run) to also wait for completion and drain, or
    /// [`dispose`](Pipeline::dispose) to stop an open-ended pipeline.
    ///
    /// ### Errors
    /// [`PipelineError::InvalidState`] unless the pipeline is `Constructed`.
    pub async fn start(self: &Arc<Self>) -> Result<(), PipelineError> {
        if self.transition(&[State::Constructed], State::Running).is_none() {
            return Err(self.invalid_state(State::Constructed));
        }
        let kind = if self.is_root {
            EventKind::PipelineRun
        } else {
            EventKind::SubpipelineStarted
        };
        self.bus
            .publish(Event::now(kind).with_pipeline(self.name.clone()));

        let components: Vec<ComponentRef> = self.components.lock().await.drain(..).collect();
        let mut joins = self.component_joins.lock().await;
        for component in components {
            joins.push(self.spawn_component(component));
        }
        Ok(())
    }

    /// Runs the pipeline to completion: starts it, waits for every component
    /// to finish, then performs the full drain and teardown.
    ///
    /// For finite sources this returns once all posted messages have been
    /// delivered and all streams closed. A fault cancels the components and
    /// surfaces here after teardown.
    ///
    /// ### Errors
    /// The first fault raised anywhere in this pipeline, or
    /// [`PipelineError::ShutdownTimeout`] if teardown overran the grace period.
    pub async fn run(self: &Arc<Self>) -> Result<(), PipelineError> {
        self.start().await?;
        self.join_components_unbounded().await;
        self.shutdown_internal().await
    }

    /// Runs until an OS shutdown signal (or a fault) arrives, then disposes.
    pub async fn run_until_shutdown(self: &Arc<Self>) -> Result<(), PipelineError> {
        self.start().await?;
        tokio::select! {
            _ = shutdown::wait_for_shutdown_signal() => {}
            _ = self.token.cancelled() => {}
        }
        self.dispose().await
    }

    /// Stops the pipeline: cancels components, then drains and tears down.
    ///
    /// Idempotent; concurrent callers wait for the teardown performed by the
    /// first. Safe to call from `Constructed` (tears down an unstarted graph).
    ///
    /// ### Errors
    /// Same surface as [`run`](Pipeline::run).
    pub async fn dispose(self: &Arc<Self>) -> Result<(), PipelineError> {
        self.token.cancel();
        self.shutdown_internal().await
    }

    /// Waits for a terminal state and returns it.
    pub async fn completed(&self) -> State {
        let mut rx = self.state_tx.subscribe();
        loop {
            let s = *rx.borrow_and_update();
            if s.is_terminal() {
                return s;
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    // ---- internals ---------------------------------------------------------

    fn spawn_component(self: &Arc<Self>, component: ComponentRef) -> (Arc<str>, JoinHandle<()>) {
        let name: Arc<str> = Arc::from(component.name());
        let actor_name = name.clone();
        let token = self.token.child_token();
        let this = Arc::clone(self);
        let join = tokio::spawn(async move {
            let outcome = std::panic::AssertUnwindSafe(component.run(token))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic_err| {
                    let info = if let Some(m) = panic_err.downcast_ref::<&'static str>() {
                        (*m).to_string()
                    } else if let Some(m) = panic_err.downcast_ref::<String>() {
                        m.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    Err(ComponentError::Fail {
                        error: format!("panic: {info}"),
                    })
                });
            this.on_component_done(actor_name, outcome);
        });
        (name, join)
    }

    fn on_component_done(&self, name: Arc<str>, outcome: Result<Option<Timestamp>, ComponentError>) {
        match outcome {
            Ok(done_at) => {
                if let Some(t) = done_at {
                    self.note_final_time(t);
                }
                let mut ev = Event::now(EventKind::ComponentCompleted)
                    .with_pipeline(self.name.clone())
                    .with_component(name);
                if let Some(t) = done_at {
                    ev = ev.with_time(t);
                }
                self.bus.publish(ev);
            }
            Err(e) if e.is_graceful() => {
                self.bus.publish(
                    Event::now(EventKind::ComponentCompleted)
                        .with_pipeline(self.name.clone())
                        .with_component(name),
                );
            }
            Err(e) => {
                self.bus.publish(
                    Event::now(EventKind::ComponentFailed)
                        .with_pipeline(self.name.clone())
                        .with_component(name.clone())
                        .with_error(e.to_string()),
                );
                let err = PipelineError::ComponentFailed {
                    component: name.to_string(),
                    error: e.to_string(),
                };
                if matches!(e, ComponentError::Fatal { .. }) {
                    self.fault.raise(err);
                } else {
                    self.fault.report(err);
                }
            }
        }
    }

    /// The final originating time of the pipeline: the maximum reported by
    /// its finite source components.
    fn note_final_time(&self, t: Timestamp) {
        let mut slot = self.final_time.lock().expect("final time lock poisoned");
        match *slot {
            Some(cur) if cur >= t => {}
            _ => *slot = Some(t),
        }
    }

    /// Awaits every component actor, without a deadline. Components exit on
    /// their own (finite sources) or when the token is cancelled.
    async fn join_components_unbounded(&self) {
        loop {
            let next = self.component_joins.lock().await.pop();
            match next {
                Some((_, join)) => {
                    let _ = join.await;
                }
                None => break,
            }
        }
    }

    async fn shutdown_internal(self: &Arc<Self>) -> Result<(), PipelineError> {
        if self
            .transition(&[State::Constructed, State::Running], State::Stopping)
            .is_none()
        {
            // Someone else is tearing down (or already has); they hold the fault.
            let _ = self.completed().await;
            return Ok(());
        }
        self.bus.publish(
            Event::now(EventKind::PipelineStopping).with_pipeline(self.name.clone()),
        );

        // Children first, so their streams close before ours do.
        let children: Vec<Arc<Pipeline>> = self.children.lock().await.drain(..).collect();
        for child in children {
            // A child's fault stays in the child; its terminal event tells the
            // story. Boxed: dispose of a child recurses into this function.
            let _ = Box::pin(child.dispose()).await;
        }

        self.token.cancel();
        let mut pending: Vec<String> = Vec::new();

        let deadline = Instant::now() + self.cfg.grace;
        let joins: Vec<(Arc<str>, JoinHandle<()>)> =
            self.component_joins.lock().await.drain(..).collect();
        for (name, mut join) in joins {
            if timeout_at(deadline, &mut join).await.is_err() {
                join.abort();
                pending.push(name.to_string());
            }
        }

        // Close every stream at the pipeline's final time. Each connection
        // receives a close marker behind its queued messages, so the drain
        // below delivers everything already posted.
        let final_time = {
            let slot = self.final_time.lock().expect("final time lock poisoned");
            slot.unwrap_or_else(|| self.clock.now())
        };
        let deadline = Instant::now() + self.cfg.grace;
        let emitters: Vec<Arc<dyn EmitterControl>> = self.emitters.lock().await.drain(..).collect();
        for control in emitters {
            control.close(final_time, deadline).await;
        }

        let workers: Vec<WorkerHandle> = self.workers.lock().await.drain(..).collect();
        for mut worker in workers {
            if timeout_at(deadline, &mut worker.join).await.is_err() {
                worker.join.abort();
                pending.push(worker.name.to_string());
            }
        }

        if pending.is_empty() {
            self.bus.publish(
                Event::now(EventKind::DrainCompleted)
                    .with_pipeline(self.name.clone())
                    .with_time(final_time),
            );
        } else {
            self.bus.publish(
                Event::now(EventKind::GraceExceeded)
                    .with_pipeline(self.name.clone())
                    .with_count(pending.len() as u64),
            );
            self.fault.raise(PipelineError::ShutdownTimeout {
                grace: self.cfg.grace,
                pending,
            });
        }

        let fault = self.fault.take();
        let (terminal, kind) = match (&fault, self.is_root) {
            (None, true) => (State::Completed, EventKind::PipelineCompleted),
            (Some(_), true) => (State::Faulted, EventKind::PipelineFaulted),
            (None, false) => (State::Completed, EventKind::SubpipelineDisposed),
            (Some(_), false) => (State::Faulted, EventKind::SubpipelineDisposed),
        };
        self.transition(&[State::Stopping], terminal);
        let mut ev = Event::now(kind).with_pipeline(self.name.clone());
        if let Some(e) = &fault {
            ev = ev.with_error(e.to_string());
        }
        self.bus.publish(ev);

        if self.is_root {
            self.subs.shutdown(self.cfg.grace).await;
        }

        match fault {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Atomically moves to `to` if the current state is in `allowed`,
    /// returning the previous state on success.
    fn transition(&self, allowed: &[State], to: State) -> Option<State> {
        let mut prev = None;
        self.state_tx.send_modify(|s| {
            if allowed.contains(s) {
                prev = Some(*s);
                *s = to;
            }
        });
        prev
    }

    fn require(&self, expected: State) -> Result<(), PipelineError> {
        if self.state() == expected {
            Ok(())
        } else {
            Err(self.invalid_state(expected))
        }
    }

    fn invalid_state(&self, expected: State) -> PipelineError {
        PipelineError::InvalidState {
            pipeline: self.name.to_string(),
            expected,
            actual: self.state(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use crate::clock::Timestamp;
    use crate::core::component::ComponentFn;
    use crate::core::config::{Config, FaultPolicy};
    use crate::core::state::State;
    use crate::error::{ComponentError, PipelineError, PostError, ReceiverError};
    use crate::events::EventKind;
    use crate::policies::DeliveryPolicy;
    use crate::streams::{Emitter, ReceiveFn};

    use super::Pipeline;

    type SourceFuture =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<Timestamp>, ComponentError>> + Send>>;

    fn t(ms: i64) -> Timestamp {
        Timestamp::from_unix_millis(ms)
    }

    fn collector(seen: Arc<Mutex<Vec<u64>>>) -> crate::streams::ReceiverRef<u64> {
        ReceiveFn::arc("collector", move |value: u64, _env: crate::streams::Envelope| {
            let seen = seen.clone();
            async move {
                seen.lock().unwrap().push(value);
                Ok::<(), ReceiverError>(())
            }
        })
    }

    /// Posts `1..=count` at strictly increasing times, reporting the last
    /// originating time as the stream's final time.
    fn posting_source(emitter: Emitter<u64>, count: u64) -> crate::core::component::ComponentRef {
        ComponentFn::arc("source", move |_ctx: CancellationToken| -> SourceFuture {
            let emitter = emitter.clone();
            Box::pin(async move {
                let mut last = t(0);
                for i in 1..=count {
                    last = t(i as i64 * 10);
                    emitter
                        .post(i, last)
                        .await
                        .map_err(|e| ComponentError::Fail { error: e.to_string() })?;
                }
                Ok(Some(last))
            })
        })
    }

    #[tokio::test]
    async fn delivers_in_originating_time_order() {
        let pipeline = Pipeline::builder("order").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline
            .connect(&emitter, collector(seen.clone()), DeliveryPolicy::unlimited())
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 50))
            .await
            .unwrap();

        pipeline.run().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (1..=50).collect::<Vec<u64>>());
        assert_eq!(pipeline.state(), State::Completed);
    }

    #[tokio::test]
    async fn rejects_non_monotonic_posts() {
        let pipeline = Pipeline::builder("mono").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();

        emitter.post(1, t(10)).await.unwrap();
        let equal = emitter.post(2, t(10)).await;
        assert!(matches!(equal, Err(PostError::NonMonotonicTime { .. })));
        let behind = emitter.post(3, t(5)).await;
        assert!(matches!(behind, Err(PostError::NonMonotonicTime { .. })));

        // Rejected posts must not consume sequence numbers.
        assert_eq!(emitter.last_envelope().await.unwrap().sequence_id, 1);
        pipeline.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn latest_message_drops_stale_keeps_newest() {
        let pipeline = Pipeline::builder("latest").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ReceiveFn::arc("slow", move |value: u64, _env| {
                let seen = seen.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    seen.lock().unwrap().push(value);
                    Ok::<(), ReceiverError>(())
                }
            })
        };
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::latest_message())
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 50))
            .await
            .unwrap();

        pipeline.run().await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen.last().unwrap(), 50, "drain must deliver the newest value");
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "order preserved: {seen:?}");
    }

    #[tokio::test]
    async fn drains_queued_messages_on_stop() {
        let pipeline = Pipeline::builder("drain").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ReceiveFn::arc("slowish", move |value: u64, _env| {
                let seen = seen.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    seen.lock().unwrap().push(value);
                    Ok::<(), ReceiverError>(())
                }
            })
        };
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::unlimited())
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 100))
            .await
            .unwrap();

        // run() returns only after the queues drained past the close marker.
        pipeline.run().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn throttle_backpressure_delivers_everything() {
        let pipeline = Pipeline::builder("throttle").build();
        let mut events = pipeline.bus().subscribe();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ReceiveFn::arc("slow", move |value: u64, _env: crate::streams::Envelope| {
                let seen = seen.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    seen.lock().unwrap().push(value);
                    Ok::<(), ReceiverError>(())
                }
            })
        };
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::throttled(2))
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 20))
            .await
            .unwrap();

        pipeline.run().await.unwrap();

        // Backpressure slows the producer but never discards.
        assert_eq!(*seen.lock().unwrap(), (1..=20).collect::<Vec<u64>>());
        let mut throttled = false;
        while let Ok(ev) = events.try_recv() {
            throttled |= ev.kind == EventKind::ThrottleEngaged;
        }
        assert!(throttled, "a full bounded queue must be reported");
    }

    #[tokio::test]
    async fn stale_messages_are_dropped_under_maximum_latency() {
        let pipeline = Pipeline::builder("latency").build();
        let mut events = pipeline.bus().subscribe();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ReceiveFn::arc("slow", move |value: u64, _env: crate::streams::Envelope| {
                let seen = seen.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    seen.lock().unwrap().push(value);
                    Ok::<(), ReceiverError>(())
                }
            })
        };
        pipeline
            .connect(
                &emitter,
                sink,
                DeliveryPolicy::unlimited().with_maximum_latency(Duration::from_millis(5)),
            )
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 5))
            .await
            .unwrap();

        pipeline.run().await.unwrap();

        // Messages queued behind the 30ms handler age past the 5ms bound.
        assert!(seen.lock().unwrap().len() < 5);
        let mut dropped = false;
        while let Ok(ev) = events.try_recv() {
            dropped |= ev.kind == EventKind::MessageDropped;
        }
        assert!(dropped, "latency drops must be reported");
    }

    #[tokio::test]
    async fn inline_delivery_preserves_order() {
        let pipeline = Pipeline::builder("inline").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        pipeline
            .connect(
                &emitter,
                collector(seen.clone()),
                DeliveryPolicy::unlimited().with_attempt_synchronous(),
            )
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 50))
            .await
            .unwrap();

        pipeline.run().await.unwrap();
        assert_eq!(*seen.lock().unwrap(), (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn wiring_after_start_is_rejected() {
        let pipeline = Pipeline::builder("frozen").build();
        pipeline.start().await.unwrap();

        let err = pipeline.create_emitter::<u64>("late").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidState { expected: State::Constructed, actual: State::Running, .. }
        ));
        pipeline.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn receiver_failure_aborts_under_default_policy() {
        let pipeline = Pipeline::builder("abort").build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let sink = ReceiveFn::arc("fragile", |_value: u64, _env: crate::streams::Envelope| async {
            Err::<(), ReceiverError>(ReceiverError::Fail { error: "bad reading".into() })
        });
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::unlimited())
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 1))
            .await
            .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::ReceiverFailed { .. }), "{err}");
        assert_eq!(pipeline.state(), State::Faulted);
    }

    #[tokio::test]
    async fn receiver_failure_keeps_flowing_under_continue_policy() {
        let cfg = Config {
            fault_policy: FaultPolicy::Continue,
            ..Config::default()
        };
        let pipeline = Pipeline::builder("tolerant").with_config(cfg).build();
        let mut events = pipeline.bus().subscribe();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = seen.clone();
            ReceiveFn::arc("picky", move |value: u64, _env: crate::streams::Envelope| {
                let seen = seen.clone();
                async move {
                    if value == 2 {
                        return Err(ReceiverError::Fail { error: "bad reading".into() });
                    }
                    seen.lock().unwrap().push(value);
                    Ok(())
                }
            })
        };
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::unlimited())
            .await
            .unwrap();
        pipeline
            .add_component(posting_source(emitter, 4))
            .await
            .unwrap();

        pipeline.run().await.unwrap();

        // The bad reading is skipped; the stream outlives the failure.
        assert_eq!(*seen.lock().unwrap(), vec![1, 3, 4]);
        assert_eq!(pipeline.state(), State::Completed);
        let mut reported = false;
        while let Ok(ev) = events.try_recv() {
            reported |= ev.kind == EventKind::ReceiverFailed;
        }
        assert!(reported, "a failed callback is still reported");
    }

    #[tokio::test]
    async fn subpipeline_fault_is_isolated_from_parent() {
        let parent = Pipeline::builder("parent").build();
        let child = parent.create_subpipeline("child").await.unwrap();
        child
            .add_component(ComponentFn::arc("boom", |_ctx: CancellationToken| async {
                Err::<Option<Timestamp>, ComponentError>(ComponentError::Fatal {
                    error: "hardware gone".into(),
                })
            }))
            .await
            .unwrap();

        let err = child.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::ComponentFailed { .. }));
        assert_eq!(child.state(), State::Faulted);

        // The parent keeps running; only its own dispose ends it, cleanly.
        assert_eq!(parent.state(), State::Constructed);
        parent.dispose().await.unwrap();
        assert_eq!(parent.state(), State::Completed);
    }

    #[tokio::test]
    async fn disposing_one_subpipeline_leaves_siblings_flowing() {
        let parent = Pipeline::builder("parent").build();
        let a = parent.create_subpipeline("a").await.unwrap();
        let b = parent.create_subpipeline("b").await.unwrap();

        // A: open-ended ticker that exits on cancellation.
        let a_emitter = a.create_emitter::<u64>("a-values").await.unwrap();
        let a_seen = Arc::new(Mutex::new(Vec::new()));
        a.connect(&a_emitter, collector(a_seen.clone()), DeliveryPolicy::unlimited())
            .await
            .unwrap();
        a.add_component(ComponentFn::arc(
            "ticker",
            move |ctx: CancellationToken| -> SourceFuture {
                let emitter = a_emitter.clone();
                Box::pin(async move {
                    let mut i = 0i64;
                    let mut last = t(0);
                    while !ctx.is_cancelled() {
                        i += 1;
                        last = t(i * 10);
                        if emitter.post(i as u64, last).await.is_err() {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    Ok(Some(last))
                })
            },
        ))
        .await
        .unwrap();

        // B: finite paced source.
        let b_emitter = b.create_emitter::<u64>("b-values").await.unwrap();
        let b_seen = Arc::new(Mutex::new(Vec::new()));
        b.connect(&b_emitter, collector(b_seen.clone()), DeliveryPolicy::unlimited())
            .await
            .unwrap();
        b.add_component(ComponentFn::arc(
            "paced",
            move |_ctx: CancellationToken| -> SourceFuture {
                let emitter = b_emitter.clone();
                Box::pin(async move {
                    let mut last = t(0);
                    for i in 1..=100u64 {
                        last = t(i as i64 * 10);
                        emitter
                            .post(i, last)
                            .await
                            .map_err(|e| ComponentError::Fail { error: e.to_string() })?;
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                    Ok(Some(last))
                })
            },
        ))
        .await
        .unwrap();

        a.start().await.unwrap();
        let b_run = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.run().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.dispose().await.unwrap();
        assert_eq!(a.state(), State::Completed);

        b_run.await.unwrap().unwrap();
        let b_seen = b_seen.lock().unwrap();
        assert_eq!(*b_seen, (1..=100).collect::<Vec<u64>>());
        assert!(a_seen.lock().unwrap().windows(2).all(|w| w[0] < w[1]));
        parent.dispose().await.unwrap();
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let pipeline = Pipeline::builder("twice").build();
        pipeline.start().await.unwrap();
        pipeline.dispose().await.unwrap();
        pipeline.dispose().await.unwrap();
        assert_eq!(pipeline.state(), State::Completed);
    }

    #[tokio::test]
    async fn shutdown_grace_overrun_faults_with_pending_names() {
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..Config::default()
        };
        let pipeline = Pipeline::builder("stuck").with_config(cfg).build();
        pipeline
            .add_component(ComponentFn::arc("sleeper", |_ctx: CancellationToken| async {
                // Ignores cancellation on purpose.
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<Option<Timestamp>, ComponentError>(None)
            }))
            .await
            .unwrap();
        pipeline.start().await.unwrap();

        let err = pipeline.dispose().await.unwrap_err();
        match err {
            PipelineError::ShutdownTimeout { pending, .. } => {
                assert_eq!(pending, vec!["sleeper".to_string()]);
            }
            other => panic!("expected ShutdownTimeout, got {other}"),
        }
        assert_eq!(pipeline.state(), State::Faulted);
    }

    #[tokio::test]
    async fn stalled_throttle_receiver_cannot_wedge_dispose() {
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..Config::default()
        };
        let pipeline = Pipeline::builder("wedged").with_config(cfg).build();
        let emitter = pipeline.create_emitter::<u64>("values").await.unwrap();
        let sink = ReceiveFn::arc("stalled", |_value: u64, _env: crate::streams::Envelope| async {
            futures::future::pending::<()>().await;
            Ok::<(), ReceiverError>(())
        });
        pipeline
            .connect(&emitter, sink, DeliveryPolicy::throttled(1))
            .await
            .unwrap();
        pipeline.start().await.unwrap();

        // First message wedges the receiver, second fills the queue; the
        // close marker has nowhere to go.
        emitter.post(1, t(10)).await.unwrap();
        emitter.post(2, t(20)).await.unwrap();

        let disposed = tokio::time::timeout(Duration::from_secs(2), pipeline.dispose()).await;
        let err = disposed
            .expect("dispose must finish despite a full queue")
            .unwrap_err();
        match err {
            PipelineError::ShutdownTimeout { pending, .. } => {
                assert_eq!(pending, vec!["stalled".to_string()]);
            }
            other => panic!("expected ShutdownTimeout, got {other}"),
        }
        assert_eq!(pipeline.state(), State::Faulted);
    }
}
