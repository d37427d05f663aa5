//! # chronoflow
//!
//! **Chronoflow** is a temporal dataflow runtime for Rust.
//!
//! It provides primitives to build graphs of components connected by typed,
//! timestamped streams; to run those graphs against a live or scaled clock;
//! and to replay persisted streams deterministically. The crate is designed
//! as a building block for sensing/processing applications where *when* a
//! value was observed matters as much as the value itself.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Component   │   │  Component   │   │ ReplayDriver │
//!     │ (source #1)  │   │ (source #2)  │   │ (from store) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ post(v, t)       │ post(v, t)       │ advance_to(t); post(v, t)
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ Emitter<A>   │   │ Emitter<B>   │   │ Emitter<C>   │
//!     │ (monotonic,  │   │              │   │              │
//!     │  envelopes)  │   │              │   │              │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ per-connection DeliveryPolicy       │
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ queue + loop │   │ queue + loop │   │ queue + loop │
//!     │ (unlimited / │   │              │   │              │
//!     │  throttle /  │   │              │   │              │
//!     │  latest)     │   │              │   │              │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!       Receive<A>         Receive<B>         Receive<C>
//!      (ordered, one       on_message /       on_closed at
//!       at a time)         errors caught      final time
//!
//!  ┌──────────────────────────────────────────────────────────┐
//!  │  Pipeline: state machine, shared Clock, Scheduler cap,   │
//!  │  subpipelines, drain-then-stop teardown                  │
//!  │  Bus (broadcast) ──► SubscriberSet ──► Subscribe impls   │
//!  └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Pipeline::builder(..) ──► wire emitters/receivers/components ──► run()
//!
//! Constructed ──start()──► Running ──dispose()/completion──► Stopping
//!                                                              │
//!   ├─ subpipelines disposed first                             │
//!   ├─ components joined (within grace)                        │
//!   ├─ streams closed at the pipeline final time               │
//!   ├─ queues drained: queued messages are delivered, not      │
//!   │  discarded (only a grace overrun forces aborts)          │
//!   ▼                                                          ▼
//! Completed ◄──────────── no fault          fault ──────► Faulted
//! ```
//!
//! ## Features
//! | Area          | Description                                                        | Key types / traits                            |
//! |---------------|--------------------------------------------------------------------|-----------------------------------------------|
//! | **Streams**   | Typed, timestamped, strictly monotonic message channels.           | [`Emitter`], [`Envelope`], [`Message`]        |
//! | **Receivers** | Ordered, serialized, failure-isolated message sinks.               | [`Receive`], [`ReceiveFn`]                    |
//! | **Policies**  | Per-connection queueing: unlimited, throttled, latest-message.     | [`DeliveryPolicy`], [`DeliveryMode`]          |
//! | **Pipelines** | Lifecycle, wiring, subpipelines, drain-then-stop teardown.         | [`Pipeline`], [`PipelineBuilder`]             |
//! | **Time**      | Virtual pipeline time: live, scaled, or replay-driven.             | [`Clock`], [`Timestamp`]                      |
//! | **Replay**    | Deterministic re-execution from persisted streams.                 | [`ReplayDriver`], [`MemoryStore`]             |
//! | **Events**    | Runtime diagnostics fanned out to non-blocking subscribers.        | [`Event`], [`EventKind`], [`Subscribe`]       |
//! | **Errors**    | Typed errors for posting, receiving, components, and lifecycle.    | [`PipelineError`], [`PostError`]              |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use chronoflow::{
//!     ComponentError, ComponentFn, DeliveryPolicy, Envelope, Pipeline, ReceiveFn,
//!     ReceiverError, Timestamp,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::builder("demo").build();
//!
//!     let emitter = pipeline.create_emitter::<u64>("readings").await?;
//!
//!     let sink = ReceiveFn::arc("printer", |value: u64, env: Envelope| async move {
//!         println!("{value} @ {:?}", env.originating_time);
//!         Ok::<(), ReceiverError>(())
//!     });
//!     pipeline.connect(&emitter, sink, DeliveryPolicy::unlimited()).await?;
//!
//!     let source = ComponentFn::arc("counter", move |_ctx: CancellationToken| {
//!         let emitter = emitter.clone();
//!         async move {
//!             let mut last = Timestamp::EPOCH;
//!             for i in 1..=3u64 {
//!                 last = Timestamp::from_unix_millis(i as i64 * 100);
//!                 emitter.post(i, last).await.map_err(|e| ComponentError::Fail {
//!                     error: e.to_string(),
//!                 })?;
//!             }
//!             Ok(Some(last))
//!         }
//!     });
//!     pipeline.add_component(source).await?;
//!
//!     // Returns after the finite source completes and every queue drains.
//!     pipeline.run().await?;
//!     Ok(())
//! }
//! ```

mod clock;
mod core;
mod error;
mod events;
mod policies;
mod replay;
mod streams;
mod subscribers;

// ---- Public re-exports ----

pub use clock::{Clock, Timestamp};
pub use core::{
    Component, ComponentFn, ComponentRef, Config, FaultPolicy, Pipeline, PipelineBuilder,
    Scheduler, State,
};
pub use error::{ComponentError, PipelineError, PostError, ReceiverError};
pub use events::{Bus, Event, EventKind};
pub use policies::{DeliveryMode, DeliveryPolicy};
pub use replay::{MemoryReader, MemoryStore, ReplayDescriptor, ReplayDriver, ReplayRate, StoreReader};
pub use streams::{Emitter, Envelope, Message, Receive, ReceiveFn, ReceiverRef, StreamId};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
