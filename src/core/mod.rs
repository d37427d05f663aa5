//! Pipeline lifecycle, scheduling, and configuration.
//!
//! - [`Pipeline`] — the dataflow graph and its state machine.
//! - [`PipelineBuilder`] — construction-time bindings (clock, config, subscribers).
//! - [`Component`] — user-supplied sources and processors.
//! - [`Scheduler`] — per-connection delivery loops under a global concurrency cap.
//! - [`Config`] / [`FaultPolicy`] — runtime tuning and failure escalation.

mod builder;
mod component;
mod config;
mod pipeline;
mod scheduler;
mod state;

pub(crate) mod shutdown;

pub use builder::PipelineBuilder;
pub use component::{Component, ComponentFn, ComponentRef};
pub use config::{Config, FaultPolicy};
pub use pipeline::Pipeline;
pub use scheduler::Scheduler;
pub use state::State;

pub(crate) use scheduler::FaultHandle;
