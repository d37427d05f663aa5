//! Runtime diagnostics: event types and the broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to diagnostic events emitted by pipelines, components,
//! delivery loops, and the replay driver.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — event classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Pipeline`, component actors, delivery loops,
//!   `Emitter::post` (drops/throttling), `ReplayDriver`, subscriber workers.
//! - **Consumers**: the pipeline's subscriber listener, which fans events out
//!   to the [`SubscriberSet`](crate::subscribers::SubscriberSet).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
