//! # Diagnostic event bus.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] used by every
//! part of the runtime (pipelines, delivery loops, the replay driver) to
//! publish [`Event`]s without blocking.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits; it is safe to call
//!   from any delivery loop or emitter hot path.
//! - **Bounded capacity**: one ring buffer of recent events shared by all
//!   receivers; slow receivers observe `RecvError::Lagged(n)`.
//! - **No persistence**: events published with no active subscriber are lost.
//!   The bus carries diagnostics, never message payloads — losing an event
//!   never loses a stream message.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime diagnostic events.
///
/// Cheap to clone (the sender is `Arc`-backed internally); one bus instance is
/// shared by a pipeline and all of its subpipelines.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given ring-buffer capacity (clamped to >= 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all current subscribers. Never blocks.
    ///
    /// Returns the number of receivers the event was sent to (0 if none).
    pub fn publish(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Creates a new subscription starting at the current tail of the buffer.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
