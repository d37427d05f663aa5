//! # Replay driver: a source component that re-posts persisted messages.
//!
//! [`ReplayDriver`] bridges a [`StoreReader`] and an [`Emitter`]: it walks the
//! stored interval, advances the pipeline's replay clock to each message's
//! originating time, and posts the message with that same time. Downstream
//! receivers observe identical envelopes (values, originating times, order)
//! on every run over the same interval.
//!
//! ## Rules
//! - Requires a clock in replay mode; a live clock is a fatal mismatch.
//! - A partially out-of-range interval is clamped to the stored data and
//!   reported via `ReplayClamped`.
//! - A fully disjoint interval is fatal (`ReplayBoundsExceeded`).
//! - Pacing follows the descriptor: original timing scaled by a speed factor,
//!   or as fast as possible.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, Timestamp};
use crate::core::{Component, Pipeline};
use crate::error::{ComponentError, PipelineError};
use crate::events::{Bus, Event, EventKind};
use crate::replay::store::{ReplayDescriptor, StoreReader};
use crate::streams::Emitter;

/// Source component replaying one persisted stream through an emitter.
pub struct ReplayDriver<T> {
    name: Arc<str>,
    descriptor: ReplayDescriptor,
    reader: Mutex<Option<Box<dyn StoreReader<T>>>>,
    emitter: Emitter<T>,
    clock: Arc<Clock>,
    bus: Bus,
}

impl<T: Clone + Send + 'static> ReplayDriver<T> {
    /// Creates a driver bound to `pipeline`'s clock and event bus, replaying
    /// `reader` through `emitter`.
    pub fn arc(
        pipeline: &Pipeline,
        descriptor: ReplayDescriptor,
        reader: impl StoreReader<T>,
        emitter: Emitter<T>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(format!("replay:{}", emitter.name()).as_str()),
            descriptor,
            reader: Mutex::new(Some(Box::new(reader))),
            emitter,
            clock: Arc::clone(pipeline.clock()),
            bus: pipeline.bus().clone(),
        })
    }

    fn fatal(err: PipelineError) -> ComponentError {
        ComponentError::Fatal {
            error: err.to_string(),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + 'static> Component for ReplayDriver<T> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<Option<Timestamp>, ComponentError> {
        if !self.clock.is_replay() {
            return Err(Self::fatal(PipelineError::NotReplaying));
        }
        let mut reader = self
            .reader
            .lock()
            .expect("replay reader lock poisoned")
            .take()
            .ok_or_else(|| ComponentError::Fail {
                error: "replay driver already ran".to_string(),
            })?;

        let Some((available_start, available_end)) = reader.interval() else {
            // Empty store: nothing to replay, nothing to close at.
            return Ok(None);
        };
        let desc = &self.descriptor;
        if desc.end < available_start || desc.start > available_end {
            return Err(Self::fatal(PipelineError::ReplayBoundsExceeded {
                requested_start: desc.start,
                requested_end: desc.end,
                available_start,
                available_end,
            }));
        }
        let start = desc.start.max(available_start);
        let end = desc.end.min(available_end);
        if start != desc.start || end != desc.end {
            self.bus.publish(
                Event::now(EventKind::ReplayClamped)
                    .with_component(self.name.clone())
                    .with_stream(self.emitter.name().to_string())
                    .with_error(format!(
                        "requested [{:?}, {:?}], stored [{:?}, {:?}]",
                        desc.start, desc.end, available_start, available_end
                    )),
            );
        }

        reader.seek(start);
        while let Some((value, t)) = reader.next() {
            if t > end {
                break;
            }
            if ctx.is_cancelled() {
                return Err(ComponentError::Canceled);
            }
            if let Some(delay) = desc.pacing_delay(t.saturating_duration_since(self.clock.now())) {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(ComponentError::Canceled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            self.clock
                .advance_to(t)
                .map_err(|e| ComponentError::Fail { error: e.to_string() })?;
            self.emitter
                .post(value, t)
                .await
                .map_err(|e| ComponentError::Fail { error: e.to_string() })?;
        }
        Ok(Some(end))
    }
}
