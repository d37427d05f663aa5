//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints runtime events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [run] pipeline=vision
//! [component-completed] pipeline=vision component=camera final=t=42000000ns
//! [dropped] stream=frames receiver=detector reason="superseded by newer message"
//! [receiver-failed] stream=frames receiver=detector err="decode error"
//! [drain-completed] pipeline=vision
//! [faulted] pipeline=vision err="receiver 'detector' on stream 'frames' failed: ..."
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event descriptions
/// to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::PipelineRun => {
                println!("[run] pipeline={:?}", e.pipeline);
            }
            EventKind::PipelineStopping => {
                println!("[stopping] pipeline={:?}", e.pipeline);
            }
            EventKind::PipelineCompleted => {
                println!("[completed] pipeline={:?}", e.pipeline);
            }
            EventKind::PipelineFaulted => {
                println!("[faulted] pipeline={:?} err={:?}", e.pipeline, e.error);
            }
            EventKind::SubpipelineStarted => {
                println!("[sub-started] pipeline={:?}", e.pipeline);
            }
            EventKind::SubpipelineDisposed => {
                println!("[sub-disposed] pipeline={:?} err={:?}", e.pipeline, e.error);
            }
            EventKind::ComponentCompleted => {
                println!(
                    "[component-completed] pipeline={:?} component={:?} final={:?}",
                    e.pipeline, e.component, e.time
                );
            }
            EventKind::ComponentFailed => {
                println!(
                    "[component-failed] pipeline={:?} component={:?} err={:?}",
                    e.pipeline, e.component, e.error
                );
            }
            EventKind::ReceiverFailed => {
                println!(
                    "[receiver-failed] stream={:?} receiver={:?} err={:?}",
                    e.stream, e.component, e.error
                );
            }
            EventKind::ReceiverClosed => {
                println!(
                    "[receiver-closed] stream={:?} receiver={:?} final={:?}",
                    e.stream, e.component, e.time
                );
            }
            EventKind::MessageDropped => {
                println!(
                    "[dropped] stream={:?} receiver={:?} reason={:?}",
                    e.stream, e.component, e.error
                );
            }
            EventKind::ThrottleEngaged => {
                println!("[throttled] stream={:?} receiver={:?}", e.stream, e.component);
            }
            EventKind::ReplayClamped => {
                println!(
                    "[replay-clamped] stream={:?} driver={:?} detail={:?}",
                    e.stream, e.component, e.error
                );
            }
            EventKind::DrainCompleted => {
                println!("[drain-completed] pipeline={:?}", e.pipeline);
            }
            EventKind::GraceExceeded => {
                println!(
                    "[grace-exceeded] pipeline={:?} stuck={:?}",
                    e.pipeline, e.count
                );
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] subscriber={:?} reason={:?}",
                    e.component, e.error
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={:?} info={:?}",
                    e.component, e.error
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
