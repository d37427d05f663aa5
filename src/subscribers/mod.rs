//! Diagnostic event subscribers: the [`Subscribe`] trait and its fan-out.
//!
//! Events published on the [`Bus`](crate::events::Bus) are forwarded to every
//! registered subscriber through a dedicated worker with a bounded queue, so
//! observation never blocks message flow.

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
