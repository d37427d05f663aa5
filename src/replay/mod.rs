//! Replay of persisted streams: stores, descriptors, and the replay driver.
//!
//! Replay re-posts stored messages with their original originating times
//! while advancing the pipeline's replay [`Clock`](crate::Clock) in lockstep,
//! so the rest of the graph runs exactly as it would live.

mod driver;
mod memory;
mod store;

pub use driver::ReplayDriver;
pub use memory::{MemoryReader, MemoryStore};
pub use store::{ReplayDescriptor, ReplayRate, StoreReader};
