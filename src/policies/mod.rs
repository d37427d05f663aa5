//! Connection-level policies.
//!
//! Currently a single concern lives here: the [`DeliveryPolicy`] attached to
//! each emitter→receiver connection at wiring time. It decides queue bounds,
//! drop semantics under backpressure, and the inline delivery optimization.

mod delivery;

pub use delivery::{DeliveryMode, DeliveryPolicy};
