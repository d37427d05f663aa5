//! Pipeline lifecycle states.

/// Lifecycle state of a [`Pipeline`](crate::Pipeline) or subpipeline.
///
/// ```text
/// Constructed ──run──► Running ──dispose/exhaustion──► Stopping ──┬─► Completed
///                                                                 └─► Faulted
/// ```
///
/// Wiring (emitters, connections, components) is legal only in `Constructed`.
/// `Completed` and `Faulted` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Created; components and connections may still be added.
    Constructed,
    /// Components started; messages flowing.
    Running,
    /// Drain-then-stop sequence in progress.
    Stopping,
    /// All components stopped and all queues drained cleanly.
    Completed,
    /// Stopped with an unrecoverable error.
    Faulted,
}

impl State {
    /// True for `Completed` and `Faulted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Faulted)
    }
}
