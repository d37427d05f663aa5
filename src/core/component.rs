//! # Component abstraction and closure-backed implementation.
//!
//! A [`Component`] is the unit a pipeline starts and stops: typically a
//! source that posts into one or more emitters, or a processor that owns
//! internal state beyond its receiver callbacks. Purely reactive sinks do
//! not need a component at all — wiring a [`Receive`](crate::Receive) is
//! enough.
//!
//! A component receives a [`CancellationToken`] and must check it regularly
//! to stop cooperatively during pipeline disposal.
//!
//! ## Completion semantics
//! `run` returning `Ok(Some(t))` declares a **finite** source whose last
//! message carried originating time `t`; the pipeline uses the maximum such
//! `t` as the close time for all streams. `Ok(None)` means the component has
//! no final time of its own (reactive, or infinite and cancelled).

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::clock::Timestamp;
use crate::error::ComponentError;

/// # Asynchronous, cancelable pipeline participant.
///
/// `run` is invoked once when the pipeline starts and owns the component's
/// lifetime: a finite source returns when its data is exhausted; an infinite
/// source returns when `ctx` is cancelled.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use chronoflow::{Component, ComponentError, Timestamp};
///
/// struct Ticker;
///
/// #[async_trait]
/// impl Component for Ticker {
///     fn name(&self) -> &str { "ticker" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<Option<Timestamp>, ComponentError> {
///         ctx.cancelled().await;
///         Ok(None)
///     }
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Stable, human-readable component name.
    fn name(&self) -> &str;

    /// Executes the component until exhaustion or cancellation.
    ///
    /// Returns the final originating time for finite sources.
    async fn run(&self, ctx: CancellationToken) -> Result<Option<Timestamp>, ComponentError>;
}

/// Shared handle to a component.
pub type ComponentRef = Arc<dyn Component>;

/// Closure-backed component.
///
/// Wraps `F: Fn(CancellationToken) -> Fut`, producing a fresh future per run.
/// Captured emitters and shared state go through explicit `Arc`s/clones
/// inside the closure.
///
/// ## Example
/// ```rust
/// use tokio_util::sync::CancellationToken;
/// use chronoflow::{Component, ComponentFn, ComponentError, ComponentRef};
///
/// let source: ComponentRef = ComponentFn::arc("source", |ctx: CancellationToken| async move {
///     if ctx.is_cancelled() {
///         return Err(ComponentError::Canceled);
///     }
///     // post into captured emitters...
///     Ok(None)
/// });
/// assert_eq!(source.name(), "source");
/// ```
pub struct ComponentFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> ComponentFn<F> {
    /// Creates a new closure-backed component.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the component and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Component for ComponentFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Timestamp>, ComponentError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<Option<Timestamp>, ComponentError> {
        (self.f)(ctx).await
    }
}
