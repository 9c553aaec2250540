use crate::clock::{Clock, SystemClock};
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Trait for the consuming end of a pipeline
///
/// The dispatcher calls `consume` for one item at a time, in acceptance
/// order, and afterwards at most one of `on_complete` / `on_error`.
pub trait Sink<T>: Send + 'static {
    /// Process one item. Returning an error fails the pipeline.
    fn consume(&mut self, item: T) -> Result<()>;

    /// Called once when the pipeline fails
    fn on_error(&mut self, _error: &PipelineError) {}

    /// Called once after the source finished and every item was consumed
    fn on_complete(&mut self) {}

    /// Get a human-readable name for this sink
    fn name(&self) -> &str {
        "sink"
    }
}

/// A sink built from a closure
pub struct FnSink<F> {
    name: String,
    handler: F,
}

impl<F> FnSink<F> {
    /// Create a new closure sink
    pub fn new<T>(name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(T) -> Result<()> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler,
        }
    }
}

impl<T, F> Sink<T> for FnSink<F>
where
    F: FnMut(T) -> Result<()> + Send + 'static,
{
    fn consume(&mut self, item: T) -> Result<()> {
        (self.handler)(item)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Spends a fixed processing duration on a clock before each item
///
/// Models a consumer slower than its producer. With a
/// [`VirtualClock`](crate::clock::VirtualClock) no real time passes.
pub struct DelayedSink<S> {
    inner: S,
    processing: Duration,
    clock: Arc<dyn Clock>,
}

impl<S> DelayedSink<S> {
    /// Delay `inner` by `processing` per item on the system clock
    pub fn new(inner: S, processing: Duration) -> Self {
        Self {
            inner,
            processing,
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn processing(&self) -> Duration {
        self.processing
    }
}

impl<T, S> Sink<T> for DelayedSink<S>
where
    S: Sink<T>,
{
    fn consume(&mut self, item: T) -> Result<()> {
        self.clock.sleep(self.processing);
        self.inner.consume(item)
    }

    fn on_error(&mut self, error: &PipelineError) {
        self.inner.on_error(error);
    }

    fn on_complete(&mut self) {
        self.inner.on_complete();
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
