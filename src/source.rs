use crate::backpressure::DemandCounter;
use crate::clock::{Clock, SystemClock};
use crate::error::{PipelineError, Result};
use crate::state::Lifecycle;
use parking_lot::Mutex;
use std::ops::{Range, RangeFrom};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Generates the items a [`Source`] emits
pub trait Producer<T>: Send + 'static {
    /// Produce the next item. `None` ends the sequence, `Some(Err(_))` fails it.
    fn produce(&mut self) -> Option<Result<T>>;

    /// Get a human-readable name for this producer
    fn name(&self) -> &str {
        "producer"
    }
}

/// Adapts any iterator into an infallible producer
#[derive(Debug)]
pub struct IterProducer<I> {
    iter: I,
}

impl<I> Producer<I::Item> for IterProducer<I>
where
    I: Iterator + Send + 'static,
    I::Item: Send + 'static,
{
    fn produce(&mut self) -> Option<Result<I::Item>> {
        self.iter.next().map(Ok)
    }

    fn name(&self) -> &str {
        "iter"
    }
}

/// Adapts a closure into a producer
pub struct FnProducer<F> {
    name: String,
    generate: F,
}

impl<T, F> Producer<T> for FnProducer<F>
where
    F: FnMut() -> Option<Result<T>> + Send + 'static,
{
    fn produce(&mut self) -> Option<Result<T>> {
        (self.generate)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Produce the items of `items` in order
pub fn from_iter<I>(items: I) -> IterProducer<I::IntoIter>
where
    I: IntoIterator,
{
    IterProducer {
        iter: items.into_iter(),
    }
}

/// Produce `count` consecutive integers starting at `start`
pub fn range(start: u64, count: u64) -> IterProducer<Range<u64>> {
    from_iter(start..start.saturating_add(count))
}

/// Produce 0, 1, 2, ... forever (a ticker when paired with an interval cadence)
pub fn counter() -> IterProducer<RangeFrom<u64>> {
    from_iter(0..)
}

/// Produce items from a named closure
pub fn from_fn<T, F>(name: impl Into<String>, generate: F) -> FnProducer<F>
where
    F: FnMut() -> Option<Result<T>> + Send + 'static,
{
    FnProducer {
        name: name.into(),
        generate,
    }
}

/// When the source emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// One item per period, ignoring demand
    Interval(Duration),
    /// One item per unit of outstanding demand
    OnDemand,
}

/// Emission loop state, observable through [`SourceHandle::state`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    Idle,
    AwaitingDemand,
    Emitting,
    Completed,
    Failed,
    /// The loop exited because the pipeline left `Active` elsewhere
    Stopped,
}

/// Emits items from a [`Producer`] on a dedicated thread
pub struct Source<T> {
    producer: Option<Box<dyn Producer<T>>>,
    cadence: Cadence,
    demand: DemandCounter,
    lifecycle: Lifecycle,
    clock: Arc<dyn Clock>,
}

impl<T: Send + 'static> Source<T> {
    /// Create a source with a fresh demand counter, lifecycle and system clock
    pub fn new(producer: impl Producer<T>, cadence: Cadence) -> Self {
        Self {
            producer: Some(Box::new(producer)),
            cadence,
            demand: DemandCounter::new(),
            lifecycle: Lifecycle::new(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Share a demand counter with the consumer side
    pub fn with_demand(mut self, demand: DemandCounter) -> Self {
        self.demand = demand;
        self
    }

    /// Share the pipeline lifecycle
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Use a different clock for the interval cadence
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn demand(&self) -> &DemandCounter {
        &self.demand
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Begin emission on a new thread
    ///
    /// `on_item` receives every emitted item. Exactly one of `on_complete`
    /// and `on_error` runs if the sequence ends on its own; neither runs if
    /// the pipeline is stopped or fails elsewhere.
    pub fn start<I, C, E>(&mut self, on_item: I, on_complete: C, on_error: E) -> Result<SourceHandle>
    where
        I: FnMut(T) + Send + 'static,
        C: FnOnce() + Send + 'static,
        E: FnOnce(PipelineError) + Send + 'static,
    {
        let producer = self.producer.take().ok_or(PipelineError::AlreadyStarted)?;
        let state = Arc::new(Mutex::new(EmitterState::Idle));

        let emitter = Emitter {
            producer,
            cadence: self.cadence,
            demand: self.demand.clone(),
            lifecycle: self.lifecycle.clone(),
            clock: Arc::clone(&self.clock),
            state: Arc::clone(&state),
        };

        let thread_name = format!("{}-source", emitter.producer.name());
        tracing::info!(source = %thread_name, cadence = ?self.cadence, "starting source");
        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || emitter.run(on_item, on_complete, on_error))
            .map_err(|e| PipelineError::ThreadError(e.to_string()))?;

        Ok(SourceHandle {
            demand: self.demand.clone(),
            lifecycle: self.lifecycle.clone(),
            state,
            thread: Some(thread),
        })
    }
}

struct Emitter<T> {
    producer: Box<dyn Producer<T>>,
    cadence: Cadence,
    demand: DemandCounter,
    lifecycle: Lifecycle,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<EmitterState>>,
}

impl<T: Send + 'static> Emitter<T> {
    fn set_state(&self, state: EmitterState) {
        *self.state.lock() = state;
    }

    fn run<I, C, E>(mut self, mut on_item: I, on_complete: C, on_error: E)
    where
        I: FnMut(T),
        C: FnOnce(),
        E: FnOnce(PipelineError),
    {
        let final_state = loop {
            if !self.lifecycle.is_active() {
                break EmitterState::Stopped;
            }

            match self.cadence {
                Cadence::OnDemand => {
                    self.set_state(EmitterState::AwaitingDemand);
                    if !self.demand.acquire() {
                        break EmitterState::Stopped;
                    }
                }
                Cadence::Interval(period) => self.clock.sleep(period),
            }

            if !self.lifecycle.is_active() {
                break EmitterState::Stopped;
            }
            self.set_state(EmitterState::Emitting);

            match self.producer.produce() {
                Some(Ok(item)) => on_item(item),
                None => {
                    if !self.lifecycle.complete() {
                        break EmitterState::Stopped;
                    }
                    tracing::info!(producer = self.producer.name(), "source completed");
                    on_complete();
                    break EmitterState::Completed;
                }
                Some(Err(error)) => {
                    let error = match error {
                        PipelineError::SourceFailure(_) => error,
                        other => PipelineError::SourceFailure(other.to_string()),
                    };
                    if !self.lifecycle.fail(error.clone()) {
                        break EmitterState::Stopped;
                    }
                    tracing::warn!(producer = self.producer.name(), %error, "source failed");
                    on_error(error);
                    break EmitterState::Failed;
                }
            }
        };
        self.set_state(final_state);
    }
}

/// Controls a started [`Source`]. Dropping the handle stops the source.
pub struct SourceHandle {
    demand: DemandCounter,
    lifecycle: Lifecycle,
    state: Arc<Mutex<EmitterState>>,
    thread: Option<JoinHandle<()>>,
}

impl SourceHandle {
    /// Stop emission early. The loop exits before its next emission.
    pub fn stop(&self) {
        self.lifecycle.cancel();
        self.demand.cancel();
    }

    /// Current state of the emission loop
    pub fn state(&self) -> EmitterState {
        *self.state.lock()
    }

    /// Check if the emission thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the emission thread to exit
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| PipelineError::ThreadError("source thread panicked".into())),
            None => Ok(()),
        }
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.join() {
            tracing::warn!(error = %e, "failed to join source thread");
        }
    }
}
