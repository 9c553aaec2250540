use crate::backpressure::DemandCounter;
use crate::buffer::{Offer, OverflowBuffer, OverflowPolicy, RejectReason};
use crate::clock::{Clock, SystemClock};
use crate::config::{PipelineConfig, SchedulerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{PipelineError, Result};
use crate::hooks::Hooks;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::scheduler::Scheduler;
use crate::sink::Sink;
use crate::source::{Cadence, EmitterState, Producer, Source, SourceHandle};
use crate::state::{Lifecycle, PipelineState};
use std::sync::Arc;
use std::time::Duration;

/// Builder for constructing pipelines
pub struct PipelineBuilder<T> {
    config: PipelineConfig,
    hooks: Hooks<T>,
    clock: Arc<dyn Clock>,
    scheduler: Option<Scheduler>,
}

impl<T: Send + 'static> PipelineBuilder<T> {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self::from_config(PipelineConfig::default())
    }

    /// Start from an existing configuration
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            config,
            hooks: Hooks::new(),
            clock: Arc::new(SystemClock::new()),
            scheduler: None,
        }
    }

    /// Emit one item per `period`, ignoring demand
    pub fn interval(mut self, period: Duration) -> Self {
        self.config.cadence = Cadence::Interval(period);
        self
    }

    /// Emit only what the sink has requested
    pub fn on_demand(mut self) -> Self {
        self.config.cadence = Cadence::OnDemand;
        self
    }

    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow_policy = policy;
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Shorthand for `overflow_policy` plus `capacity`
    pub fn buffer(self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.capacity(capacity).overflow_policy(policy)
    }

    pub fn prefetch(mut self, prefetch: usize) -> Self {
        self.config.prefetch = prefetch;
        self
    }

    /// Size the pipeline's own worker pool
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.scheduler = SchedulerConfig {
            workers,
            ..self.config.scheduler
        };
        self
    }

    /// Run consumption on an existing, possibly shared, scheduler
    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Use a different clock for the emission cadence and consume latency
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn on_item_dropped(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_item_dropped(hook);
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_error(hook);
        self
    }

    pub fn on_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hooks = self.hooks.on_complete(hook);
        self
    }

    /// Validate the configuration and allocate the shared resources
    pub fn build(self) -> Result<Pipeline<T>> {
        self.config.validate()?;

        let scheduler = match self.scheduler {
            Some(scheduler) => scheduler,
            None => Scheduler::new(&self.config.scheduler)?,
        };
        let lifecycle = Lifecycle::new();
        let metrics = PipelineMetrics::new();
        let buffer = OverflowBuffer::with_parts(
            self.config.capacity,
            self.config.overflow_policy,
            lifecycle.clone(),
            Arc::new(self.hooks),
            metrics.clone(),
        )?;

        Ok(Pipeline {
            config: self.config,
            lifecycle,
            demand: DemandCounter::new(),
            buffer,
            metrics,
            clock: self.clock,
            scheduler,
        })
    }
}

impl<T: Send + 'static> Default for PipelineBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured, not yet running pipeline
pub struct Pipeline<T> {
    config: PipelineConfig,
    lifecycle: Lifecycle,
    demand: DemandCounter,
    buffer: OverflowBuffer<T>,
    metrics: PipelineMetrics,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
}

impl<T: Send + 'static> Pipeline<T> {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The buffer between source and sink
    pub fn buffer(&self) -> &OverflowBuffer<T> {
        &self.buffer
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    /// Start consumption on the scheduler, then emission on the producer thread
    pub fn start<P, S>(self, producer: P, sink: S) -> Result<PipelineHandle<T>>
    where
        P: Producer<T>,
        S: Sink<T>,
    {
        let on_demand = self.config.cadence == Cadence::OnDemand;

        let mut dispatcher = Dispatcher::new(self.buffer.clone()).with_clock(Arc::clone(&self.clock));
        if on_demand {
            dispatcher = dispatcher.with_demand(self.demand.clone(), self.config.prefetch);
        }
        dispatcher.run(&self.scheduler, sink)?;

        let mut source = Source::new(producer, self.config.cadence)
            .with_demand(self.demand.clone())
            .with_lifecycle(self.lifecycle.clone())
            .with_clock(Arc::clone(&self.clock));

        let offer_buffer = self.buffer.clone();
        let metrics = self.metrics.clone();
        let complete_buffer = self.buffer.clone();
        let error_buffer = self.buffer.clone();

        let started = source.start(
            move |item| {
                metrics.record_emitted();
                if let Offer::Rejected(RejectReason::Overflow) = offer_buffer.offer(item) {
                    tracing::debug!(capacity = offer_buffer.capacity(), "offer rejected");
                }
            },
            move || complete_buffer.close(),
            move |_| error_buffer.close(),
        );
        let source = match started {
            Ok(source) => source,
            Err(e) => {
                // Let the attached dispatcher settle the run
                self.lifecycle.cancel();
                self.buffer.cancel();
                return Err(e);
            }
        };

        tracing::info!(
            cadence = ?self.config.cadence,
            policy = ?self.config.overflow_policy,
            capacity = self.buffer.capacity(),
            "pipeline started"
        );

        Ok(PipelineHandle {
            source: Some(source),
            lifecycle: self.lifecycle,
            demand: self.demand,
            buffer: self.buffer,
            metrics: self.metrics,
            scheduler: Some(self.scheduler),
        })
    }
}

/// Construct and start a pipeline in one step
pub fn create_pipeline<T, P, S>(config: PipelineConfig, producer: P, sink: S) -> Result<PipelineHandle<T>>
where
    T: Send + 'static,
    P: Producer<T>,
    S: Sink<T>,
{
    PipelineBuilder::from_config(config).build()?.start(producer, sink)
}

/// Outcome reported by [`PipelineHandle::await_completion`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Completed,
    TimedOut,
    Failed(PipelineError),
}

/// A running pipeline that can be stopped and observed
///
/// Dropping the handle stops the pipeline and joins its threads.
pub struct PipelineHandle<T> {
    source: Option<SourceHandle>,
    lifecycle: Lifecycle,
    demand: DemandCounter,
    buffer: OverflowBuffer<T>,
    metrics: PipelineMetrics,
    scheduler: Option<Scheduler>,
}

impl<T> PipelineHandle<T> {
    /// Stop emission and delivery; pending items are discarded
    pub fn stop(&self) {
        if self.lifecycle.cancel() {
            tracing::info!("pipeline stopped");
        }
        self.demand.cancel();
        self.buffer.cancel();
    }

    /// Wait until the sink has seen its last item, or `timeout` elapses
    pub fn await_completion(&self, timeout: Duration) -> Completion {
        match self.lifecycle.wait_settled(timeout) {
            None => Completion::TimedOut,
            Some(Ok(())) => Completion::Completed,
            Some(Err(error)) => Completion::Failed(error),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    /// State of the source's emission loop
    pub fn source_state(&self) -> EmitterState {
        self.source
            .as_ref()
            .map_or(EmitterState::Stopped, |source| source.state())
    }

    /// Check if the run has settled
    pub fn is_finished(&self) -> bool {
        self.lifecycle.is_settled()
    }

    /// Items currently waiting in the buffer
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn outstanding_demand(&self) -> u64 {
        self.demand.outstanding()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<T> Drop for PipelineHandle<T> {
    fn drop(&mut self) {
        self.stop();
        // Source first: it joins the producer thread
        drop(self.source.take());
        drop(self.scheduler.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::sink::FnSink;
    use crate::source::range;

    #[test]
    fn test_pipeline_builder() {
        let pipeline = PipelineBuilder::<u64>::new()
            .buffer(10, OverflowPolicy::DropOldest)
            .workers(2)
            .build()
            .unwrap();
        assert_eq!(pipeline.buffer().capacity(), 10);
        assert_eq!(pipeline.state(), PipelineState::Active);
    }

    #[test]
    fn test_zero_capacity_error() {
        let result = PipelineBuilder::<u64>::new().capacity(0).build();
        assert!(matches!(result, Err(PipelineError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_latest_only_ignores_capacity() {
        let pipeline = PipelineBuilder::<u64>::new()
            .interval(Duration::from_millis(1))
            .buffer(64, OverflowPolicy::LatestOnly)
            .workers(1)
            .build()
            .unwrap();
        assert_eq!(pipeline.buffer().capacity(), 1);
    }

    #[test]
    fn test_create_pipeline_runs_to_completion() {
        let config = PipelineConfig {
            scheduler: SchedulerConfig::parallel(1),
            ..PipelineConfig::default()
        };
        let handle = create_pipeline(config, range(1, 5), FnSink::new("noop", |_: u64| Ok(()))).unwrap();

        assert_eq!(handle.await_completion(Duration::from_secs(5)), Completion::Completed);
        assert_eq!(handle.state(), PipelineState::Completed);
        assert_eq!(handle.metrics().delivered, 5);
        assert_eq!(handle.buffered(), 0);
    }

    #[test]
    fn test_stop_settles_infinite_run() {
        let handle = PipelineBuilder::<u64>::new()
            .interval(Duration::from_millis(1))
            .buffer(4, OverflowPolicy::DropOldest)
            .workers(1)
            .clock(Arc::new(VirtualClock::new()))
            .build()
            .unwrap()
            .start(crate::source::counter(), FnSink::new("noop", |_: u64| Ok(())))
            .unwrap();

        handle.stop();
        assert_eq!(handle.await_completion(Duration::from_secs(5)), Completion::Completed);
        assert_eq!(handle.state(), PipelineState::Completed);
    }
}
