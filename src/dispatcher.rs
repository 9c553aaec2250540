use crate::backpressure::DemandCounter;
use crate::buffer::{Next, OverflowBuffer};
use crate::clock::{Clock, SystemClock};
use crate::error::{PipelineError, Result};
use crate::hooks::Hooks;
use crate::scheduler::Scheduler;
use crate::sink::Sink;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Items handed to the sink before a drain job gives its worker back
const MAX_BATCH: usize = 64;

/// How the drain loop ended
enum Termination {
    Completed,
    Failed(PipelineError),
    Cancelled,
}

/// Hands buffered items to a sink on a worker thread
///
/// Draining is scheduled on demand: every insert, close or cancel on the
/// buffer submits a drain job unless one is already pending. A job returns
/// its worker once the buffer is empty, or after [`MAX_BATCH`] items, so
/// pipelines sharing a scheduler all make progress. At most one job runs at
/// a time, so the sink sees one item at a time in acceptance order.
pub struct Dispatcher<T> {
    buffer: OverflowBuffer<T>,
    hooks: Arc<Hooks<T>>,
    demand: Option<DemandCounter>,
    prefetch: u64,
    clock: Arc<dyn Clock>,
}

impl<T: Send + 'static> Dispatcher<T> {
    /// Create a dispatcher that drains `buffer` without signalling demand
    ///
    /// Terminal signals go to the hooks the buffer was built with.
    pub fn new(buffer: OverflowBuffer<T>) -> Self {
        let hooks = Arc::clone(buffer.hooks());
        Self {
            buffer,
            hooks,
            demand: None,
            prefetch: 1,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Request `prefetch` items up front and one more after every consumed item
    pub fn with_demand(mut self, demand: DemandCounter, prefetch: usize) -> Self {
        self.demand = Some(demand);
        self.prefetch = prefetch.max(1) as u64;
        self
    }

    /// Measure consume latency on `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach to the buffer and schedule the first drain on `scheduler`
    pub fn run<S>(self, scheduler: &Scheduler, sink: S) -> Result<()>
    where
        S: Sink<T>,
    {
        let prefetch = self.prefetch;
        let drain = Arc::new(Drain {
            buffer: self.buffer,
            hooks: self.hooks,
            demand: self.demand,
            clock: self.clock,
            scheduler: scheduler.clone(),
            sink: Mutex::new(sink),
            wip: AtomicUsize::new(0),
        });

        let waker = Arc::clone(&drain);
        drain.buffer.set_waker(move || {
            if let Err(error) = waker.schedule() {
                tracing::error!(%error, "drain could not be scheduled");
            }
        });

        // Items or a terminal signal may already be waiting
        if let Err(error) = drain.schedule() {
            drain.buffer.clear_waker();
            return Err(error);
        }
        if let Some(demand) = &drain.demand {
            demand.request(prefetch);
        }
        Ok(())
    }
}

struct Drain<T, S> {
    buffer: OverflowBuffer<T>,
    hooks: Arc<Hooks<T>>,
    demand: Option<DemandCounter>,
    clock: Arc<dyn Clock>,
    scheduler: Scheduler,
    sink: Mutex<S>,
    /// Wake-ups not yet observed by a drain job; non-zero while one is pending
    wip: AtomicUsize,
}

impl<T, S> Drain<T, S>
where
    T: Send + 'static,
    S: Sink<T>,
{
    fn schedule(self: &Arc<Self>) -> Result<()> {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return Ok(());
        }
        self.submit()
    }

    fn submit(self: &Arc<Self>) -> Result<()> {
        let drain = Arc::clone(self);
        self.scheduler.execute(move || drain.drain())
    }

    fn drain(self: Arc<Self>) {
        let lifecycle = self.buffer.lifecycle().clone();
        let mut sink = self.sink.lock();
        let mut missed = 1;
        let mut consumed = 0;

        let termination = 'outer: loop {
            while let Some(next) = self.buffer.try_next() {
                let item = match next {
                    Next::Item(item) => item,
                    Next::Drained => match lifecycle.failure() {
                        Some(error) => break 'outer Termination::Failed(error),
                        None => break 'outer Termination::Completed,
                    },
                    Next::Cancelled => break 'outer Termination::Cancelled,
                };

                if let Err(error) = self.deliver(&mut *sink, item) {
                    lifecycle.fail(error.clone());
                    self.buffer.cancel();
                    if let Some(demand) = &self.demand {
                        demand.cancel();
                    }
                    break 'outer Termination::Failed(error);
                }

                consumed += 1;
                if consumed == MAX_BATCH {
                    // Yield the worker; wip stays raised so no second job starts
                    drop(sink);
                    match self.submit() {
                        Ok(()) => return,
                        Err(_) => {
                            sink = self.sink.lock();
                            consumed = 0;
                        }
                    }
                }
            }

            let remaining = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if remaining == 0 {
                return;
            }
            missed = remaining;
        };

        // wip is never lowered again, so no further job is submitted
        self.buffer.clear_waker();
        self.finish(&mut *sink, termination);
    }

    fn deliver(&self, sink: &mut S, item: T) -> Result<()> {
        let metrics = self.buffer.metrics();
        let started = self.clock.now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| sink.consume(item)))
            .unwrap_or_else(|payload| Err(PipelineError::ProcessingFailure(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => {
                metrics.record_latency(self.clock.now().saturating_sub(started));
                metrics.record_delivered();
                if let Some(demand) = &self.demand {
                    demand.request(1);
                }
                Ok(())
            }
            Err(error @ PipelineError::ProcessingFailure(_)) => Err(error),
            Err(other) => Err(PipelineError::ProcessingFailure(other.to_string())),
        }
    }

    fn finish(&self, sink: &mut S, termination: Termination) {
        let lifecycle = self.buffer.lifecycle();
        let metrics = self.buffer.metrics();
        let name = sink.name().to_string();
        match termination {
            Termination::Completed => {
                tracing::info!(sink = %name, delivered = metrics.total_delivered(), "pipeline completed");
                guarded(&name, || sink.on_complete());
                self.hooks.complete();
                lifecycle.settle(Ok(()));
            }
            Termination::Failed(error) => {
                tracing::warn!(sink = %name, %error, "pipeline failed");
                guarded(&name, || sink.on_error(&error));
                self.hooks.error(&error);
                lifecycle.settle(Err(error));
            }
            Termination::Cancelled => {
                tracing::debug!(sink = %name, "pipeline cancelled");
                lifecycle.settle(Ok(()));
            }
        }
    }
}

/// Run a terminal sink callback, logging a panic instead of unwinding
fn guarded(sink: &str, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(sink, panic = %panic_message(payload.as_ref()), "terminal callback panicked");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("sink panicked: {detail}")
}
