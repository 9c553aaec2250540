use crate::error::{PipelineError, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Coarse state of a pipeline run. Transitions only leave `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Active,
    Completed,
    Failed,
}

#[derive(Debug)]
struct LifecycleInner {
    state: PipelineState,
    failure: Option<PipelineError>,
    cancelled: bool,
    /// Outcome recorded by the dispatcher once it has stopped delivering
    settled: Option<Result<()>>,
}

/// Shared, synchronized pipeline state cell
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    shared: Arc<(Mutex<LifecycleInner>, Condvar)>,
}

impl Lifecycle {
    /// Create a lifecycle in the `Active` state
    pub fn new() -> Self {
        Self {
            shared: Arc::new((
                Mutex::new(LifecycleInner {
                    state: PipelineState::Active,
                    failure: None,
                    cancelled: false,
                    settled: None,
                }),
                Condvar::new(),
            )),
        }
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        self.shared.0.lock().state
    }

    /// Check if the pipeline still accepts emissions
    pub fn is_active(&self) -> bool {
        self.state() == PipelineState::Active
    }

    /// Move `Active -> Completed`. Returns false if the state had already left `Active`.
    pub fn complete(&self) -> bool {
        let mut inner = self.shared.0.lock();
        if inner.state != PipelineState::Active {
            return false;
        }
        inner.state = PipelineState::Completed;
        true
    }

    /// Move `Active -> Failed` and remember the cause.
    /// Returns false if the state had already left `Active`.
    pub fn fail(&self, error: PipelineError) -> bool {
        let mut inner = self.shared.0.lock();
        if inner.state != PipelineState::Active {
            return false;
        }
        inner.state = PipelineState::Failed;
        inner.failure = Some(error);
        true
    }

    /// Stop the run early. An active pipeline becomes `Completed`.
    pub fn cancel(&self) -> bool {
        let mut inner = self.shared.0.lock();
        inner.cancelled = true;
        if inner.state != PipelineState::Active {
            return false;
        }
        inner.state = PipelineState::Completed;
        true
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.shared.0.lock().cancelled
    }

    /// Cause of the failure, if the state is `Failed`
    pub fn failure(&self) -> Option<PipelineError> {
        self.shared.0.lock().failure.clone()
    }

    /// Record the final outcome of the run and wake every waiter.
    /// Only the first call has an effect.
    pub fn settle(&self, outcome: Result<()>) {
        let (lock, cond) = &*self.shared;
        let mut inner = lock.lock();
        if inner.settled.is_none() {
            inner.settled = Some(outcome);
            cond.notify_all();
        }
    }

    /// Check if the run has settled
    pub fn is_settled(&self) -> bool {
        self.shared.0.lock().settled.is_some()
    }

    /// Block until the run settles or `timeout` elapses.
    /// Returns `None` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> Option<Result<()>> {
        let deadline = Instant::now() + timeout;
        let (lock, cond) = &*self.shared;
        let mut inner = lock.lock();
        while inner.settled.is_none() {
            if cond.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        inner.settled.clone()
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
