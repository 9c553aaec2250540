use crate::error::{PipelineError, Result};
use crate::hooks::Hooks;
use crate::metrics::PipelineMetrics;
use crate::state::Lifecycle;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;

/// Determines how the buffer handles an offer when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Reject the item and fail the pipeline
    Error,
    /// Discard the incoming item
    DropNew,
    /// Evict the oldest buffered item to make room
    DropOldest,
    /// Keep only the newest item (capacity is always 1)
    LatestOnly,
}

impl OverflowPolicy {
    /// Capacity actually used for a configured capacity
    pub fn effective_capacity(self, capacity: usize) -> usize {
        match self {
            OverflowPolicy::LatestOnly => 1,
            _ => capacity,
        }
    }
}

/// Why an offer was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Buffer full under [`OverflowPolicy::Error`]
    Overflow,
    /// Buffer full under [`OverflowPolicy::DropNew`]
    Dropped,
    /// Upstream already closed, overflowed or cancelled
    Closed,
}

/// Result of [`OverflowBuffer::offer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Rejected(RejectReason),
}

impl Offer {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Offer::Accepted)
    }
}

/// Result of [`OverflowBuffer::next_blocking`] and [`OverflowBuffer::try_next`]
#[derive(Debug, PartialEq, Eq)]
pub enum Next<T> {
    Item(T),
    /// Upstream closed and every accepted item has been handed out
    Drained,
    /// The buffer was cancelled; pending items were discarded
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    Open,
    Closed,
    Cancelled,
}

type Waker = Arc<dyn Fn() + Send + Sync>;

struct Slots<T> {
    queue: VecDeque<T>,
    upstream: Upstream,
}

struct BufferShared<T> {
    slots: Mutex<Slots<T>>,
    not_empty: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    lifecycle: Lifecycle,
    hooks: Arc<Hooks<T>>,
    metrics: PipelineMetrics,
    waker: Mutex<Option<Waker>>,
}

/// A bounded FIFO between a producer thread and a consumer thread
///
/// All mutations happen under one mutex so the length and order invariants
/// hold across threads. Drop notifications run after the lock is released.
pub struct OverflowBuffer<T> {
    shared: Arc<BufferShared<T>>,
}

impl<T> Clone for OverflowBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> OverflowBuffer<T> {
    /// Create a standalone buffer with its own lifecycle and no hooks
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self> {
        Self::with_parts(
            capacity,
            policy,
            Lifecycle::new(),
            Arc::new(Hooks::new()),
            PipelineMetrics::new(),
        )
    }

    /// Create a buffer that shares lifecycle, hooks and metrics with a pipeline
    pub fn with_parts(
        capacity: usize,
        policy: OverflowPolicy,
        lifecycle: Lifecycle,
        hooks: Arc<Hooks<T>>,
        metrics: PipelineMetrics,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "buffer capacity must be at least 1".into(),
            ));
        }
        let capacity = policy.effective_capacity(capacity);
        Ok(Self {
            shared: Arc::new(BufferShared {
                slots: Mutex::new(Slots {
                    queue: VecDeque::with_capacity(capacity),
                    upstream: Upstream::Open,
                }),
                not_empty: Condvar::new(),
                capacity,
                policy,
                lifecycle,
                hooks,
                metrics,
                waker: Mutex::new(None),
            }),
        })
    }

    /// Attempt to enqueue an item, applying the overflow policy when full
    pub fn offer(&self, item: T) -> Offer {
        let shared = &*self.shared;
        let mut slots = shared.slots.lock();

        if slots.upstream != Upstream::Open {
            drop(slots);
            shared.metrics.record_rejected();
            return Offer::Rejected(RejectReason::Closed);
        }

        if slots.queue.len() < shared.capacity {
            slots.queue.push_back(item);
            drop(slots);
            shared.not_empty.notify_one();
            shared.metrics.record_accepted();
            self.wake();
            return Offer::Accepted;
        }

        match shared.policy {
            OverflowPolicy::Error => {
                // Fail before releasing the lock so a drained consumer sees the cause
                let failed = shared.lifecycle.fail(PipelineError::Overflow {
                    capacity: shared.capacity,
                });
                slots.upstream = Upstream::Closed;
                drop(slots);
                if failed {
                    tracing::warn!(capacity = shared.capacity, "buffer overflow, failing pipeline");
                }
                shared.not_empty.notify_all();
                shared.metrics.record_rejected();
                self.wake();
                Offer::Rejected(RejectReason::Overflow)
            }
            OverflowPolicy::DropNew => {
                drop(slots);
                self.dropped(&item);
                Offer::Rejected(RejectReason::Dropped)
            }
            OverflowPolicy::DropOldest | OverflowPolicy::LatestOnly => {
                let evicted = slots.queue.pop_front();
                slots.queue.push_back(item);
                drop(slots);
                shared.not_empty.notify_one();
                shared.metrics.record_accepted();
                if let Some(evicted) = evicted {
                    self.dropped(&evicted);
                }
                self.wake();
                Offer::Accepted
            }
        }
    }

    fn dropped(&self, item: &T) {
        tracing::debug!(policy = ?self.shared.policy, "item dropped");
        self.shared.metrics.record_dropped();
        self.shared.hooks.item_dropped(item);
    }

    /// Register the callback run after every insert, close or cancel
    pub(crate) fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.shared.waker.lock() = Some(Arc::new(waker));
    }

    pub(crate) fn clear_waker(&self) {
        self.shared.waker.lock().take();
    }

    fn wake(&self) {
        // Run outside the lock so the callback may clear itself
        let waker = self.shared.waker.lock().clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    /// Remove and return the oldest item without waiting
    pub fn poll(&self) -> Option<T> {
        self.shared.slots.lock().queue.pop_front()
    }

    /// Remove the oldest item without waiting
    ///
    /// Returns `None` while the buffer is empty and upstream is still open.
    pub fn try_next(&self) -> Option<Next<T>> {
        let mut slots = self.shared.slots.lock();
        if slots.upstream == Upstream::Cancelled {
            return Some(Next::Cancelled);
        }
        if let Some(item) = slots.queue.pop_front() {
            return Some(Next::Item(item));
        }
        match slots.upstream {
            Upstream::Closed => Some(Next::Drained),
            _ => None,
        }
    }

    /// Remove the oldest item, suspending while the buffer is empty and upstream is open
    pub fn next_blocking(&self) -> Next<T> {
        let shared = &*self.shared;
        let mut slots = shared.slots.lock();
        loop {
            if slots.upstream == Upstream::Cancelled {
                return Next::Cancelled;
            }
            if let Some(item) = slots.queue.pop_front() {
                return Next::Item(item);
            }
            if slots.upstream == Upstream::Closed {
                return Next::Drained;
            }
            shared.not_empty.wait(&mut slots);
        }
    }

    /// Mark upstream as finished. Buffered items still drain.
    pub fn close(&self) {
        let mut slots = self.shared.slots.lock();
        if slots.upstream == Upstream::Open {
            slots.upstream = Upstream::Closed;
        }
        drop(slots);
        self.shared.not_empty.notify_all();
        self.wake();
    }

    /// Discard pending items and wake every waiter
    pub fn cancel(&self) {
        let mut slots = self.shared.slots.lock();
        slots.upstream = Upstream::Cancelled;
        let discarded = std::mem::take(&mut slots.queue);
        drop(slots);
        self.shared.not_empty.notify_all();
        if !discarded.is_empty() {
            tracing::debug!(discarded = discarded.len(), "buffer cancelled");
        }
        self.wake();
    }

    /// Check if upstream no longer accepts offers
    pub fn is_closed(&self) -> bool {
        self.shared.slots.lock().upstream != Upstream::Open
    }

    /// Snapshot of the buffered items, oldest first
    pub fn contents(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.shared.slots.lock().queue.iter().cloned().collect()
    }

    /// Get the current size of the buffer
    pub fn len(&self) -> usize {
        self.shared.slots.lock().queue.len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the effective capacity of the buffer
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.shared.policy
    }

    /// Get the utilization of the buffer as a percentage (0-100)
    pub fn utilization(&self) -> u32 {
        ((self.len() * 100) / self.capacity()).min(100) as u32
    }

    /// Get the number of items discarded by the overflow policy
    pub fn dropped_count(&self) -> u64 {
        self.shared.metrics.total_dropped()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.shared.metrics
    }

    pub(crate) fn hooks(&self) -> &Arc<Hooks<T>> {
        &self.shared.hooks
    }
}
