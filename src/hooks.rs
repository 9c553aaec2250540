//! Per-pipeline observability callbacks.

use crate::error::PipelineError;
use std::fmt;

type DropHook<T> = Box<dyn Fn(&T) + Send + Sync>;
type ErrorHook = Box<dyn Fn(&PipelineError) + Send + Sync>;
type CompleteHook = Box<dyn Fn() + Send + Sync>;

/// Fire-and-forget notifications owned by one pipeline instance
///
/// Callbacks run on whichever thread raised the event (the producer thread
/// for drops, a worker thread for terminal signals) and must not block.
pub struct Hooks<T> {
    dropped: Vec<DropHook<T>>,
    error: Vec<ErrorHook>,
    complete: Vec<CompleteHook>,
}

impl<T> Hooks<T> {
    /// Create an empty hook set
    pub fn new() -> Self {
        Self {
            dropped: Vec::new(),
            error: Vec::new(),
            complete: Vec::new(),
        }
    }

    /// Register a callback for items discarded by an overflow policy
    pub fn on_item_dropped(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.dropped.push(Box::new(hook));
        self
    }

    /// Register a callback for the terminal error
    pub fn on_error(mut self, hook: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.error.push(Box::new(hook));
        self
    }

    /// Register a callback for normal completion
    pub fn on_complete(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.complete.push(Box::new(hook));
        self
    }

    pub(crate) fn item_dropped(&self, item: &T) {
        for hook in &self.dropped {
            hook(item);
        }
    }

    pub(crate) fn error(&self, error: &PipelineError) {
        for hook in &self.error {
            hook(error);
        }
    }

    pub(crate) fn complete(&self) {
        for hook in &self.complete {
            hook();
        }
    }
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Hooks<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("dropped", &self.dropped.len())
            .field("error", &self.error.len())
            .field("complete", &self.complete.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_every_registered_hook_fires() {
        let drops = Arc::new(AtomicUsize::new(0));
        let first = Arc::clone(&drops);
        let second = Arc::clone(&drops);

        let hooks = Hooks::<u32>::new()
            .on_item_dropped(move |_| {
                first.fetch_add(1, Ordering::SeqCst);
            })
            .on_item_dropped(move |item| {
                second.fetch_add(*item as usize, Ordering::SeqCst);
            });

        hooks.item_dropped(&10);
        assert_eq!(drops.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_empty_hooks_are_noops() {
        let hooks = Hooks::<u32>::default();
        hooks.item_dropped(&1);
        hooks.error(&PipelineError::AlreadyStarted);
        hooks.complete();
    }
}
