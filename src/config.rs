use crate::buffer::OverflowPolicy;
use crate::error::{PipelineError, Result};
use crate::source::Cadence;
use std::time::Duration;

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Prefix for worker thread names
    pub thread_name: String,
}

impl SchedulerConfig {
    /// A pool with `workers` threads
    pub fn parallel(workers: usize) -> Self {
        Self {
            workers,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "scheduler needs at least one worker".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    /// One worker per available core
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map_or(1, |n| n.get()),
            thread_name: "backflow-worker".into(),
        }
    }
}

/// Everything needed to construct a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// When the source emits
    pub cadence: Cadence,
    pub overflow_policy: OverflowPolicy,
    /// Buffer capacity; treated as 1 under [`OverflowPolicy::LatestOnly`]
    pub capacity: usize,
    /// Demand the dispatcher requests up front in on-demand mode
    pub prefetch: usize,
    pub scheduler: SchedulerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cadence: Cadence::OnDemand,
            overflow_policy: OverflowPolicy::Error,
            capacity: 256,
            prefetch: 1,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Capacity the buffer will actually have
    pub fn effective_capacity(&self) -> usize {
        self.overflow_policy.effective_capacity(self.capacity)
    }

    /// Reject configurations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "capacity must be at least 1".into(),
            ));
        }
        if self.prefetch == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "prefetch must be at least 1".into(),
            ));
        }
        if self.cadence == Cadence::Interval(Duration::ZERO) {
            return Err(PipelineError::InvalidConfiguration(
                "emission interval must be positive".into(),
            ));
        }
        // More demand in flight than buffer slots would make drops possible
        if self.cadence == Cadence::OnDemand && self.prefetch > self.effective_capacity() {
            return Err(PipelineError::InvalidConfiguration(format!(
                "prefetch {} exceeds effective capacity {}",
                self.prefetch,
                self.effective_capacity()
            )));
        }
        self.scheduler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PipelineConfig {
            capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = PipelineConfig {
            cadence: Cadence::Interval(Duration::ZERO),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefetch_bounded_by_capacity_on_demand() {
        let config = PipelineConfig {
            overflow_policy: OverflowPolicy::LatestOnly,
            capacity: 32,
            prefetch: 2,
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_capacity(), 1);
        assert!(config.validate().is_err());

        // Independent tunables under an interval cadence
        let config = PipelineConfig {
            cadence: Cadence::Interval(Duration::from_millis(1)),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scheduler_needs_workers() {
        assert!(SchedulerConfig::parallel(0).validate().is_err());
        assert!(SchedulerConfig::parallel(4).validate().is_ok());
    }
}
