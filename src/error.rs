use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The source has already been started
    #[error("Source has already been started")]
    AlreadyStarted,

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An item arrived at a full buffer running the `Error` overflow policy
    #[error("Buffer overflow: capacity of {capacity} items exceeded")]
    Overflow { capacity: usize },

    /// The sink failed while consuming an item
    #[error("Processing failed: {0}")]
    ProcessingFailure(String),

    /// The producer failed while generating an item
    #[error("Source failed: {0}")]
    SourceFailure(String),

    /// Thread spawn or join error
    #[error("Thread error: {0}")]
    ThreadError(String),

    /// A job was submitted to a scheduler that is no longer running
    #[error("Scheduler has been shut down")]
    SchedulerShutdown,
}

impl PipelineError {
    /// Whether the error ends a running pipeline (as opposed to a
    /// construction-time error the caller can recover from).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineError::Overflow { .. }
                | PipelineError::ProcessingFailure(_)
                | PipelineError::SourceFailure(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(PipelineError::Overflow { capacity: 2 }.is_terminal());
        assert!(PipelineError::ProcessingFailure("boom".into()).is_terminal());
        assert!(!PipelineError::AlreadyStarted.is_terminal());
        assert!(!PipelineError::InvalidConfiguration("capacity".into()).is_terminal());
    }

    #[test]
    fn test_overflow_message() {
        let err = PipelineError::Overflow { capacity: 8 };
        assert_eq!(err.to_string(), "Buffer overflow: capacity of 8 items exceeded");
    }
}
