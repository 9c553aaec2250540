//! A backpressure-aware pipeline between a fast producer and a slow consumer.
//!
//! Items flow Source → OverflowBuffer → Dispatcher → Sink. The source runs on
//! its own thread, the sink on a worker pool. Flow control comes in two
//! flavours:
//!
//! - **On demand**: the dispatcher requests items through a shared
//!   [`DemandCounter`] and the source never emits more than was requested.
//! - **Interval**: the source emits at its own cadence and the bounded
//!   [`OverflowBuffer`] sheds the excess under an [`OverflowPolicy`]
//!   (`Error`, `DropNew`, `DropOldest` or `LatestOnly`).
//!
//! # Features
//!
//! - Demand counter with blocking acquisition and an unbounded sentinel
//! - Bounded buffer with wake-on-insert and drop notifications
//! - Fixed-size worker pool, serialized in-order delivery per pipeline
//! - Injectable clock for cadence and simulated processing time
//! - Per-pipeline hooks and metrics
//!
//! # Example
//!
//! ```ignore
//! use backflow::{source, Completion, FnSink, OverflowPolicy, PipelineBuilder};
//! use std::time::Duration;
//!
//! let handle = PipelineBuilder::new()
//!     .interval(Duration::from_millis(300))
//!     .buffer(2, OverflowPolicy::DropNew)
//!     .on_item_dropped(|item: &u64| tracing::info!(item, "dropped"))
//!     .build()?
//!     .start(source::counter(), FnSink::new("print", |item| {
//!         println!("{item}");
//!         Ok(())
//!     }))?;
//!
//! std::thread::sleep(Duration::from_secs(3));
//! handle.stop();
//! assert_eq!(handle.await_completion(Duration::from_secs(1)), Completion::Completed);
//! ```

pub mod backpressure;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
pub mod scheduler;
pub mod sink;
pub mod source;
pub mod state;

// Re-exports for convenience
pub use backpressure::{DemandCounter, UNBOUNDED};
pub use buffer::{Next, Offer, OverflowBuffer, OverflowPolicy, RejectReason};
pub use clock::{Clock, SystemClock, VirtualClock};
pub use config::{PipelineConfig, SchedulerConfig};
pub use dispatcher::Dispatcher;
pub use error::{PipelineError, Result};
pub use hooks::Hooks;
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use pipeline::{create_pipeline, Completion, Pipeline, PipelineBuilder, PipelineHandle};
pub use scheduler::Scheduler;
pub use sink::{DelayedSink, FnSink, Sink};
pub use source::{Cadence, EmitterState, Producer, Source, SourceHandle};
pub use state::{Lifecycle, PipelineState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
