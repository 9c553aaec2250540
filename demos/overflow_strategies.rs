//! Backpressure strategies side by side
//!
//! Scenarios:
//! 1. Demand: the subscriber requests one item at a time from a range
//! 2. Error: a 1ms ticker overruns a 5ms consumer and the pipeline fails
//! 3. Drop new: the same mismatch, excess items are dropped
//! 4. Latest only: the consumer always sees the newest tick
//! 5. Buffer of 2, dropping the newest item on overflow
//! 6. Buffer of 2, dropping the oldest item on overflow
//!
//! Usage: RUST_LOG=info cargo run --example overflow_strategies --release

use backflow::{
    source, Completion, DelayedSink, FnSink, OverflowPolicy, PipelineBuilder, Result,
};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn slow_sink(processing: Duration) -> DelayedSink<impl backflow::Sink<u64>> {
    DelayedSink::new(
        FnSink::new("logger", |item: u64| {
            tracing::info!(item, "# onNext");
            Ok(())
        }),
        processing,
    )
}

fn demand_driven() -> Result<()> {
    let handle = PipelineBuilder::new()
        .on_demand()
        .prefetch(1)
        .buffer(1, OverflowPolicy::Error)
        .workers(1)
        .build()?
        .start(source::range(1, 5), slow_sink(Duration::from_millis(200)))?;

    let completion = handle.await_completion(Duration::from_secs(5));
    tracing::info!(?completion, metrics = %handle.metrics().format(), "demand scenario done");
    Ok(())
}

fn uncontrolled(
    policy: OverflowPolicy,
    capacity: usize,
    period: Duration,
    processing: Duration,
    run_for: Duration,
) -> Result<()> {
    let handle = PipelineBuilder::new()
        .interval(period)
        .buffer(capacity, policy)
        .workers(2)
        .on_item_dropped(|item: &u64| tracing::info!(item, "** Overflow & Dropped **"))
        .on_error(|error| tracing::error!(%error, "# onError"))
        .build()?
        .start(source::counter(), slow_sink(processing))?;

    match handle.await_completion(run_for) {
        Completion::TimedOut => handle.stop(),
        Completion::Failed(error) => tracing::warn!(%error, "pipeline failed"),
        Completion::Completed => {}
    }
    tracing::info!(?policy, metrics = %handle.metrics().format(), "scenario done");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    println!("1. Demand-driven range");
    demand_driven()?;

    let tick = Duration::from_millis(1);
    let work = Duration::from_millis(5);
    let run_for = Duration::from_secs(2);

    println!("\n2. Error on overflow");
    uncontrolled(OverflowPolicy::Error, 256, tick, work, run_for)?;

    println!("\n3. Drop new items");
    uncontrolled(OverflowPolicy::DropNew, 256, tick, work, run_for)?;

    println!("\n4. Latest only");
    uncontrolled(OverflowPolicy::LatestOnly, 1, tick, work, run_for)?;

    let tick = Duration::from_millis(300);
    let work = Duration::from_secs(1);
    let run_for = Duration::from_secs(3);

    println!("\n5. Buffer of 2, drop newest");
    uncontrolled(OverflowPolicy::DropNew, 2, tick, work, run_for)?;

    println!("\n6. Buffer of 2, drop oldest");
    uncontrolled(OverflowPolicy::DropOldest, 2, tick, work, run_for)?;

    Ok(())
}
