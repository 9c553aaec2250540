use backflow::{
    source, DelayedSink, FnSink, OverflowPolicy, PipelineBuilder, Scheduler, VirtualClock,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;

/// Fast source into a slow sink, shedding under each drop policy
fn benchmark_drop_policies_high_load(c: &mut Criterion) {
    let scheduler = Scheduler::parallel(2).expect("Scheduler failed");

    for policy in [
        OverflowPolicy::DropNew,
        OverflowPolicy::DropOldest,
        OverflowPolicy::LatestOnly,
    ] {
        c.bench_function(&format!("{policy:?}_2000_items_slow_sink"), |b| {
            b.iter(|| {
                let sink = DelayedSink::new(
                    FnSink::new("slow", |item: u64| {
                        black_box(item);
                        Ok(())
                    }),
                    Duration::from_micros(100),
                );

                let handle = PipelineBuilder::new()
                    .interval(Duration::from_micros(1))
                    .clock(Arc::new(VirtualClock::new()))
                    .buffer(200, policy)
                    .scheduler(scheduler.clone())
                    .build()
                    .expect("Build failed")
                    .start(source::range(0, 2000), sink)
                    .expect("Start failed");

                let _ = handle.await_completion(Duration::from_secs(30));
            });
        });
    }
}

/// Same slow sink, but the source only emits what was requested
fn benchmark_demand_slow_consumer(c: &mut Criterion) {
    let scheduler = Scheduler::parallel(2).expect("Scheduler failed");

    c.bench_function("on_demand_200_items_slow_sink", |b| {
        b.iter(|| {
            let sink = DelayedSink::new(FnSink::new("slow", |_: u64| Ok(())), Duration::from_micros(100));

            let handle = PipelineBuilder::new()
                .on_demand()
                .prefetch(8)
                .buffer(8, OverflowPolicy::Error)
                .scheduler(scheduler.clone())
                .build()
                .expect("Build failed")
                .start(source::range(0, 200), sink)
                .expect("Start failed");

            let _ = handle.await_completion(Duration::from_secs(30));
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(15))
        .sample_size(20);
    targets = benchmark_drop_policies_high_load, benchmark_demand_slow_consumer
);
criterion_main!(benches);
