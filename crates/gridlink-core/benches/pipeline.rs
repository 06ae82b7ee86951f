//! Hot path benchmarks for gridlink-core.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gridlink_core::hooks::{HookConfig, HookContext, HookList, HookRegistry};
use gridlink_core::{OverflowPolicy, SampleFlags, SamplePool, SampleQueue, SignalData, SignalList};
use std::sync::Arc;

const BATCH: usize = 64;

fn bench_pool(c: &mut Criterion) {
    let pool = SamplePool::new(BATCH, 16);

    let mut group = c.benchmark_group("pool");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("allocate_freeze_release_64", |b| {
        let mut batch = Vec::with_capacity(BATCH);
        b.iter(|| {
            pool.allocate_into(&mut batch, BATCH);
            let frozen: Vec<_> = batch.drain(..).map(|s| s.freeze()).collect();
            black_box(frozen)
        })
    });
    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let pool = SamplePool::new(BATCH, 16);
    let queue = SampleQueue::new(BATCH, OverflowPolicy::DropOldest);
    let mut batch = Vec::with_capacity(BATCH);
    pool.allocate_into(&mut batch, BATCH);
    let samples: Vec<_> = batch.into_iter().map(|s| s.freeze()).collect();

    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("push_peek_consume_64", |b| {
        let mut out = Vec::with_capacity(BATCH);
        b.iter(|| {
            queue.push_batch(black_box(&samples));
            out.clear();
            if let Some(first) = queue.peek_into(&mut out, BATCH) {
                queue.consume(first, out.len());
            }
        })
    });
    group.finish();
}

fn bench_hooks(c: &mut Criterion) {
    let registry = HookRegistry::with_builtin_hooks();
    let configs = vec![
        HookConfig::new("scale").with_param("signal", 0).with_param("scale", 2.0),
        HookConfig::new("stats"),
    ];
    let mut hooks = HookList::new(HookContext::Path);
    hooks.parse(&registry, &configs, true).unwrap();
    hooks.prepare(Arc::new(SignalList::generic(8))).unwrap();
    hooks.start();

    let pool = SamplePool::new(BATCH, 8);
    let values = vec![SignalData::Float(1.0); 8];
    let mut sequence = 0u64;

    let mut group = c.benchmark_group("hooks");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.bench_function("builtin_scale_stats_64", |b| {
        let mut batch = Vec::with_capacity(BATCH);
        b.iter(|| {
            batch.clear();
            pool.allocate_into(&mut batch, BATCH);
            for smp in &mut batch {
                smp.sequence = sequence;
                smp.flags = SampleFlags::HAS_SEQUENCE | SampleFlags::HAS_DATA;
                smp.set_values(&values);
                sequence += 1;
            }
            black_box(hooks.process(&mut batch))
        })
    });
    group.finish();
}

criterion_group!(benches, bench_pool, bench_queue, bench_hooks);
criterion_main!(benches);
