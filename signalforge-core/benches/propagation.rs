//! Propagation benchmarks.
//!
//! Measures signal reads, cached computed reads, diamond propagation,
//! wide fan-out and batched writes.
//!
//! Run with: cargo bench --bench propagation

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use signalforge_core::{batch, Computed, Effect, Signal};

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    let signal = Signal::new(42_u64);
    group.bench_function("signal_get", |b| b.iter(|| black_box(signal.get())));

    let doubled = Computed::new({
        let signal = signal.clone();
        move || signal.get() * 2
    });
    doubled.get();
    group.bench_function("computed_get_cached", |b| b.iter(|| black_box(doubled.get())));

    group.finish();
}

fn bench_diamond(c: &mut Criterion) {
    let source = Signal::new(0_u64);
    let left = Computed::new({
        let source = source.clone();
        move || source.get() + 1
    });
    let right = Computed::new({
        let source = source.clone();
        move || source.get() * 2
    });
    let sink = Computed::new({
        let (left, right) = (left.clone(), right.clone());
        move || left.get() + right.get()
    });
    let effect = Effect::new({
        let sink = sink.clone();
        move || {
            black_box(sink.get());
        }
    });

    let mut next = 0_u64;
    c.bench_function("diamond_write", |b| {
        b.iter(|| {
            next += 1;
            source.set(next);
        })
    });

    effect.dispose();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for width in [10_usize, 100, 1000] {
        let source = Signal::new(0_u64);
        let effects: Vec<Effect> = (0..width)
            .map(|i| {
                let source = source.clone();
                Effect::new(move || {
                    black_box(source.get() + i as u64);
                })
            })
            .collect();

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(next);
            })
        });

        for effect in &effects {
            effect.dispose();
        }
    }

    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let signals: Vec<Signal<u64>> = (0..64).map(|_| Signal::new(0)).collect();
    let total = Computed::new({
        let signals = signals.clone();
        move || signals.iter().map(Signal::get).sum::<u64>()
    });
    let effect = Effect::new({
        let total = total.clone();
        move || {
            black_box(total.get());
        }
    });

    let mut next = 0_u64;
    c.bench_function("batched_writes_64", |b| {
        b.iter(|| {
            next += 1;
            batch(|| {
                for signal in &signals {
                    signal.set(next);
                }
            })
        })
    });

    effect.dispose();
}

criterion_group!(
    benches,
    bench_reads,
    bench_diamond,
    bench_fan_out,
    bench_batched_writes
);
criterion_main!(benches);
