//! # Chain Benchmarks
//!
//! Performance benchmarks for flowcore-core chain and law operations.
//!
//! Run with: `cargo bench -p flowcore-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use flowcore_core::{
    Context, Event, EventChain, Flow, FlowLaw, ManualClock, ParticleStore, Payload, Timestamp,
};
use std::hint::black_box;
use std::sync::Arc;

fn ctx() -> Context {
    Context::new("bench", Timestamp(0)).with_persona("scribe")
}

/// Create a chain with N dispatched events.
fn create_chain(size: usize) -> EventChain {
    let mut chain = EventChain::with_clock(Arc::new(ManualClock::frozen(Timestamp(0))));
    for i in 0..size {
        let event = Event::new(
            chain.next_event_id(),
            "bench.tick",
            Payload::map([("n", Payload::Int(i as i64))]),
            Timestamp(i as u64),
        );
        chain.append(event, &ctx()).expect("append");
    }
    chain
}

/// Create a store with N particles, every third one collapsed.
fn create_store(size: usize) -> ParticleStore {
    let mut store = ParticleStore::with_clock(Arc::new(ManualClock::ticking(Timestamp(0), 1)));
    for i in 0..size {
        let id = store.create("content", &ctx(), None).id();
        if i % 3 == 0 {
            store.collapse(id, "bench", None).expect("collapse");
        }
    }
    store
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_append");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_chain(size)));
        });
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_verify");

    for size in [100, 1000, 10000].iter() {
        let chain = create_chain(*size);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(chain.verify()));
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    c.bench_function("flow_dispatch", |b| {
        let flow = Flow::builder()
            .clock(Arc::new(ManualClock::frozen(Timestamp(0))))
            .build();
        b.iter(|| black_box(flow.dispatch("bench.tick", Payload::Int(1), &ctx())));
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("law_evaluate");
    let law = FlowLaw::standard();

    for size in [100, 1000, 10000].iter() {
        let listing = create_store(*size).list();

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(law.evaluate(&listing, None)));
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_replay");

    for size in [100, 1000].iter() {
        let flow = Flow::builder()
            .clock(Arc::new(ManualClock::ticking(Timestamp(0), 1)))
            .build();
        for _ in 0..*size {
            let id = flow.create("content", &ctx(), None).expect("create").id();
            flow.collapse(id, "bench", None, &ctx()).expect("collapse");
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(flow.replay()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_append,
    bench_verify,
    bench_dispatch,
    bench_evaluate,
    bench_replay,
);
criterion_main!(benches);
