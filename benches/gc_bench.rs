//! IGC Benchmarks
//!
//! Measures allocation throughput, cycle latency over live and dead heaps,
//! and handle operations. Run with `cargo bench`.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use igc::{gc_new, Gc, GcConfig, Trace, Tracer};

struct Node {
    next: Gc<Node>,
    value: u64,
}

impl Trace for Node {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.visit(&self.next);
    }
}

fn quiet() {
    igc::configure(GcConfig {
        new_gen_obj_cnt_to_gc: 1 << 20,
        old_gen_obj_cnt_to_full_gc: 1 << 20,
        ..Default::default()
    })
    .unwrap();
}

fn bench_allocation(c: &mut Criterion) {
    quiet();
    let mut group = c.benchmark_group("allocation");
    group.throughput(Throughput::Elements(1));

    group.bench_function("gc_new_leaf", |b| {
        b.iter(|| {
            let h = gc_new(|| black_box(42u64)).unwrap();
            black_box(h)
        });
        igc::full_collect();
    });

    group.bench_function("gc_new_node", |b| {
        b.iter(|| {
            let h = gc_new(|| Node {
                next: Gc::null(),
                value: black_box(7),
            })
            .unwrap();
            black_box(h)
        });
        igc::full_collect();
    });

    group.finish();
}

fn bench_collection(c: &mut Criterion) {
    quiet();
    let mut group = c.benchmark_group("collection");

    group.bench_function("young_cycle_dead_heap", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let _ = gc_new(|| Node {
                    next: Gc::null(),
                    value: i,
                })
                .unwrap();
            }
            igc::collect();
        });
    });

    group.bench_function("young_cycle_live_chain", |b| {
        // A rooted chain that survives every cycle.
        let mut head = gc_new(|| Node {
            next: Gc::null(),
            value: 0,
        })
        .unwrap();
        for i in 1..1000 {
            let next = head.clone();
            head = gc_new(move || Node { next, value: i }).unwrap();
        }
        b.iter(|| igc::collect());
        igc::full_collect();
    });

    group.finish();
}

fn bench_handles(c: &mut Criterion) {
    quiet();
    let mut group = c.benchmark_group("handles");
    group.throughput(Throughput::Elements(1));

    let node = gc_new(|| Node {
        next: Gc::null(),
        value: 1,
    })
    .unwrap();

    group.bench_function("clone_drop", |b| {
        b.iter(|| black_box(node.clone()));
    });

    group.bench_function("set", |b| {
        let mut slot = node.clone();
        b.iter(|| slot.set(black_box(&node)));
    });

    group.bench_function("deref", |b| {
        b.iter(|| black_box(node.value));
    });

    group.finish();
}

criterion_group!(benches, bench_allocation, bench_collection, bench_handles);
criterion_main!(benches);
