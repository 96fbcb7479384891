//! Benchmarks for the dependency graph: linking, notification fan-out,
//! lifecycle teardown and list reconciliation.
//!
//! Run with: cargo bench -p weave-core

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use weave_core::graph;
use weave_core::list::List;
use weave_core::reactive::{Atom, Effect, Lifecycle};
use weave_core::render::{each_proxied, MemoryAdapter, Options, Renderer, View};

fn bench_link_unlink(c: &mut Criterion) {
    let lifecycle = Lifecycle::root();
    let source = graph::create_source();

    c.bench_function("graph/link_unlink", |b| {
        b.iter(|| {
            let edge = graph::link(lifecycle.scope(), source, 0, graph::callback(|_, _, _| {}));
            graph::unlink(black_box(edge)).unwrap();
        })
    });
}

fn bench_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/notify");

    for subscribers in [1u64, 100, 10_000] {
        group.throughput(Throughput::Elements(subscribers));

        let lifecycle = Lifecycle::root();
        let atom = Atom::new(0u64);
        let effects: Vec<Effect> = (0..subscribers)
            .map(|_| {
                let atom = atom.clone();
                Effect::new(&lifecycle, move || {
                    black_box(atom.get());
                })
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &atom, |b, atom| {
            b.iter(|| atom.update(|value| value + 1))
        });

        drop(effects);
        lifecycle.notify_unmounted();
    }

    group.finish();
}

fn bench_teardown(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph/teardown");

    for edges in [10usize, 1_000] {
        group.throughput(Throughput::Elements(edges as u64));
        let sources: Vec<_> = (0..edges).map(|_| graph::create_source()).collect();

        group.bench_with_input(BenchmarkId::from_parameter(edges), &sources, |b, sources| {
            b.iter(|| {
                let lifecycle = Lifecycle::root();
                for source in sources {
                    graph::link(lifecycle.scope(), *source, 0, graph::callback(|_, _, _| {}));
                }
                lifecycle.notify_unmounted();
            })
        });

        for source in sources {
            graph::release_source(source);
        }
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let renderer = Renderer::with_options(MemoryAdapter::new(), Options { debug_anchors: false });
    let root = renderer.adapter().root();
    let list: List<u32> = (0..1_000).collect();

    let rows = list.clone();
    renderer
        .mount(&root, move || each_proxied(&rows, |item: &Atom<u32>| View::bind_text(item.clone())))
        .unwrap();

    c.bench_function("render/reconcile_swap", |b| {
        b.iter(|| {
            list.batch(|tx| {
                let first = tx.remove(0)?;
                tx.push(first);
                Ok(())
            })
            .unwrap();
        })
    });
}

criterion_group!(benches, bench_link_unlink, bench_notify, bench_teardown, bench_reconcile);
criterion_main!(benches);
