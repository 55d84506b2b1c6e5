// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for `understory_context`: discovery and cascades.

use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use understory_context::{ContextTree, Property, PropertyRegistry, PropertySpecBuilder};

/// A host tree stored as parent links; node 0 is the root.
struct Host {
    parents: Vec<Option<u32>>,
}

impl Host {
    /// Every node below `(i - 1) / fanout`.
    fn balanced(len: u32, fanout: u32) -> Self {
        let parents = (0..len)
            .map(|i| if i == 0 { None } else { Some((i - 1) / fanout) })
            .collect();
        Self { parents }
    }

    fn parent(&self, node: u32) -> Option<u32> {
        self.parents[node as usize]
    }

    fn len(&self) -> u32 {
        self.parents.len() as u32
    }
}

struct Fixture {
    tree: ContextTree<u32>,
    scale: Property<u32>,
    label: Property<String>,
}

fn fixture(host: &Host) -> Fixture {
    let mut tree = ContextTree::with_capacity(PropertyRegistry::new(), host.len() as usize);
    let scale = tree.define(
        "Scale",
        PropertySpecBuilder::new()
            .recursive(true)
            .default_value(1_u32)
            .build(),
    );
    let label = tree.define(
        "Label",
        PropertySpecBuilder::<u32, String>::new()
            .dep(scale)
            .compute(move |cx| format!("{}x{}", cx.node(), cx.dep(scale)))
            .build(),
    );
    tree.get(0).set_is_root(true);
    for node in 1..host.len() {
        tree.get(node).discover();
    }
    Fixture { tree, scale, label }
}

fn tracked(host: &Host) -> Fixture {
    let mut fixture = fixture(host);
    let lookup = |node: u32| host.parent(node);
    for node in 0..host.len() {
        fixture.tree.get(node).values().subscribe(fixture.label, |label| {
            black_box(label);
        });
    }
    fixture.tree.drain(&lookup).expect("no fallible properties");
    fixture
}

fn bench_discovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_discovery");
    for &len in &[1_000_u32, 10_000] {
        let host = Host::balanced(len, 8);
        group.bench_with_input(BenchmarkId::new("balanced8", len), &host, |b, host| {
            let lookup = |node: u32| host.parent(node);
            b.iter_batched(
                || fixture(host),
                |mut fixture| {
                    let report = fixture.tree.drain(&lookup).expect("no compute");
                    black_box(report);
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_cascade");
    for &(name, fanout) in &[("wide", 64_u32), ("deep", 1)] {
        let host = Host::balanced(2_000, fanout);
        let lookup = |node: u32| host.parent(node);
        let mut fixture = tracked(&host);
        let mut next = 2_u32;
        group.bench_function(BenchmarkId::new("root_write", name), |b| {
            b.iter(|| {
                next += 1;
                fixture.tree.get(0).values().set(fixture.scale, "bench", next);
                let report = fixture.tree.drain(&lookup).expect("no compute");
                black_box(report);
            });
        });
        group.bench_function(BenchmarkId::new("idle_drain", name), |b| {
            b.iter(|| black_box(fixture.tree.drain(&lookup).expect("no compute")));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_discovery, bench_cascade);
criterion_main!(benches);
