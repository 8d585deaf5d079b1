// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_context::types::HostMap;
use understory_context::{
    Activatable, Consumer, Context, HostId, Provider, Registry, Sources, create_context,
    create_derived_context,
};

/// One provider at the root and `n` consumers directly under it.
fn star(n: usize) -> (HostMap, Registry, Provider<u64>, Vec<Consumer<u64>>) {
    let mut hosts = HostMap::new();
    hosts.insert(HostId(0), None, "root");
    for i in 1..=n as u64 {
        hosts.insert(HostId(i), Some(HostId(0)), "leaf");
    }
    let registry = Registry::new();
    let ctx = create_context(0_u64);
    let provider = ctx.make_provider(&registry, &hosts, HostId(0)).unwrap();
    provider.activate(&hosts);
    let consumers = (1..=n as u64)
        .map(|i| {
            let c = ctx.make_consumer(&registry, &hosts, HostId(i)).unwrap();
            c.activate(&hosts);
            c
        })
        .collect();
    (hosts, registry, provider, consumers)
}

/// A single chain of `depth` hosts: provider at the root, consumer at the leaf.
fn chain(depth: u64) -> (HostMap, Registry, Context<u64>) {
    let mut hosts = HostMap::new();
    hosts.insert(HostId(0), None, "root");
    for i in 1..depth {
        hosts.insert(HostId(i), Some(HostId(i - 1)), "node");
    }
    let registry = Registry::new();
    let ctx = create_context(0_u64);
    let provider = ctx.make_provider(&registry, &hosts, HostId(0)).unwrap();
    provider.activate(&hosts);
    (hosts, registry, ctx)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for &n in &[16usize, 256, 4096] {
        let (_hosts, _registry, provider, consumers) = star(n);
        group.throughput(Throughput::Elements(n as u64));
        let mut next = 0_u64;
        group.bench_function(format!("set_n{}", n), |b| {
            b.iter(|| {
                next += 1;
                provider.set(black_box(next));
            });
        });
        black_box(consumers.last().map(Consumer::value));
    }
    group.finish();
}

fn bench_pairing_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("pairing_depth");
    for &depth in &[4u64, 32, 256] {
        let (hosts, registry, ctx) = chain(depth);
        let leaf = HostId(depth - 1);
        let consumer = ctx.make_consumer(&registry, &hosts, leaf).unwrap();
        group.bench_function(format!("activate_deactivate_d{}", depth), |b| {
            b.iter(|| {
                consumer.activate(&hosts);
                black_box(consumer.is_paired());
                consumer.deactivate();
            });
        });
    }
    group.finish();
}

fn bench_derived(c: &mut Criterion) {
    let mut group = c.benchmark_group("derived");
    for &sources in &[2usize, 8, 32] {
        group.bench_function(format!("recompute_s{}", sources), |b| {
            b.iter_batched(
                || {
                    let mut hosts = HostMap::new();
                    hosts.insert(HostId(0), None, "root");
                    hosts.insert(HostId(1), Some(HostId(0)), "leaf");
                    let registry = Registry::new();
                    let ctxs: Vec<_> = (0..sources).map(|_| create_context(0_u64)).collect();
                    let list = ctxs.iter().fold(Sources::new(), |s, c| s.with(c));
                    let sum = create_derived_context(list, |v| {
                        (0..v.len()).map(|i| *v.get::<u64>(i)).sum::<u64>()
                    });
                    let providers: Vec<_> = ctxs
                        .iter()
                        .map(|c| c.make_provider(&registry, &hosts, HostId(0)).unwrap())
                        .collect();
                    let derived = sum.make_provider(&registry, &hosts, HostId(0)).unwrap();
                    registry.activate_host(HostId(0), &hosts);
                    (hosts, registry, providers, derived)
                },
                |(_hosts, _registry, providers, derived)| {
                    for (i, p) in providers.iter().enumerate() {
                        p.set(i as u64 + 1);
                    }
                    black_box(derived.value());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_pairing_depth, bench_derived);
criterion_main!(benches);
