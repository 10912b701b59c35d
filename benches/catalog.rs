// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for catalog DDL and dependency tracking.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tantalumdb::catalog::{mangle_name, unmangle_name, CatalogType, CreateInfo, QualifiedName};
use tantalumdb::txn::TransactionManager;

fn table(name: &str) -> QualifiedName {
    QualifiedName::new(CatalogType::Table, "main", name)
}

/// Creates a table and a chain of `depth` views stacked on it.
fn create_view_chain(manager: &TransactionManager, depth: usize) {
    let catalog = manager.catalog();
    let mut txn = manager.begin();
    catalog
        .create_entry(&mut txn, CreateInfo::new(CatalogType::Table, "main", "base"))
        .unwrap();
    let mut previous = table("base");
    for i in 0..depth {
        let name = format!("v{i}");
        let info = CreateInfo::new(CatalogType::View, "main", name.clone()).with_dependency(previous);
        catalog.create_entry(&mut txn, info).unwrap();
        previous = QualifiedName::new(CatalogType::View, "main", name);
    }
    manager.commit(&mut txn).unwrap();
}

fn bench_mangle(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");
    group.throughput(Throughput::Elements(1));

    group.bench_function("mangle_unmangle", |b| {
        b.iter(|| {
            let key = mangle_name(CatalogType::Index, "my/schema", "idx\\name");
            black_box(unmangle_name(&key).unwrap())
        })
    });

    group.finish();
}

fn bench_create_commit(c: &mut Criterion) {
    let manager = TransactionManager::default();
    let catalog = manager.catalog();
    let counter = std::sync::atomic::AtomicU64::new(0);

    let mut group = c.benchmark_group("catalog");
    group.throughput(Throughput::Elements(1));

    group.bench_function("create_commit", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let mut txn = manager.begin();
            catalog
                .create_entry(&mut txn, CreateInfo::new(CatalogType::Table, "main", format!("t{i}")))
                .unwrap();
            black_box(manager.commit(&mut txn).unwrap())
        })
    });

    group.finish();
}

fn bench_cascade_drop(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog");
    group.throughput(Throughput::Elements(100));

    group.bench_function("cascade_drop_100_views", |b| {
        b.iter_batched(
            || {
                let manager = TransactionManager::default();
                create_view_chain(&manager, 100);
                manager
            },
            |manager| {
                let mut txn = manager.begin();
                let dropped = manager
                    .catalog()
                    .drop_entry(&mut txn, CatalogType::Table, "main", "base", true)
                    .unwrap();
                manager.commit(&mut txn).unwrap();
                black_box(dropped)
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_scan_dependencies(c: &mut Criterion) {
    let manager = TransactionManager::default();
    create_view_chain(&manager, 1000);
    let reader = manager.begin();

    let mut group = c.benchmark_group("catalog");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("scan_1000_edges", |b| {
        b.iter(|| {
            let mut edges = 0usize;
            manager.catalog().scan_dependencies(&reader, |_, _, _| edges += 1);
            black_box(edges)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_mangle,
    bench_create_commit,
    bench_cascade_drop,
    bench_scan_dependencies,
);

criterion_main!(benches);
