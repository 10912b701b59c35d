// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for commit and garbage collection of row versions.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::sync::Arc;
use tantalumdb::storage::{DataTable, HashIndex, Row, RowId, Value};
use tantalumdb::txn::{TransactionManager, TxnConfig};

fn create_test_table(manager: &TransactionManager, rows: i64, indexed: bool) -> (Arc<DataTable>, Vec<RowId>) {
    let table = Arc::new(DataTable::new("bench", 2));
    if indexed {
        table.add_index(Arc::new(HashIndex::new("bench_idx", 0))).unwrap();
    }
    let mut txn = manager.begin();
    let ids = (0..rows)
        .map(|i| {
            let row = Row::new(vec![Value::from(i), Value::from("payload")]);
            table.append(&mut txn, row).unwrap()
        })
        .collect();
    manager.commit(&mut txn).unwrap();
    (table, ids)
}

fn bench_commit(c: &mut Criterion) {
    let manager = TransactionManager::new(TxnConfig::new().with_cleanup_on_commit(false));
    let table = Arc::new(DataTable::new("bench", 2));

    let mut group = c.benchmark_group("txn");
    group.throughput(Throughput::Elements(100));

    group.bench_function("commit_100_appends", |b| {
        b.iter_batched(
            || {
                let mut txn = manager.begin();
                for i in 0..100 {
                    table
                        .append(&mut txn, Row::new(vec![Value::from(i), Value::from("x")]))
                        .unwrap();
                }
                txn
            },
            |mut txn| black_box(manager.commit(&mut txn).unwrap()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
    manager.collect_garbage().unwrap();
}

fn bench_cleanup_deletes(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleanup");
    group.throughput(Throughput::Elements(5000));

    for (name, indexed) in [("delete_5000", false), ("delete_5000_indexed", true)] {
        group.bench_function(name, |b| {
            b.iter_batched(
                || {
                    let manager = TransactionManager::new(TxnConfig::new().with_cleanup_on_commit(false));
                    let (table, ids) = create_test_table(&manager, 5000, indexed);
                    manager.collect_garbage().unwrap();
                    let mut txn = manager.begin();
                    for id in ids {
                        table.delete(&mut txn, id).unwrap();
                    }
                    manager.commit(&mut txn).unwrap();
                    (manager, table)
                },
                |(manager, table)| {
                    let stats = manager.collect_garbage().unwrap();
                    black_box((stats, table))
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_cleanup_batch_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("cleanup");
    group.throughput(Throughput::Elements(5000));

    for batch in [64usize, 1024, 8192] {
        group.bench_function(format!("update_5000_batch_{batch}"), |b| {
            b.iter_batched(
                || {
                    let config = TxnConfig::new()
                        .with_cleanup_on_commit(false)
                        .with_cleanup_batch_size(batch);
                    let manager = TransactionManager::new(config);
                    let (table, ids) = create_test_table(&manager, 5000, true);
                    manager.collect_garbage().unwrap();
                    let mut txn = manager.begin();
                    for (i, id) in ids.into_iter().enumerate() {
                        let row = Row::new(vec![Value::from(i as i64 + 5000), Value::from("new")]);
                        table.update(&mut txn, id, row).unwrap();
                    }
                    manager.commit(&mut txn).unwrap();
                    (manager, table)
                },
                |(manager, table)| black_box((manager.collect_garbage().unwrap(), table)),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_snapshot_scan(c: &mut Criterion) {
    let manager = TransactionManager::new(TxnConfig::new().with_cleanup_on_commit(false));
    let (table, ids) = create_test_table(&manager, 1000, false);
    let reader = manager.begin();

    // Stack one update per row behind the reader's snapshot
    let mut txn = manager.begin();
    for id in &ids {
        table
            .update(&mut txn, *id, Row::new(vec![Value::from(-1), Value::from("newer")]))
            .unwrap();
    }
    manager.commit(&mut txn).unwrap();

    let mut group = c.benchmark_group("storage");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("scan_1000_old_snapshot", |b| {
        b.iter(|| black_box(table.scan(reader.snapshot()).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_commit,
    bench_cleanup_deletes,
    bench_cleanup_batch_size,
    bench_snapshot_scan,
);

criterion_main!(benches);
