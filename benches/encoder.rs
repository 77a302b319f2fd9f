//! Result Encoder Benchmarks
//!
//! Measures flattening of result sets of increasing size:
//! - Single-column results
//! - Wide rows with mixed value types
//! - Large result sets

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use slotgate::encoder::encode_rows;

fn mixed_rows(count: usize) -> Vec<Vec<Value>> {
    (0..count)
        .map(|i| vec![json!(i), json!(format!("item {i}")), json!(i as f64 * 0.25), json!(i % 2 == 0), Value::Null])
        .collect()
}

fn bench_single_column(c: &mut Criterion) {
    let rows: Vec<Vec<Value>> = (0..100).map(|i| vec![json!(format!("value {i}"))]).collect();

    c.bench_function("encode_single_column_100", |b| {
        b.iter(|| encode_rows(black_box(&rows)));
    });
}

fn bench_mixed_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_mixed");

    for count in [10, 1_000, 10_000] {
        let rows = mixed_rows(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &rows, |b, rows| {
            b.iter(|| encode_rows(black_box(rows)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_single_column, bench_mixed_rows);
criterion_main!(benches);
