//! Benchmarks for marshaling batch prediction inputs

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use catboost_dispatch::{CStringArray, CStringMatrix, FloatMatrix};

fn float_rows(docs: usize, columns: usize) -> Vec<Vec<f32>> {
    (0..docs)
        .map(|d| (0..columns).map(|c| (d * columns + c) as f32).collect())
        .collect()
}

fn cat_rows(docs: usize, columns: usize) -> Vec<Vec<String>> {
    (0..docs)
        .map(|d| (0..columns).map(|c| format!("cat_{}_{}", d, c)).collect())
        .collect()
}

/// Benchmark building float row tables for varying batch sizes
fn bench_float_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("float_matrix");

    for &docs in &[1, 64, 1024, 16384] {
        let rows = float_rows(docs, 32);
        group.throughput(Throughput::Elements(docs as u64));

        group.bench_function(format!("{}_docs", docs), |b| {
            b.iter(|| {
                let matrix = FloatMatrix::from_rows(&rows).unwrap();
                black_box(matrix.as_ptr().unwrap());
            })
        });
    }

    group.finish();
}

/// Benchmark building and freeing categorical string tables
fn bench_string_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("string_matrix");

    for &docs in &[1, 64, 1024] {
        let rows = cat_rows(docs, 8);
        group.throughput(Throughput::Elements(docs as u64));

        group.bench_function(format!("{}_docs", docs), |b| {
            b.iter(|| {
                let matrix = CStringMatrix::from_rows(&rows).unwrap();
                black_box(matrix.as_ptr().unwrap());
            })
        });
    }

    group.finish();
}

/// Benchmark a single document's categorical row
fn bench_string_array(c: &mut Criterion) {
    let row: Vec<String> = (0..16).map(|i| format!("value_{}", i)).collect();

    c.bench_function("string_array_16", |b| {
        b.iter(|| {
            let array = CStringArray::from_strs(&row).unwrap();
            black_box(array.as_ptr().unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_float_matrix,
    bench_string_matrix,
    bench_string_array
);
criterion_main!(benches);
