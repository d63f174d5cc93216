use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shapejson::encode::{to_vec, write_datetime_literal, write_json_string};
use shapejson::{BufferPool, DateTime, EscapeMode, FormatContext, FormatOptions, Value};

// ---------------------------------------------------------------------------
// Test data generators
// ---------------------------------------------------------------------------

fn plain_text(len: usize) -> String {
    (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect()
}

fn escape_heavy_text(len: usize) -> String {
    let mut s = String::with_capacity(len);
    while s.len() < len {
        s.push_str("line\n\ttab \"quoted\" back\\slash ");
    }
    s
}

fn user_value(count: usize) -> Value {
    let items = (0..count)
        .map(|i| {
            Value::Object(vec![
                (Arc::from("id"), Value::Int(i as i64)),
                (Arc::from("name"), Value::Str(format!("user {i}"))),
                (Arc::from("active"), Value::Bool(i % 2 == 0)),
                (Arc::from("score"), Value::Float(i as f64 + 0.5)),
            ])
        })
        .collect();
    Value::Array(items)
}

// ---------------------------------------------------------------------------
// String escaping
// ---------------------------------------------------------------------------

fn bench_escape(c: &mut Criterion) {
    let mut group = c.benchmark_group("escape");
    for len in [64usize, 1024, 16384] {
        let plain = plain_text(len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_with_input(BenchmarkId::new("plain", len), &plain, |b, s| {
            b.iter(|| {
                let mut out = Vec::with_capacity(s.len() + 2);
                write_json_string(black_box(s), &mut out, EscapeMode::Json).unwrap();
                out.len()
            })
        });

        let heavy = escape_heavy_text(len);
        group.throughput(Throughput::Bytes(heavy.len() as u64));
        group.bench_with_input(BenchmarkId::new("escaped", len), &heavy, |b, s| {
            b.iter(|| {
                let mut out = Vec::with_capacity(s.len() * 2);
                write_json_string(black_box(s), &mut out, EscapeMode::Json).unwrap();
                out.len()
            })
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Value trees and packed date literals
// ---------------------------------------------------------------------------

fn bench_encode_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_value");
    let ctx = FormatContext::default();
    let value = user_value(100);

    group.bench_function("user_docs_100_compact", |b| {
        b.iter(|| to_vec(black_box(&value), FormatOptions::compact(&ctx)).unwrap())
    });
    group.bench_function("user_docs_100_pretty", |b| {
        b.iter(|| to_vec(black_box(&value), FormatOptions::pretty(&ctx)).unwrap())
    });

    let pool = BufferPool::new(64 * 1024);
    group.bench_function("user_docs_100_pooled", |b| {
        b.iter(|| {
            let mut buf = pool.acquire();
            shapejson::encode::write_value(black_box(&value), &mut *buf, FormatOptions::compact(&ctx))
                .unwrap();
            buf.len()
        })
    });

    let dt = DateTime {
        year: 2024,
        month: 3,
        day: 9,
        hour: 7,
        minute: 5,
        second: 1,
        nanos: 0,
    };
    group.bench_function("datetime_literal", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(24);
            write_datetime_literal(black_box(&dt), b' ', &mut out).unwrap();
            out.len()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_escape, bench_encode_value);
criterion_main!(benches);
