// ABOUTME: Benchmark suite for frame and message codec performance
// ABOUTME: Measures encode/decode cost for TINIT, RINIT and metadata chunking at representative sizes

use criterion::{criterion_group, criterion_main, black_box, BenchmarkId, Criterion};
use tracecmd_link::frame::{self, Command, META_FRAGMENT_MAX};
use tracecmd_link::message::{Meta, Rinit, Tinit, TinitOption};

fn bench_frame_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_roundtrip");

    let body = vec![0u8; 64];
    group.bench_function("encode_finmeta_sized", |b| {
        b.iter(|| frame::encode_frame(Command::SendMeta, black_box(&body)).unwrap())
    });

    group.finish();
}

fn bench_tinit(c: &mut Criterion) {
    let mut group = c.benchmark_group("tinit");

    let tinit = Tinit {
        cpus: 8,
        page_size: 4096,
        options: vec![TinitOption::use_tcp()],
    };
    let encoded = tinit.encode();

    group.bench_function("encode", |b| b.iter(|| black_box(&tinit).encode()));
    group.bench_function("decode", |b| {
        b.iter(|| Tinit::decode(black_box(&encoded)).unwrap())
    });

    group.finish();
}

fn bench_rinit(c: &mut Criterion) {
    let mut group = c.benchmark_group("rinit");

    for &n in &[1usize, 8, 64, 256] {
        let ports: Vec<u32> = (0..n as u32).map(|i| 40000 + i).collect();
        let rinit = Rinit::new(ports).unwrap();
        let encoded = rinit.encode();

        group.bench_with_input(BenchmarkId::new("encode", n), &rinit, |b, rinit| {
            b.iter(|| rinit.encode())
        });
        group.bench_with_input(BenchmarkId::new("decode", n), &encoded, |b, encoded| {
            b.iter(|| Rinit::decode(black_box(encoded)).unwrap())
        });
    }

    group.finish();
}

fn bench_meta_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("meta_chunking");

    for &blobs in &[1usize, 10, 100] {
        let blob = vec![7u8; blobs * META_FRAGMENT_MAX];
        group.bench_with_input(BenchmarkId::new("chunks", blobs), &blob, |b, blob| {
            b.iter(|| Meta::chunks(black_box(blob)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_roundtrip,
    bench_tinit,
    bench_rinit,
    bench_meta_chunking
);
criterion_main!(benches);
