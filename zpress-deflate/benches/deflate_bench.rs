//! Streaming throughput: chunked appends, flush modes and small output slices.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use zpress_core::{CompressStatus, FlushMode};
use zpress_deflate::{DeflateConfig, Deflater, ZlibCompressor};

fn text_like(size: usize) -> Vec<u8> {
    let text = b"The quick brown fox jumps over the lazy dog. \
                 Pack my box with five dozen liquor jugs. \
                 How vexingly quick daft zebras jump! ";
    text.iter().copied().cycle().take(size).collect()
}

fn bench_append_chunks(c: &mut Criterion) {
    let size = 1024 * 1024;
    let data = text_like(size);
    let mut group = c.benchmark_group("append_chunk_size");
    group.throughput(Throughput::Bytes(size as u64));

    for chunk in [512usize, 8 * 1024, 256 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &data, |b, data| {
            b.iter(|| {
                let mut compressor = ZlibCompressor::new(DeflateConfig::default()).unwrap();
                let mut total = 0;
                for piece in data.chunks(chunk) {
                    total += compressor.append(black_box(piece)).unwrap().len();
                }
                total + compressor.flush().unwrap().len()
            });
        });
    }

    group.finish();
}

fn bench_flush_modes(c: &mut Criterion) {
    let size = 1024 * 1024;
    let data = text_like(size);
    let mut group = c.benchmark_group("flush_every_16k");
    group.throughput(Throughput::Bytes(size as u64));

    for (name, sync) in [("none", false), ("sync", true)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| {
                let mut compressor = ZlibCompressor::new(DeflateConfig::default()).unwrap();
                let mut total = 0;
                for piece in data.chunks(16 * 1024) {
                    total += compressor.append(piece).unwrap().len();
                    if sync {
                        total += compressor.sync_flush().unwrap().len();
                    }
                }
                total + compressor.flush().unwrap().len()
            });
        });
    }

    group.finish();
}

fn bench_output_slice(c: &mut Criterion) {
    let size = 256 * 1024;
    let data = text_like(size);
    let mut group = c.benchmark_group("output_slice_size");
    group.throughput(Throughput::Bytes(size as u64));

    for out_size in [64usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(out_size), &data, |b, data| {
            let mut out = vec![0u8; out_size];
            b.iter(|| {
                let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
                let mut pos = 0;
                let mut total = 0;
                loop {
                    let (consumed, produced, status) = deflater
                        .deflate(&data[pos..], &mut out, FlushMode::Finish)
                        .unwrap();
                    pos += consumed;
                    total += produced;
                    if status == CompressStatus::Done {
                        break total;
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_append_chunks, bench_flush_modes, bench_output_slice);
criterion_main!(benches);
