//! Performance benchmarks for PCM conversion and summation
//!
//! Run with: cargo bench -p engine_format

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use engine_format::{convert, mix_sum, AudioFormat, SampleLayout};

fn benchmark_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");

    let src_format = AudioFormat::new(2, 44_100, SampleLayout::Float32, None).unwrap();
    let dst_format = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();

    for frames in [256usize, 1024, 4096] {
        group.throughput(Throughput::Elements(frames as u64));
        let src = vec![0u8; frames * src_format.block_size()];
        let mut scratch = Vec::new();

        group.bench_function(format!("resample_{}_frames", frames), |b| {
            b.iter(|| {
                convert(black_box(&src), &src_format, &dst_format, &mut scratch).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_mix_sum(c: &mut Criterion) {
    let format = AudioFormat::new(2, 48_000, SampleLayout::Float32, None).unwrap();
    let mut dst = vec![0u8; 4096 * format.block_size()];
    let src = vec![0u8; 4096 * format.block_size()];

    c.bench_function("mix_sum_4096_frames", |b| {
        b.iter(|| {
            mix_sum(black_box(&mut dst), black_box(&src), &format).unwrap();
        });
    });
}

criterion_group!(benches, benchmark_convert, benchmark_mix_sum);
criterion_main!(benches);
