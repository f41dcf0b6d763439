//! Forward-pass throughput of the three mechanisms.
//! Run with: `cargo bench -p attention --bench mechanisms`

use attention::{build, AttentionConfig, AttentionKind};
use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_mechanisms(c: &mut Criterion) {
    let device = Device::Cpu;
    let batch = 16usize;
    let hidden = 256usize;
    let seq_lengths = [16usize, 64, 256];

    for kind in AttentionKind::ALL {
        let attention =
            build(kind, AttentionConfig::square(hidden), &device).expect("build mechanism");
        let mut group = c.benchmark_group(format!("attention/{kind}"));
        for &seq_len in &seq_lengths {
            let query = Tensor::randn(0f32, 1.0, (batch, hidden), &device).expect("query");
            let value =
                Tensor::randn(0f32, 1.0, (batch, seq_len, hidden), &device).expect("value");
            group.throughput(Throughput::Elements((batch * seq_len * hidden) as u64));
            group.bench_with_input(
                BenchmarkId::from_parameter(seq_len),
                &(query, value),
                |b, (query, value)| {
                    b.iter(|| {
                        black_box(
                            attention
                                .compute(black_box(query), black_box(value))
                                .expect("compute"),
                        )
                    });
                },
            );
        }
        group.finish();
    }
}

criterion_group!(benches, bench_mechanisms);
criterion_main!(benches);
