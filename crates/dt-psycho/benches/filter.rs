//! Masked filter benchmarks
//!
//! Transform, mask construction and full forward/backward passes over
//! utterance-length signals.

use std::path::Path;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use dt_core::Result;
use dt_psycho::{MaskBuilder, MaskedFilter, SpectralTransform, ThresholdCache, ThresholdSurface};

const SAMPLE_RATE: f64 = 16000.0;
const DURATIONS_SEC: &[usize] = &[1, 5, 15];

/// Generate test audio (440Hz sine wave plus a quieter 3 kHz partial)
fn generate_test_audio(samples: usize) -> Vec<f64> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            (2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0
                + (2.0 * std::f64::consts::PI * 3000.0 * t).sin() * 500.0
        })
        .collect()
}

fn surface_for(samples: usize) -> ThresholdSurface {
    let frames = SpectralTransform::new().num_frames(samples) + 8;
    ThresholdSurface::from_fn(frames, 256, |_, band| 40.0 + band as f64 * 0.1).unwrap()
}

fn filter() -> MaskedFilter {
    MaskedFilter::new(ThresholdCache::in_memory(
        |_: &Path, _: &Path| -> Result<ThresholdSurface> { panic!("estimator must not run") },
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFORM BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("STFT");

    for &secs in DURATIONS_SEC {
        let samples = secs * SAMPLE_RATE as usize;
        let input = generate_test_audio(samples);

        for threads in [1usize, 4] {
            let transform = SpectralTransform::with_threads(threads).unwrap();
            let spectrum = transform.forward(&input).unwrap();

            group.bench_with_input(
                BenchmarkId::new(format!("forward/{}t", threads), secs),
                &input,
                |b, input| b.iter(|| black_box(transform.forward(black_box(input)).unwrap())),
            );
            group.bench_with_input(
                BenchmarkId::new(format!("inverse/{}t", threads), secs),
                &spectrum,
                |b, spectrum| b.iter(|| black_box(transform.inverse(black_box(spectrum), samples).unwrap())),
            );
        }
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// MASK BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("Mask");
    let builder = MaskBuilder::new();

    for &secs in DURATIONS_SEC {
        let samples = secs * SAMPLE_RATE as usize;
        let spectrum = SpectralTransform::new().forward(&generate_test_audio(samples)).unwrap();
        let surface = surface_for(samples);

        group.bench_with_input(BenchmarkId::new("build", secs), &spectrum, |b, spectrum| {
            b.iter(|| black_box(builder.build(black_box(spectrum), &surface, 0).unwrap()))
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILTER BENCHMARKS
// ═══════════════════════════════════════════════════════════════════════════════

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("Masked Filter");
    let filter = filter();

    for &secs in DURATIONS_SEC {
        let samples = secs * SAMPLE_RATE as usize;
        let input = generate_test_audio(samples);
        let grad = vec![1.0; samples];
        let surface = surface_for(samples);

        group.bench_with_input(BenchmarkId::new("forward", secs), &input, |b, input| {
            b.iter(|| black_box(filter.forward_with_surface(black_box(input), &surface, 0).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("backward", secs), &input, |b, input| {
            b.iter(|| {
                black_box(
                    filter
                        .backward_with_surface(black_box(&grad), input, &surface, 0)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transform, bench_mask, bench_filter);

criterion_main!(benches);
