//! Signal Conditioning Benchmarks
//!
//! Benchmarks for the per-run conditioning path:
//! - Median filtering
//! - Acceleration estimation
//! - Noise-floor estimation
//! - Feedforward fitting
//!
//! Run with: `cargo bench`
//! View HTML reports in: `target/criterion/`

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use yantra_sysid::{
    apply_median_filter, calculate_feedforward_gains, compute_acceleration, noise_floor, Dataset,
    MechanismTest, RawSample,
};

// ============================================================================
// Test Fixtures
// ============================================================================

/// A ramp run with a deterministic noise pattern on the velocity channel.
fn create_ramp_run(n: usize) -> Vec<RawSample> {
    (0..n)
        .map(|i| {
            let t = i as f64 * 0.005;
            let velocity = 0.3 + 0.8 * t + 0.02 * ((i as f64) * 1.3).sin();
            RawSample {
                timestamp: t,
                voltage: 0.5 + 2.0 * velocity,
                position: velocity * t,
                velocity,
            }
        })
        .collect()
}

fn bench_median_filter(c: &mut Criterion) {
    let run = create_ramp_run(10_000);

    let mut group = c.benchmark_group("median_filter");
    for window in [3, 9, 15] {
        group.bench_function(format!("window_{window}"), |b| {
            b.iter(|| apply_median_filter(black_box(&run), window).unwrap())
        });
    }
    group.finish();
}

fn bench_acceleration(c: &mut Criterion) {
    let run = create_ramp_run(10_000);

    c.bench_function("compute_acceleration", |b| {
        b.iter(|| compute_acceleration(black_box(&run), 9).unwrap())
    });
}

fn bench_noise_floor(c: &mut Criterion) {
    let run = create_ramp_run(10_000);
    let prepared = compute_acceleration(&run, 9).unwrap();

    c.bench_function("noise_floor", |b| {
        b.iter(|| noise_floor(black_box(&prepared), 9, |pt| pt.acceleration))
    });
}

fn bench_feedforward_fit(c: &mut Criterion) {
    let run = create_ramp_run(10_000);
    let prepared = compute_acceleration(&run, 9).unwrap();
    let half = prepared.len() / 2;
    let dataset = Dataset::new(prepared[..half].to_vec(), prepared[half..].to_vec());

    c.bench_function("feedforward_fit", |b| {
        b.iter(|| calculate_feedforward_gains(black_box(&dataset), MechanismTest::Simple).unwrap())
    });
}

criterion_group!(
    benches,
    bench_median_filter,
    bench_acceleration,
    bench_noise_floor,
    bench_feedforward_fit
);
criterion_main!(benches);
