//! Benchmark suite for tick feature performance.
//!
//! Run with: `cargo bench`
//!
//! This benchmark measures:
//! - Timeframe grouping throughput
//! - Skew and gradient per window
//! - Full feature group computation
//! - Delta append with retention

use chrono::{Duration, NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tick_features::{
    buffer::RetentionPolicy,
    config::AgentConfig,
    features::{gradient, group_by_timeframe, stats, FeatureEngine},
    time::Timeframe,
    Tick, TickWindow,
};

const PIP: f64 = 1e-4;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 4)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Create a synthetic quote stream, one tick every `step_ms`.
fn create_ticks(count: usize, step_ms: i64) -> Vec<Tick> {
    let t0 = start();
    (0..count)
        .map(|i| {
            // Slow drift with a saw-tooth wiggle
            let bid = 1.1 + (i as f64) * 1e-7 + ((i % 13) as f64 - 6.0) * 1e-5;
            let flags = [2, 4, 6][i % 3];
            Tick::quote(t0 + Duration::milliseconds(i as i64 * step_ms), bid, bid + 0.00015, flags)
        })
        .collect()
}

/// Benchmark bucketing on the action grid.
fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouping");
    let tf = Timeframe::from_secs(10);
    let off = Timeframe::from_secs(3);

    for count in [1_000, 10_000, 100_000].iter() {
        let ticks = create_ticks(*count, 250);

        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::new("group_by_timeframe", count), &ticks, |b, ticks| {
            b.iter(|| black_box(group_by_timeframe(black_box(ticks), tf, off)).len())
        });
    }

    group.finish();
}

/// Benchmark gated window statistics.
fn bench_window_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_stats");

    for len in [10, 100, 1_000].iter() {
        let ticks = create_ticks(*len, 250);
        let bids: Vec<f64> = ticks.iter().map(|t| t.bid).collect();

        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("skew", len), &bids, |b, bids| {
            b.iter(|| stats::skew(black_box(bids), PIP, stats::DEFAULT_MIN_NUM))
        });
        group.bench_with_input(BenchmarkId::new("gradient", len), &ticks, |b, ticks| {
            b.iter(|| gradient::gradient_ticks(black_box(ticks), |t| t.bid, PIP, stats::DEFAULT_MIN_NUM))
        });
    }

    group.finish();
}

/// Benchmark the default feature groups over a day of ticks.
fn bench_feature_groups(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_groups");
    let config = AgentConfig::default();
    let Ok(engine) = FeatureEngine::new(config.feature_groups.clone(), config.trade.action_offset) else {
        return;
    };

    // 24h at 4 ticks per second
    let ticks = create_ticks(345_600, 250);
    group.throughput(Throughput::Elements(ticks.len() as u64));
    group.sample_size(10);

    for g in engine.groups() {
        group.bench_function(BenchmarkId::new("compute_group", g.timeframe.to_string()), |b| {
            b.iter(|| engine.compute_group(g, black_box(&ticks), PIP, None))
        });
    }

    group.finish();
}

/// Benchmark delta appends against a full window.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_delta");
    let policy = RetentionPolicy::default();

    let ticks = create_ticks(345_640, 250);
    let (held, delta) = ticks.split_at(345_600);
    let window = TickWindow::from_ticks(held.to_vec());
    let delta = TickWindow::from_ticks(delta.to_vec());

    group.throughput(Throughput::Elements(delta.len() as u64));
    group.bench_function("ten_seconds", |b| {
        b.iter_batched(
            || (window.clone(), delta.clone()),
            |(mut w, d)| {
                let report = w.append_delta(d, &policy);
                black_box(report)
            },
            criterion::BatchSize::LargeInput,
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_grouping,
    bench_window_stats,
    bench_feature_groups,
    bench_append
);
criterion_main!(benches);
