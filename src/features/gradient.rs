//! Least-squares trend angle.
//!
//! Fits `y = m·x + c` where `x` is minutes since the window's first tick and
//! `y` is the price distance from the window minimum in pips, then reports
//! `atan(m)` in degrees. Rebasing on the minimum and scaling by pip keeps the
//! fit well-conditioned across instruments, and the angle is bounded to
//! `(-90, 90)` whatever the size of the move.

use crate::types::Tick;
use chrono::NaiveDateTime;

/// Minutes elapsed since `origin`, nanosecond precision.
#[inline]
fn minutes_since(t: NaiveDateTime, origin: NaiveDateTime) -> f64 {
    let d = t - origin;
    match d.num_nanoseconds() {
        Some(ns) => ns as f64 / 60e9,
        None => d.num_milliseconds() as f64 / 60e3,
    }
}

/// OLS slope of `y` on `x`, `None` when `x` has no spread.
pub fn ols_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let mx = x[..n].iter().sum::<f64>() / nf;
    let my = y[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        sxx += dx * dx;
        sxy += dx * (y[i] - my);
    }
    if sxx <= 0.0 {
        return None;
    }
    Some(sxy / sxx)
}

/// Trend angle in degrees from parallel time and value columns.
///
/// Returns `0.0` when fewer than `min_num` points are given or when all
/// timestamps coincide.
pub fn gradient(times: &[NaiveDateTime], values: &[f64], pip: f64, min_num: usize) -> f64 {
    let n = times.len().min(values.len());
    if n < min_num || n == 0 {
        return 0.0;
    }
    let origin = times[0];
    let x: Vec<f64> = times[..n].iter().map(|&t| minutes_since(t, origin)).collect();
    let min = values[..n].iter().copied().fold(f64::INFINITY, f64::min);
    let y: Vec<f64> = values[..n].iter().map(|v| (v - min) / pip).collect();

    match ols_slope(&x, &y) {
        Some(m) if m.is_finite() => m.atan().to_degrees(),
        _ => 0.0,
    }
}

/// [`gradient`] over a tick group, reading one column through `value`.
pub fn gradient_ticks<F>(ticks: &[Tick], value: F, pip: f64, min_num: usize) -> f64
where
    F: Fn(&Tick) -> f64,
{
    if ticks.len() < min_num {
        return 0.0;
    }
    let times: Vec<NaiveDateTime> = ticks.iter().map(|t| t.time_msc).collect();
    let values: Vec<f64> = ticks.iter().map(value).collect();
    gradient(&times, &values, pip, min_num)
}
