//! Per-window scalar reductions.
//!
//! All functions are total: an empty slice yields `0.0`, never NaN or a panic.
//! Price-based statistics that compare across instruments are expressed in
//! pips so the same thresholds work for EURUSD (`1e-4`) and XAUUSD (`0.1`).

/// Default sample gate for `skew` and `gradient`.
pub const DEFAULT_MIN_NUM: usize = 10;

/// Last value in the window.
#[inline]
pub fn last(values: &[f64]) -> f64 {
    values.last().copied().unwrap_or(0.0)
}

/// Arithmetic mean.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Downward excursion: `mean - min`, never negative.
pub fn min_rel(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    (mean(values) - min).max(0.0)
}

/// Upward excursion: `max - mean`, never negative.
pub fn max_rel(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (max - mean(values)).max(0.0)
}

/// Population skewness of the window's moves in pips.
///
/// Values are rebased to the first tick and divided by `pip` before computing
/// `m3 / m2^1.5`. Returns `0.0` when the window holds `min_num` values or
/// fewer, or when every value is identical.
pub fn skew(values: &[f64], pip: f64, min_num: usize) -> f64 {
    if values.len() <= min_num || values.is_empty() {
        return 0.0;
    }
    let first = values[0];
    let n = values.len() as f64;
    let moves: Vec<f64> = values.iter().map(|v| (v - first) / pip).collect();
    let mu = moves.iter().sum::<f64>() / n;

    let (m2, m3) = moves.iter().fold((0.0, 0.0), |(m2, m3), x| {
        let d = x - mu;
        (m2 + d * d, m3 + d * d * d)
    });
    let m2 = m2 / n;
    let m3 = m3 / n;

    if m2 <= f64::EPSILON * mu.abs().max(1.0) {
        return 0.0;
    }
    let s = m3 / m2.powf(1.5);
    if s.is_finite() {
        s
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIP: f64 = 1e-4;

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(last(&[]), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(min_rel(&[]), 0.0);
        assert_eq!(max_rel(&[]), 0.0);
        assert_eq!(skew(&[], PIP, 0), 0.0);
    }

    #[test]
    fn test_basic_reductions() {
        let v = [1.0, 2.0, 3.0, 6.0];
        assert_eq!(last(&v), 6.0);
        assert_eq!(mean(&v), 3.0);
        assert_eq!(min_rel(&v), 2.0);
        assert_eq!(max_rel(&v), 3.0);
    }

    #[test]
    fn test_relative_extremes_non_negative() {
        let v = [1.10005; 7];
        assert_eq!(min_rel(&v), 0.0);
        assert_eq!(max_rel(&v), 0.0);
    }

    #[test]
    fn test_skew_gated_by_min_num() {
        let v = [1.1000, 1.1003, 1.1001, 1.1009, 1.1002];
        assert_eq!(skew(&v, PIP, 5), 0.0);
        assert_eq!(skew(&v, PIP, 10), 0.0);
        assert_ne!(skew(&v, PIP, 4), 0.0);
    }

    #[test]
    fn test_skew_symmetric_is_zero() {
        let v: Vec<f64> = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0]
            .iter()
            .map(|p| 1.1 + p * PIP)
            .collect();
        assert!(skew(&v, PIP, 10).abs() < 1e-9);
    }

    #[test]
    fn test_skew_matches_population_formula() {
        // moves in pips: 0, 0, 0, 0, 4 -> right-skewed
        let v = [1.1, 1.1, 1.1, 1.1, 1.1004];
        let s = skew(&v, PIP, 0);
        // mu = 0.8, deviations -0.8 x4 and 3.2
        let m2 = (4.0 * 0.64 + 10.24) / 5.0;
        let m3 = (4.0 * -0.512 + 32.768) / 5.0;
        let expected = m3 / f64::powf(m2, 1.5);
        assert!((s - expected).abs() < 1e-6, "{s} vs {expected}");
        assert!(s > 0.0);
    }

    #[test]
    fn test_skew_constant_is_zero() {
        assert_eq!(skew(&[1.2345; 20], PIP, 10), 0.0);
    }
}
