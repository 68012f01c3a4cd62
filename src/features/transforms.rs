//! Sign and log transforms for bounding feature distributions.
//!
//! `log_tail` compresses only the tails: values within `±thresh` pass through
//! unchanged, values beyond are pulled in logarithmically. The curve is
//! continuous at the threshold (`log(1) = 0`) and strictly increasing, so
//! ordering and sign survive.
//!
//! ```text
//!            x                          |x| <= t
//! f(x) =     t + log_b(x + 1 - t)        x > t
//!           -t - log_b(-x + 1 - t)       x < -t
//! ```

use serde::{Deserialize, Serialize};

/// Sign of `x` (`-1`, `0`, or `1`; NaN stays NaN).
#[inline]
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        x
    }
}

/// Natural log, or log base `base` when given.
///
/// Only defined for positive `x`; non-positive input gives `-inf` or NaN.
#[inline]
pub fn log(x: f64, base: Option<f64>) -> f64 {
    match base {
        Some(b) => x.ln() / b.ln(),
        None => x.ln(),
    }
}

/// Two-sided tail log compression around `±thresh`.
#[inline]
pub fn log_tail(x: f64, thresh: f64, base: Option<f64>) -> f64 {
    if x > thresh {
        thresh + log(x + 1.0 - thresh, base)
    } else if x < -thresh {
        -thresh - log(-x + 1.0 - thresh, base)
    } else {
        x
    }
}

/// Post-aggregation transform applied to every value a feature produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    Sign,
    Log {
        #[serde(default)]
        base: Option<f64>,
    },
    LogTail {
        threshold: f64,
        #[serde(default)]
        base: Option<f64>,
    },
}

impl Transform {
    #[inline]
    pub fn apply(&self, x: f64) -> f64 {
        match *self {
            Transform::Sign => sign(x),
            Transform::Log { base } => log(x, base),
            Transform::LogTail { threshold, base } => log_tail(x, threshold, base),
        }
    }

    pub fn apply_slice(&self, values: &mut [f64]) {
        for v in values {
            *v = self.apply(*v);
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let check_base = |base: Option<f64>| match base {
            Some(b) if b <= 1.0 || b.is_nan() => Err(format!("log base must be > 1, got {b}")),
            _ => Ok(()),
        };
        match *self {
            Transform::Sign => Ok(()),
            Transform::Log { base } => check_base(base),
            Transform::LogTail { threshold, base } => {
                if threshold < 0.0 || threshold.is_nan() {
                    return Err(format!("log_tail threshold must be >= 0, got {threshold}"));
                }
                check_base(base)
            }
        }
    }
}
