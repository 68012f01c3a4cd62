//! Tick and feature validation.
//!
//! Catches data-quality problems before they reach the model.
//!
//! # Validation Categories
//!
//! 1. **Tick Consistency**: crossed quotes, non-positive or non-finite prices
//! 2. **Timestamp Ordering**: monotonic timestamps, gap detection
//! 3. **Feature Ranges**: NaN/Inf detection
//! 4. **Re-fetch Consistency**: an incrementally updated window compared
//!    against the same range downloaded again ([`ConsistencyChecker`])
//!
//! # Usage
//!
//! ```
//! use tick_features::validation::{FeatureValidator, ValidationLevel};
//!
//! let validator = FeatureValidator::default();
//! let result = validator.validate_features(&[0.5, f64::NAN]);
//! assert!(result.has_errors());
//! assert!(result.errors()[0].contains("NaN"));
//! ```
//!
//! # Re-fetch consistency
//!
//! After each update the tail of the window is downloaded again and compared
//! row by row. Ticks exactly on the first and last timestamp of the range are
//! left out on both sides: a fetch boundary can split ticks sharing a
//! millisecond differently each time.
//!
//! ```text
//!   updated:    [t0 | t1 t2 t3 ... tn-1 | tn]
//!   reference:  [t0 | t1 t2 t3 ... tn-1 | tn]
//!                ^^   compared row-wise   ^^
//!             excluded                  excluded
//! ```
//!
//! A mismatch is reported, never raised: the in-memory window remains the
//! working copy.

use crate::client::{TerminalBridge, TickClient};
use crate::error::Result;
use crate::features::FeatureGroupOutput;
use crate::time::format_bridge_time;
use crate::types::{dedup_identical, is_time_ordered, Tick, TickWindow};
use chrono::NaiveDateTime;
use log::{debug, error};
use serde::Serialize;
use std::fmt;

/// Validation result for a single check.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    /// Data is valid
    Valid,
    /// Data has minor issues (warnings)
    Warning(String),
    /// Data has serious issues (errors)
    Error(String),
}

impl ValidationLevel {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationLevel::Valid)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationLevel::Error(_))
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Valid => write!(f, "Valid"),
            ValidationLevel::Warning(msg) => write!(f, "Warning: {msg}"),
            ValidationLevel::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Aggregated validation result.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    results: Vec<(String, ValidationLevel)>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, check_name: &str, level: ValidationLevel) {
        self.results.push((check_name.to_string(), level));
    }

    /// Append every check from `other`, prefixing names with `scope`.
    pub fn merge(&mut self, scope: &str, other: ValidationResult) {
        for (name, level) in other.results {
            self.results.push((format!("{scope}.{name}"), level));
        }
    }

    /// Check if all validations passed (no errors or warnings).
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|(_, level)| level.is_valid())
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|(_, level)| level.is_error())
    }

    pub fn has_warnings(&self) -> bool {
        self.results
            .iter()
            .any(|(_, level)| matches!(level, ValidationLevel::Warning(_)))
    }

    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Warning(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Error(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.results.iter().filter(|(_, l)| l.is_valid()).count();
        let total = self.results.len();
        writeln!(f, "Validation: {passed}/{total} checks passed")?;

        for (name, level) in &self.results {
            if !level.is_valid() {
                writeln!(f, "  - {name}: {level}")?;
            }
        }

        Ok(())
    }
}

/// Configuration for tick and feature validation.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Largest tolerated gap between consecutive ticks, in seconds
    pub max_gap_secs: f64,

    /// Maximum spread in pips before a warning
    pub max_spread_pips: f64,

    /// Pip size used for the spread check
    pub pip: f64,

    /// Check for crossed quotes (bid > ask)
    pub check_crossed_quotes: bool,

    /// Check for NaN/Inf values
    pub check_nan_inf: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_gap_secs: 60.0,
            max_spread_pips: 50.0,
            pip: 1e-4,
            check_crossed_quotes: true,
            check_nan_inf: true,
        }
    }
}

/// Validator for tick windows and feature output.
#[derive(Debug, Clone, Default)]
pub struct FeatureValidator {
    config: ValidationConfig,
}

impl FeatureValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate quotes and timestamps of a tick window.
    pub fn validate_ticks(&self, ticks: &[Tick]) -> ValidationResult {
        let mut result = ValidationResult::new();

        let mut crossed = 0usize;
        let mut bad_price = 0usize;
        let mut wide = 0usize;
        for t in ticks {
            if !(t.bid.is_finite() && t.ask.is_finite()) || t.bid <= 0.0 || t.ask <= 0.0 {
                bad_price += 1;
                continue;
            }
            if self.config.check_crossed_quotes && t.bid > t.ask {
                crossed += 1;
            }
            if (t.ask - t.bid) / self.config.pip > self.config.max_spread_pips {
                wide += 1;
            }
        }

        if bad_price > 0 {
            result.add(
                "prices",
                ValidationLevel::Error(format!("{bad_price} ticks with non-positive or non-finite prices")),
            );
        } else {
            result.add("prices", ValidationLevel::Valid);
        }

        if crossed > 0 {
            result.add(
                "crossed_quotes",
                ValidationLevel::Error(format!("{crossed} ticks with bid > ask")),
            );
        } else {
            result.add("crossed_quotes", ValidationLevel::Valid);
        }

        if wide > 0 {
            result.add(
                "spread",
                ValidationLevel::Warning(format!(
                    "{wide} ticks with spread above {:.1} pips",
                    self.config.max_spread_pips
                )),
            );
        } else {
            result.add("spread", ValidationLevel::Valid);
        }

        let times: Vec<NaiveDateTime> = ticks.iter().map(|t| t.time_msc).collect();
        result.merge("time", validate_timestamps(&times, self.config.max_gap_secs));
        result
    }

    /// Validate a feature vector.
    pub fn validate_features(&self, features: &[f64]) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.config.check_nan_inf {
            for (i, &f) in features.iter().enumerate() {
                if f.is_nan() {
                    result.add(
                        &format!("feature_{i}"),
                        ValidationLevel::Error(format!("NaN value at index {i}")),
                    );
                } else if f.is_infinite() {
                    result.add(
                        &format!("feature_{i}"),
                        ValidationLevel::Error(format!("Infinite value at index {i}")),
                    );
                }
            }
        }

        if result.results.is_empty() {
            result.add("nan_inf_check", ValidationLevel::Valid);
        }

        result
    }

    /// Validate every column of a feature group, naming offending columns.
    pub fn validate_output(&self, output: &FeatureGroupOutput) -> ValidationResult {
        let mut result = ValidationResult::new();
        for frame in &output.frames {
            let bad = frame.rows.iter().find(|r| !r.value.is_finite());
            match bad {
                Some(row) if self.config.check_nan_inf => result.add(
                    &frame.name,
                    ValidationLevel::Error(format!("non-finite value {} at {}", row.value, row.window_end)),
                ),
                _ => result.add(&frame.name, ValidationLevel::Valid),
            }
        }
        result
    }
}

/// Validate timestamps for ordering and gaps.
pub fn validate_timestamps(timestamps: &[NaiveDateTime], max_gap_secs: f64) -> ValidationResult {
    let mut result = ValidationResult::new();

    if timestamps.is_empty() {
        result.add(
            "timestamps",
            ValidationLevel::Warning("No timestamps to validate".to_string()),
        );
        return result;
    }

    let mut monotonic = true;
    let mut max_gap = chrono::Duration::zero();

    for (i, w) in timestamps.windows(2).enumerate() {
        if w[1] < w[0] {
            monotonic = false;
            result.add(
                "timestamp_ordering",
                ValidationLevel::Error(format!(
                    "Non-monotonic timestamp at index {}: {} < {}",
                    i + 1,
                    w[1],
                    w[0]
                )),
            );
            break;
        }
        max_gap = max_gap.max(w[1] - w[0]);
    }

    if monotonic {
        result.add("timestamp_ordering", ValidationLevel::Valid);
    }

    let max_gap_s = max_gap.num_milliseconds() as f64 / 1e3;
    if max_gap_s > max_gap_secs {
        result.add(
            "timestamp_gaps",
            ValidationLevel::Warning(format!("Max timestamp gap: {max_gap_s:.2} seconds")),
        );
    } else {
        result.add("timestamp_gaps", ValidationLevel::Valid);
    }

    result
}

/// One disagreement between the updated window and the re-fetched range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Mismatch {
    /// Interior row counts differ
    RowCount { updated: usize, reference: usize },
    /// Row `index` of the interior differs in some field
    Row { index: usize, updated: Tick, reference: Tick },
}

/// Outcome of comparing an updated slice with a reference fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub passed: bool,
    /// Range compared (exclusive at both ends)
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Interior rows compared
    pub compared: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ConsistencyReport {
    fn empty() -> Self {
        Self {
            passed: true,
            start: None,
            end: None,
            compared: 0,
            mismatches: Vec::new(),
        }
    }
}

/// Maximum row mismatches recorded in one report.
const MAX_REPORTED_MISMATCHES: usize = 10;

/// Compare `updated` against `reference` over the updated slice's range.
///
/// Only ticks strictly inside `(first, last)` of `updated` take part.
/// Field-identical repeats in `reference` count once, matching how windows
/// are held.
pub fn verify(updated: &[Tick], reference: &[Tick]) -> ConsistencyReport {
    let (Some(first), Some(last)) = (updated.first(), updated.last()) else {
        return ConsistencyReport::empty();
    };
    let (start, end) = (first.time_msc, last.time_msc);
    let interior = |t: &&Tick| t.time_msc > start && t.time_msc < end;

    let a: Vec<Tick> = updated.iter().filter(interior).copied().collect();
    // The held window never keeps field-identical repeats
    let mut b: Vec<Tick> = reference.iter().filter(interior).copied().collect();
    if !is_time_ordered(&b) {
        b.sort_by_key(|t| t.time_msc);
    }
    dedup_identical(&mut b);

    let mut mismatches = Vec::new();
    if a.len() != b.len() {
        mismatches.push(Mismatch::RowCount {
            updated: a.len(),
            reference: b.len(),
        });
    }
    for (index, (x, y)) in a.iter().zip(&b).enumerate() {
        if x != y {
            if mismatches.len() >= MAX_REPORTED_MISMATCHES {
                break;
            }
            mismatches.push(Mismatch::Row {
                index,
                updated: *x,
                reference: *y,
            });
        }
    }

    ConsistencyReport {
        passed: mismatches.is_empty(),
        start: Some(start),
        end: Some(end),
        compared: a.len().min(b.len()),
        mismatches,
    }
}

/// Re-downloads the tail of an updated window and compares it.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyChecker {
    /// Ticks before the previous last tick included in the check
    pub lookback: usize,
}

impl Default for ConsistencyChecker {
    fn default() -> Self {
        Self { lookback: 10 }
    }
}

impl ConsistencyChecker {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }

    /// Check the part of `window` from `lookback` ticks before `since`.
    ///
    /// `since` is the last tick time before the update. A mismatch is logged
    /// at error level and returned in the report.
    ///
    /// # Errors
    ///
    /// Only fetch failures; a mismatch is not an error.
    pub fn check<B: TerminalBridge>(
        &self,
        client: &mut TickClient<B>,
        symbol: &str,
        window: &TickWindow,
        since: NaiveDateTime,
    ) -> Result<ConsistencyReport> {
        let slice = window.check_slice(since, self.lookback);
        let (Some(first), Some(last)) = (slice.first(), slice.last()) else {
            return Ok(ConsistencyReport::empty());
        };

        let reference = client.fetch_ticks(symbol, first.time_msc, last.time_msc)?;
        let report = verify(slice, reference.ticks());

        if report.passed {
            debug!("{symbol}: {} ticks consistent with re-fetch", report.compared);
        } else {
            error!(
                "{symbol}: tick data append mismatch {} - {} ({} mismatches)",
                format_bridge_time(first.time_msc),
                format_bridge_time(last.time_msc),
                report.mismatches.len()
            );
        }
        Ok(report)
    }
}
