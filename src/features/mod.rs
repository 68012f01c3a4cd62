//! Feature computation over timeframe-grouped tick windows.
//!
//! A window of ticks is partitioned into buckets that close on the trade
//! action grid (see [`grouping`]), and every configured feature reduces each
//! bucket to one value per output column.
//!
//! # Architecture
//!
//! - `grouping`: contiguous-run partitioning by `ceil_to_timeframe`
//! - `stats`: last, mean, min/max relative to mean, pip-scaled skew
//! - `flags`: bid/ask/both flag distribution (one-hot)
//! - `gradient`: least-squares trend angle in degrees
//! - `transforms`: sign, log, tail-log
//! - `frame`: output columns, gap filling, model input matrices
//!
//! # Feature functions
//!
//! | `func` | Outputs | Gate |
//! |---|---|---|
//! | `last` | `name` | - |
//! | `mean` | `name` | - |
//! | `min` | `name` = mean - min | - |
//! | `max` | `name` = max - mean | - |
//! | `skew` | `name` | `len > min_num` |
//! | `one_hot_flag` | `name_2`, `name_4`, `name_6` | - |
//! | `gradient` | `name` (degrees) | `len >= min_num` |
//!
//! Every function reads its first input column. Gated windows produce `0.0`
//! rather than being omitted.
//!
//! # Example
//!
//! ```
//! use tick_features::features::{FeatureConfig, FeatureEngine, FeatureFunc, FeatureGroupConfig};
//! use tick_features::time::Timeframe;
//! use tick_features::types::Column;
//!
//! let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
//!     .with_feature(FeatureConfig::new("bid_last", FeatureFunc::Last, Column::Bid))
//!     .with_feature(FeatureConfig::new("flags", FeatureFunc::OneHotFlag, Column::Flags));
//! assert_eq!(group.output_names(), vec!["bid_last", "flags_2", "flags_4", "flags_6"]);
//!
//! let engine = FeatureEngine::new(vec![group], Timeframe::from_secs(3)).unwrap();
//! assert_eq!(engine.groups().len(), 1);
//! ```

pub mod flags;
pub mod frame;
pub mod gradient;
pub mod grouping;
pub mod stats;
pub mod transforms;

pub use frame::{FeatureFrame, FeatureGroupOutput, FeatureRecord, FeatureRow, FillPolicy};
pub use grouping::{closed_groups, group_by_timeframe, TickGroup};
pub use transforms::Transform;

use crate::error::{Result, TickError};
use crate::time::Timeframe;
use crate::types::{Column, Tick, TickWindow};
use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reduction applied to each timeframe bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFunc {
    Last,
    Mean,
    /// Mean minus minimum
    Min,
    /// Maximum minus mean
    Max,
    Skew,
    OneHotFlag,
    Gradient,
}

impl FeatureFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureFunc::Last => "last",
            FeatureFunc::Mean => "mean",
            FeatureFunc::Min => "min",
            FeatureFunc::Max => "max",
            FeatureFunc::Skew => "skew",
            FeatureFunc::OneHotFlag => "one_hot_flag",
            FeatureFunc::Gradient => "gradient",
        }
    }

    /// Number of output columns.
    pub fn output_width(&self) -> usize {
        match self {
            FeatureFunc::OneHotFlag => 3,
            _ => 1,
        }
    }

    /// Whether the function reads `min_num`.
    pub fn is_gated(&self) -> bool {
        matches!(self, FeatureFunc::Skew | FeatureFunc::Gradient)
    }
}

impl fmt::Display for FeatureFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra per-function parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureKwargs {
    /// Sample gate for `skew` / `gradient` (default 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_num: Option<usize>,
}

impl FeatureKwargs {
    pub fn min_num(&self) -> usize {
        self.min_num.unwrap_or(stats::DEFAULT_MIN_NUM)
    }
}

/// One configured feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Output column name (prefix for multi-column functions)
    pub name: String,

    pub func: FeatureFunc,

    /// Input columns; the first is read
    pub inputs: Vec<Column>,

    #[serde(default)]
    pub kwargs: FeatureKwargs,

    /// Applied to every output value after aggregation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl FeatureConfig {
    pub fn new(name: impl Into<String>, func: FeatureFunc, input: Column) -> Self {
        Self {
            name: name.into(),
            func,
            inputs: vec![input],
            kwargs: FeatureKwargs::default(),
            transform: None,
        }
    }

    pub fn with_min_num(mut self, min_num: usize) -> Self {
        self.kwargs.min_num = Some(min_num);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Names of the columns this feature produces.
    pub fn output_names(&self) -> Vec<String> {
        match self.func {
            FeatureFunc::OneHotFlag => ["2", "4", "6"]
                .iter()
                .map(|suffix| format!("{}_{}", self.name, suffix))
                .collect(),
            _ => vec![self.name.clone()],
        }
    }

    /// The column the function reads.
    pub fn input(&self) -> Result<Column> {
        self.inputs.first().copied().ok_or_else(|| TickError::MissingColumn {
            feature: self.name.clone(),
            column: match self.func {
                FeatureFunc::OneHotFlag => Column::Flags.to_string(),
                _ => "<any>".to_string(),
            },
        })
    }

    /// Check that the feature can be computed.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TickError::config("feature name must not be empty"));
        }
        let input = self.input()?;
        if self.func == FeatureFunc::OneHotFlag && input != Column::Flags {
            return Err(TickError::MissingColumn {
                feature: self.name.clone(),
                column: Column::Flags.to_string(),
            });
        }
        if let Some(t) = &self.transform {
            t.validate()
                .map_err(|e| TickError::config(format!("feature '{}': {e}", self.name)))?;
        }
        Ok(())
    }

    /// Reduce one bucket, pushing one value per output column into `out`.
    pub fn evaluate(&self, ticks: &[Tick], pip: f64, out: &mut Vec<f64>) -> Result<()> {
        let column = self.input()?;
        let start = out.len();
        let values = || ticks.iter().map(|t| t.value(column)).collect::<Vec<f64>>();

        match self.func {
            FeatureFunc::Last => out.push(ticks.last().map(|t| t.value(column)).unwrap_or(0.0)),
            FeatureFunc::Mean => out.push(stats::mean(&values())),
            FeatureFunc::Min => out.push(stats::min_rel(&values())),
            FeatureFunc::Max => out.push(stats::max_rel(&values())),
            FeatureFunc::Skew => out.push(stats::skew(&values(), pip, self.kwargs.min_num())),
            FeatureFunc::OneHotFlag => {
                out.extend(flags::FlagDistribution::from_ticks(ticks).one_hot())
            }
            FeatureFunc::Gradient => out.push(gradient::gradient_ticks(
                ticks,
                |t| t.value(column),
                pip,
                self.kwargs.min_num(),
            )),
        }

        if let Some(t) = &self.transform {
            t.apply_slice(&mut out[start..]);
        }
        Ok(())
    }
}

/// Features sharing one aggregation timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroupConfig {
    pub timeframe: Timeframe,

    /// Rows per output column handed to the model
    #[serde(default = "default_window_len")]
    pub window_len: usize,

    /// Filling of boundaries without ticks
    #[serde(default)]
    pub fill: FillPolicy,

    /// Symbols this group applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instruments: Vec<String>,

    pub features: Vec<FeatureConfig>,
}

fn default_window_len() -> usize {
    60
}

impl FeatureGroupConfig {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            window_len: default_window_len(),
            fill: FillPolicy::default(),
            instruments: Vec::new(),
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: FeatureConfig) -> Self {
        self.features.push(feature);
        self
    }

    pub fn with_window_len(mut self, window_len: usize) -> Self {
        self.window_len = window_len;
        self
    }

    pub fn with_fill(mut self, fill: FillPolicy) -> Self {
        self.fill = fill;
        self
    }

    pub fn with_instruments<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.instruments = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn applies_to(&self, symbol: &str) -> bool {
        self.instruments.is_empty() || self.instruments.iter().any(|s| s == symbol)
    }

    pub fn output_names(&self) -> Vec<String> {
        self.features.iter().flat_map(|f| f.output_names()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeframe.as_nanos() <= 0 {
            return Err(TickError::InvalidTimeframe(self.timeframe.to_string()));
        }
        if self.window_len == 0 {
            return Err(TickError::config(format!(
                "feature group {}: window_len must be > 0",
                self.timeframe
            )));
        }
        if self.features.is_empty() {
            return Err(TickError::config(format!(
                "feature group {} has no features",
                self.timeframe
            )));
        }
        let mut seen = ahash::AHashSet::new();
        for f in &self.features {
            f.validate()?;
            for name in f.output_names() {
                if !seen.insert(name.clone()) {
                    return Err(TickError::config(format!(
                        "feature group {}: duplicate output column '{name}'",
                        self.timeframe
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Computes every configured feature group for a tick window.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    groups: Vec<FeatureGroupConfig>,
    /// Trade action offset shared by all bucket boundaries
    offset: Timeframe,
}

impl FeatureEngine {
    /// Validates every group up front.
    pub fn new(groups: Vec<FeatureGroupConfig>, offset: Timeframe) -> Result<Self> {
        for g in &groups {
            g.validate()?;
        }
        Ok(Self { groups, offset })
    }

    pub fn groups(&self) -> &[FeatureGroupConfig] {
        &self.groups
    }

    pub fn offset(&self) -> Timeframe {
        self.offset
    }

    /// Compute one group over sorted `ticks`.
    ///
    /// With `now` given, buckets that have not closed yet are left out.
    pub fn compute_group(
        &self,
        group: &FeatureGroupConfig,
        ticks: &[Tick],
        pip: f64,
        now: Option<NaiveDateTime>,
    ) -> Result<FeatureGroupOutput> {
        let all = group_by_timeframe(ticks, group.timeframe, self.offset);
        let buckets = match now {
            Some(now) => closed_groups(&all, now),
            None => &all[..],
        };

        let mut frames: Vec<FeatureFrame> = group
            .output_names()
            .into_iter()
            .map(|name| FeatureFrame::with_capacity(name, buckets.len()))
            .collect();

        let mut row = Vec::with_capacity(frames.len());
        for bucket in buckets {
            row.clear();
            for feature in &group.features {
                feature.evaluate(bucket.ticks, pip, &mut row)?;
            }
            for (frame, &value) in frames.iter_mut().zip(&row) {
                frame.push(bucket.window_end, value);
            }
        }

        debug!(
            "Feature group {}: {} buckets x {} columns",
            group.timeframe,
            buckets.len(),
            frames.len()
        );

        Ok(FeatureGroupOutput {
            timeframe: group.timeframe,
            frames,
        })
    }

    /// Compute every group that applies to `symbol`.
    pub fn compute_all(
        &self,
        symbol: &str,
        window: &TickWindow,
        pip: f64,
        now: Option<NaiveDateTime>,
    ) -> Result<Vec<FeatureGroupOutput>> {
        self.groups
            .iter()
            .filter(|g| g.applies_to(symbol))
            .map(|g| self.compute_group(g, window.ticks(), pip, now))
            .collect()
    }
}

/// Flatten group outputs into ordered `(timestamp, feature, value)` records.
pub fn to_records(symbol: &str, outputs: &[FeatureGroupOutput]) -> Vec<FeatureRecord> {
    let mut records = Vec::new();
    for out in outputs {
        for frame in &out.frames {
            records.extend(frame.rows.iter().map(|r| FeatureRecord {
                timestamp: r.window_end,
                symbol: symbol.to_string(),
                timeframe: out.timeframe,
                feature: frame.name.clone(),
                value: r.value,
            }));
        }
    }
    records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FLAG_BID;
    use chrono::{Duration, NaiveDate};

    fn ts(s: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_opt(10, 20, 0)
            .unwrap()
            + Duration::milliseconds(s)
    }

    #[test]
    fn test_one_hot_requires_flags() {
        let bad = FeatureConfig::new("f", FeatureFunc::OneHotFlag, Column::Bid);
        assert!(matches!(bad.validate(), Err(TickError::MissingColumn { .. })));

        let mut empty = FeatureConfig::new("g", FeatureFunc::Mean, Column::Bid);
        empty.inputs.clear();
        assert!(matches!(empty.validate(), Err(TickError::MissingColumn { .. })));
    }

    #[test]
    fn test_duplicate_outputs_rejected() {
        let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
            .with_feature(FeatureConfig::new("x", FeatureFunc::Last, Column::Bid))
            .with_feature(FeatureConfig::new("x", FeatureFunc::Mean, Column::Ask));
        assert!(group.validate().is_err());
    }

    #[test]
    fn test_evaluate_with_transform() {
        let ticks = vec![
            Tick::quote(ts(0), 1.0, 1.1, FLAG_BID),
            Tick::quote(ts(100), 3.0, 3.1, FLAG_BID),
        ];
        let f = FeatureConfig::new("m", FeatureFunc::Max, Column::Bid).with_transform(Transform::Sign);
        let mut out = Vec::new();
        f.evaluate(&ticks, 1e-4, &mut out).unwrap();
        assert_eq!(out, vec![1.0]);
    }

    #[test]
    fn test_min_num_kwarg_parsing() {
        let f: FeatureConfig = toml::from_str(
            r#"
            name = "bid_skew"
            func = "skew"
            inputs = ["bid"]
            kwargs = { min_num = 5 }
            "#,
        )
        .unwrap();
        assert_eq!(f.kwargs.min_num(), 5);

        let g: FeatureConfig =
            toml::from_str("name = \"g\"\nfunc = \"gradient\"\ninputs = [\"ask\"]").unwrap();
        assert_eq!(g.kwargs.min_num(), 10);

        assert!(toml::from_str::<FeatureConfig>("name = \"g\"\nfunc = \"median\"\ninputs = [\"ask\"]").is_err());
        assert!(toml::from_str::<FeatureConfig>("name = \"g\"\nfunc = \"mean\"\ninputs = [\"price\"]").is_err());
    }

    #[test]
    fn test_compute_group_columns_align() {
        let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
            .with_feature(FeatureConfig::new("bid_last", FeatureFunc::Last, Column::Bid))
            .with_feature(FeatureConfig::new("fl", FeatureFunc::OneHotFlag, Column::Flags));
        let engine = FeatureEngine::new(vec![group.clone()], Timeframe::from_secs(3)).unwrap();

        // 10:20:00.000 .. 10:20:24.000, one tick every 2s
        let ticks: Vec<Tick> = (0..13)
            .map(|i| Tick::quote(ts(i * 2000), 1.0 + i as f64, 1.5 + i as f64, FLAG_BID))
            .collect();
        let out = engine.compute_group(&group, &ticks, 1e-4, None).unwrap();

        assert_eq!(out.column_names(), vec!["bid_last", "fl_2", "fl_4", "fl_6"]);
        let last = out.frame("bid_last").unwrap();
        // buckets end at :03, :13, :23, :33
        assert_eq!(last.len(), 4);
        assert_eq!(last.get(ts(3_000)), Some(2.0));
        assert_eq!(out.frame("fl_2").unwrap().get(ts(13_000)), Some(1.0));

        let closed = engine
            .compute_group(&group, &ticks, 1e-4, Some(ts(24_000)))
            .unwrap();
        assert_eq!(closed.frame("bid_last").unwrap().len(), 3);

        let records = to_records("EURUSD", &[closed]);
        assert_eq!(records.len(), 12);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
