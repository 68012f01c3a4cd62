//! Feature output containers.
//!
//! A [`FeatureFrame`] holds one output column as `(window_end, value)` rows in
//! boundary order. Grouping only emits windows that saw at least one tick, so
//! frames are sparse across quiet periods; [`FeatureFrame::fill_gaps`]
//! projects a frame onto a dense grid of the last `rows` boundaries for the
//! model.

use crate::error::{Result, TickError};
use crate::time::Timeframe;
use chrono::NaiveDateTime;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// How to fill boundaries with no ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Repeat the most recent known value (`0.0` before the first one)
    #[default]
    ForwardFill,
    /// Use `0.0`
    Zero,
}

/// One aggregated window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub window_end: NaiveDateTime,
    pub value: f64,
}

/// A single named feature column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFrame {
    pub name: String,
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, window_end: NaiveDateTime, value: f64) {
        self.rows.push(FeatureRow { window_end, value });
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of the window ending at `window_end`, if it had ticks.
    pub fn get(&self, window_end: NaiveDateTime) -> Option<f64> {
        self.rows
            .binary_search_by_key(&window_end, |r| r.window_end)
            .ok()
            .map(|i| self.rows[i].value)
    }

    pub fn last(&self) -> Option<&FeatureRow> {
        self.rows.last()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    /// Dense grid of `rows` boundaries ending at `end`, one `timeframe` apart.
    ///
    /// `end` should itself be a boundary. Windows missing from the frame are
    /// filled per `policy`; forward fill also looks at rows before the grid.
    pub fn fill_gaps(
        &self,
        end: NaiveDateTime,
        rows: usize,
        timeframe: Timeframe,
        policy: FillPolicy,
    ) -> FeatureFrame {
        let step = timeframe.to_chrono();
        let mut out = FeatureFrame::with_capacity(self.name.clone(), rows);
        if rows == 0 {
            return out;
        }

        let start = end - step * (rows as i32 - 1);
        let mut idx = self.rows.partition_point(|r| r.window_end < start);
        let mut carry = match idx {
            0 => 0.0,
            i => self.rows[i - 1].value,
        };

        let mut boundary = start;
        for _ in 0..rows {
            while idx < self.rows.len() && self.rows[idx].window_end < boundary {
                carry = self.rows[idx].value;
                idx += 1;
            }
            let value = match self.rows.get(idx) {
                Some(r) if r.window_end == boundary => {
                    carry = r.value;
                    idx += 1;
                    r.value
                }
                _ => match policy {
                    FillPolicy::ForwardFill => carry,
                    FillPolicy::Zero => 0.0,
                },
            };
            out.push(boundary, value);
            boundary += step;
        }
        out
    }
}

/// All output columns of one feature group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureGroupOutput {
    pub timeframe: Timeframe,
    pub frames: Vec<FeatureFrame>,
}

impl FeatureGroupOutput {
    pub fn column_names(&self) -> Vec<&str> {
        self.frames.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn frame(&self, name: &str) -> Option<&FeatureFrame> {
        self.frames.iter().find(|f| f.name == name)
    }

    /// Most recent window end present in any column.
    pub fn last_window_end(&self) -> Option<NaiveDateTime> {
        self.frames
            .iter()
            .filter_map(|f| f.last().map(|r| r.window_end))
            .max()
    }

    /// Model input matrix: `rows` boundaries ending at `end` by output column.
    ///
    /// # Errors
    ///
    /// Fails when `rows` or the column count is zero.
    pub fn to_model_input(&self, end: NaiveDateTime, rows: usize, policy: FillPolicy) -> Result<Array2<f64>> {
        let cols = self.frames.len();
        if rows == 0 || cols == 0 {
            return Err(TickError::generic(format!(
                "empty model input requested ({rows} rows x {cols} columns)"
            )));
        }

        let filled: Vec<FeatureFrame> = self
            .frames
            .iter()
            .map(|f| f.fill_gaps(end, rows, self.timeframe, policy))
            .collect();

        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for frame in &filled {
                data.push(frame.rows[r].value);
            }
        }
        Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| TickError::generic(format!("model input shape: {e}")))
    }
}

/// Flat feature output record `(timestamp, symbol, feature, value)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub feature: String,
    pub value: f64,
}
