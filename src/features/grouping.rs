//! Partition an ordered tick window into timeframe buckets.
//!
//! Each tick maps to the window that ends at
//! [`ceil_to_timeframe`](crate::time::ceil_to_timeframe) of its timestamp.
//! Because the window is sorted, ticks sharing a bucket form one contiguous
//! run and the groups come out in boundary order with no allocation beyond
//! the group headers.
//!
//! ```text
//!   ticks:  10:20:21.4  10:20:22.9  10:20:23.0 | 10:20:23.5  10:20:30.1 | 10:20:41.0
//!   group:  ───────── end 10:20:23 ──────────  | ── end 10:20:33 ───── | end 10:20:43
//! ```
//!
//! Empty buckets produce no group; [`FeatureFrame::fill_gaps`](super::FeatureFrame::fill_gaps)
//! restores them when a dense grid is needed.

use crate::time::{ceil_to_timeframe, Timeframe};
use crate::types::{Column, Tick};
use chrono::NaiveDateTime;

/// One bucket of ticks closing at `window_end`.
#[derive(Debug, Clone, Copy)]
pub struct TickGroup<'a> {
    pub window_end: NaiveDateTime,
    pub ticks: &'a [Tick],
}

impl<'a> TickGroup<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Column values in tick order.
    pub fn values(&self, column: Column) -> Vec<f64> {
        self.ticks.iter().map(|t| t.value(column)).collect()
    }
}

/// Group `ticks` (sorted by time) into contiguous timeframe buckets.
pub fn group_by_timeframe(ticks: &[Tick], timeframe: Timeframe, offset: Timeframe) -> Vec<TickGroup<'_>> {
    let mut groups = Vec::new();
    let mut start = 0;

    while start < ticks.len() {
        let window_end = ceil_to_timeframe(ticks[start].time_msc, timeframe, offset);
        let len = ticks[start..]
            .iter()
            .position(|t| t.time_msc > window_end)
            .unwrap_or(ticks.len() - start);
        groups.push(TickGroup {
            window_end,
            ticks: &ticks[start..start + len],
        });
        start += len;
    }

    groups
}

/// Drop trailing groups whose window has not closed by `now`.
///
/// A bucket ending after `now` may still receive ticks, so its aggregate is
/// provisional.
pub fn closed_groups<'a>(groups: &'a [TickGroup<'a>], now: NaiveDateTime) -> &'a [TickGroup<'a>] {
    let n = groups.partition_point(|g| g.window_end <= now);
    &groups[..n]
}
