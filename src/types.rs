//! Tick data model.
//!
//! - [`Tick`]: one normalized market update (immutable once ingested)
//! - [`RawTick`]: the bridge's wire form, every field optional
//! - [`TickWindow`]: the ordered in-memory window held for one instrument
//! - [`Column`]: named tick columns that feature functions read
//!
//! Timestamps are broker-clock `NaiveDateTime`s. The bridge encodes them as
//! millisecond epoch integers; storage keeps nanosecond resolution so nothing
//! is lost when windows are rounded or compared.

use crate::error::{Result, TickError};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Flag bit: bid changed.
pub const FLAG_BID: i32 = 2;
/// Flag bit: ask changed.
pub const FLAG_ASK: i32 = 4;
/// Flag value: both bid and ask changed.
pub const FLAG_BOTH: i32 = 6;

/// A single timestamped market update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub ask: f64,
    pub bid: f64,
    pub last: f64,
    pub volume: f64,
    pub volume_real: f64,
    /// Bitmask: 2 = bid changed, 4 = ask changed, 6 = both
    pub flags: i32,
    /// Broker-clock timestamp (millisecond origin, nanosecond storage)
    pub time_msc: NaiveDateTime,
}

impl Tick {
    /// Quote-only tick (no trade volume), the common case for FX.
    pub fn quote(time_msc: NaiveDateTime, bid: f64, ask: f64, flags: i32) -> Self {
        Self {
            ask,
            bid,
            last: 0.0,
            volume: 0.0,
            volume_real: 0.0,
            flags,
            time_msc,
        }
    }

    /// Value of a column for this tick.
    #[inline]
    pub fn value(&self, column: Column) -> f64 {
        match column {
            Column::Ask => self.ask,
            Column::Bid => self.bid,
            Column::Last => self.last,
            Column::Volume => self.volume,
            Column::VolumeReal => self.volume_real,
            Column::Flags => self.flags as f64,
            Column::Mid => (self.ask + self.bid) / 2.0,
            Column::Spread => self.ask - self.bid,
        }
    }
}

/// Tick record as delivered by the terminal bridge.
///
/// Every field is optional so that a record missing a column is reported as
/// [`TickError::MalformedPayload`] instead of a generic decode failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTick {
    pub ask: Option<f64>,
    pub bid: Option<f64>,
    pub last: Option<f64>,
    pub volume: Option<f64>,
    pub volume_real: Option<f64>,
    pub flags: Option<i32>,
    /// Milliseconds since the Unix epoch (broker clock)
    pub time_msc: Option<i64>,
}

impl RawTick {
    /// Normalize into a [`Tick`]. `index` is the record position, used in errors.
    pub fn into_tick(self, index: usize) -> Result<Tick> {
        let missing = |field: &'static str| TickError::MalformedPayload { field, index };

        let ms = self.time_msc.ok_or_else(|| missing("time_msc"))?;
        let time_msc = DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| TickError::generic(format!("time_msc {ms} out of range")))?
            .naive_utc();

        Ok(Tick {
            ask: self.ask.ok_or_else(|| missing("ask"))?,
            bid: self.bid.ok_or_else(|| missing("bid"))?,
            last: self.last.ok_or_else(|| missing("last"))?,
            volume: self.volume.ok_or_else(|| missing("volume"))?,
            volume_real: self.volume_real.ok_or_else(|| missing("volume_real"))?,
            flags: self.flags.ok_or_else(|| missing("flags"))?,
            time_msc,
        })
    }
}

impl From<&Tick> for RawTick {
    fn from(tick: &Tick) -> Self {
        Self {
            ask: Some(tick.ask),
            bid: Some(tick.bid),
            last: Some(tick.last),
            volume: Some(tick.volume),
            volume_real: Some(tick.volume_real),
            flags: Some(tick.flags),
            time_msc: Some(tick.time_msc.and_utc().timestamp_millis()),
        }
    }
}

/// Tick column a feature can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Ask,
    Bid,
    Last,
    Volume,
    VolumeReal,
    Flags,
    /// (ask + bid) / 2
    Mid,
    /// ask - bid
    Spread,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Ask => "ask",
            Column::Bid => "bid",
            Column::Last => "last",
            Column::Volume => "volume",
            Column::VolumeReal => "volume_real",
            Column::Flags => "flags",
            Column::Mid => "mid",
            Column::Spread => "spread",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ask" => Ok(Column::Ask),
            "bid" => Ok(Column::Bid),
            "last" => Ok(Column::Last),
            "volume" => Ok(Column::Volume),
            "volume_real" => Ok(Column::VolumeReal),
            "flags" => Ok(Column::Flags),
            "mid" => Ok(Column::Mid),
            "spread" => Ok(Column::Spread),
            other => Err(TickError::config(format!("unknown tick column '{other}'"))),
        }
    }
}

/// Ordered ticks for one instrument.
///
/// Always non-decreasing in `time_msc`. Only [`TickWindow::append_delta`]
/// (see `buffer`) mutates a window after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickWindow {
    pub(crate) ticks: Vec<Tick>,
}

impl TickWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a window, stable-sorting by time so equal timestamps keep their
    /// arrival order.
    ///
    /// Field-identical copies of a tick are collapsed to the first one.
    pub fn from_ticks(mut ticks: Vec<Tick>) -> Self {
        if !is_time_ordered(&ticks) {
            ticks.sort_by_key(|t| t.time_msc);
        }
        dedup_identical(&mut ticks);
        Self { ticks }
    }

    /// Drop field-identical repeats. Returns how many were removed.
    pub fn dedup_identical(&mut self) -> usize {
        dedup_identical(&mut self.ticks)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    #[inline]
    pub fn ticks(&self) -> &[Tick] {
        &self.ticks
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tick> {
        self.ticks.iter()
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.ticks.first().map(|t| t.time_msc)
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.ticks.last().map(|t| t.time_msc)
    }

    /// Ticks in the half-open range `[start, end)`.
    pub fn range(&self, start: NaiveDateTime, end: NaiveDateTime) -> &[Tick] {
        let lo = self.ticks.partition_point(|t| t.time_msc < start);
        let hi = self.ticks.partition_point(|t| t.time_msc < end);
        &self.ticks[lo..hi.max(lo)]
    }

    /// Slice starting `lookback` ticks before the first tick at `since`.
    ///
    /// Used to pick the region re-verified after an incremental update. When
    /// no tick sits exactly at `since`, the slice starts `lookback` ticks
    /// before the first tick after it.
    pub fn check_slice(&self, since: NaiveDateTime, lookback: usize) -> &[Tick] {
        let idx = self.ticks.partition_point(|t| t.time_msc < since);
        &self.ticks[idx.saturating_sub(lookback)..]
    }

    pub fn into_ticks(self) -> Vec<Tick> {
        self.ticks
    }
}

impl From<Vec<Tick>> for TickWindow {
    fn from(ticks: Vec<Tick>) -> Self {
        Self::from_ticks(ticks)
    }
}

impl<'a> IntoIterator for &'a TickWindow {
    type Item = &'a Tick;
    type IntoIter = std::slice::Iter<'a, Tick>;

    fn into_iter(self) -> Self::IntoIter {
        self.ticks.iter()
    }
}

/// Remove later copies of field-identical ticks from time-sorted `ticks`.
///
/// Only ticks sharing a timestamp are compared. Distinct ticks at the same
/// time keep their order. Returns how many were removed.
pub fn dedup_identical(ticks: &mut Vec<Tick>) -> usize {
    let before = ticks.len();
    let mut kept: Vec<Tick> = Vec::with_capacity(before);
    let mut run_start = 0;
    for tick in std::mem::take(ticks) {
        if kept.last().map_or(true, |l| l.time_msc != tick.time_msc) {
            run_start = kept.len();
        }
        if !kept[run_start..].contains(&tick) {
            kept.push(tick);
        }
    }
    *ticks = kept;
    before - ticks.len()
}

/// Whether ticks are non-decreasing in time.
pub fn is_time_ordered(ticks: &[Tick]) -> bool {
    ticks.windows(2).all(|w| w[0].time_msc <= w[1].time_msc)
}
