//! Rolling tick buffers.
//!
//! Each instrument keeps an append-only [`TickWindow`] that is topped up with
//! the delta fetched since its last tick, then trimmed to a retention horizon.
//!
//! # Append algorithm
//!
//! ```text
//! existing: ... 10:20:24.900  10:20:25.100  10:20:25.400      (last = 25.400)
//! boundary: floor_to_second(25.400) = 10:20:25.000
//! keep:     ... 10:20:24.900                                  (ticks < boundary)
//! delta:        10:20:25.100  10:20:25.400  10:20:25.700 ...  (fetched from boundary)
//! result:   ... 10:20:24.900  10:20:25.100  10:20:25.400  10:20:25.700 ...
//! ```
//!
//! Ticks inside the last partial second may have been incomplete when first
//! fetched, so they are dropped and re-fetched rather than trusted.
//!
//! # Retention
//!
//! Ticks older than 24h before the newest tick are trimmed. When the point 24h
//! back lands on a Saturday or Sunday the horizon grows by 48h, so a Monday
//! morning still sees Friday's session.

use crate::time::{floor_to_second, is_weekend};
use crate::types::{is_time_ordered, Tick, TickWindow};
use ahash::AHashMap;
use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Gaps between consecutive appends longer than this are reported.
pub const GAP_WARNING_SECS: i64 = 60;

/// How much history a window keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Trailing hours kept on weekdays
    #[serde(default = "default_base_hours")]
    pub base_hours: u32,

    /// Extra hours kept when the trailing boundary falls on a weekend
    #[serde(default = "default_weekend_extension_hours")]
    pub weekend_extension_hours: u32,
}

fn default_base_hours() -> u32 {
    24
}

fn default_weekend_extension_hours() -> u32 {
    48
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            base_hours: default_base_hours(),
            weekend_extension_hours: default_weekend_extension_hours(),
        }
    }
}

impl RetentionPolicy {
    /// Retention horizon for a window whose newest tick is `max_time`.
    pub fn horizon(&self, max_time: NaiveDateTime) -> Duration {
        let base = Duration::hours(self.base_hours as i64);
        if is_weekend((max_time - base).date()) {
            base + Duration::hours(self.weekend_extension_hours as i64)
        } else {
            base
        }
    }

    /// Oldest timestamp excluded from a window ending at `max_time`.
    pub fn cutoff(&self, max_time: NaiveDateTime) -> NaiveDateTime {
        max_time - self.horizon(max_time)
    }

    /// Drop ticks at or before the cutoff. Returns how many were removed.
    fn trim(&self, ticks: &mut Vec<Tick>) -> usize {
        let Some(max_time) = ticks.last().map(|t| t.time_msc) else {
            return 0;
        };
        let cutoff = self.cutoff(max_time);
        let stale = ticks.partition_point(|t| t.time_msc <= cutoff);
        ticks.drain(..stale);
        stale
    }
}

/// What happened during one [`TickWindow::append_delta`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendReport {
    /// Existing ticks dropped from the last partial second
    pub dropped_boundary: usize,
    /// Delta ticks older than the boundary (already held)
    pub stale_skipped: usize,
    /// Delta ticks identical to one already kept
    pub duplicates_skipped: usize,
    /// Delta ticks appended
    pub appended: usize,
    /// Ticks removed by the retention trim
    pub trimmed: usize,
    /// Time between the previous last tick and the first new tick, if longer
    /// than [`GAP_WARNING_SECS`]
    pub gap: Option<Duration>,
}

impl AppendReport {
    /// Net change in window length.
    pub fn net_change(&self) -> i64 {
        self.appended as i64 - self.dropped_boundary as i64 - self.trimmed as i64
    }
}

impl TickWindow {
    /// Merge a freshly fetched delta into this window and apply retention.
    ///
    /// An empty delta, or one holding only ticks before the last held
    /// second, leaves the window untouched.
    pub fn append_delta(&mut self, delta: TickWindow, policy: &RetentionPolicy) -> AppendReport {
        let mut report = AppendReport::default();
        if delta.is_empty() {
            return report;
        }

        let mut incoming = delta.into_ticks();
        if !is_time_ordered(&incoming) {
            incoming.sort_by_key(|t| t.time_msc);
        }

        let prev_last = self.last_time();
        if let Some(boundary) = prev_last.map(floor_to_second) {
            let stale = incoming.partition_point(|t| t.time_msc < boundary);
            report.stale_skipped = stale;
            incoming.drain(..stale);
            // Nothing replaces the held partial second
            if incoming.is_empty() {
                return report;
            }

            let keep = self.ticks.partition_point(|t| t.time_msc < boundary);
            report.dropped_boundary = self.ticks.len() - keep;
            self.ticks.truncate(keep);
        }

        if let (Some(prev), Some(first)) = (prev_last, incoming.first()) {
            let gap = first.time_msc - prev;
            if gap > Duration::seconds(GAP_WARNING_SECS) {
                report.gap = Some(gap);
            }
        }

        self.ticks.reserve(incoming.len());
        for tick in incoming {
            if self.holds_identical(&tick) {
                report.duplicates_skipped += 1;
            } else {
                self.ticks.push(tick);
                report.appended += 1;
            }
        }

        report.trimmed = policy.trim(&mut self.ticks);
        report
    }

    /// Whether a field-identical tick with the same timestamp is already at
    /// the tail of the window.
    fn holds_identical(&self, tick: &Tick) -> bool {
        self.ticks
            .iter()
            .rev()
            .take_while(|t| t.time_msc == tick.time_msc)
            .any(|t| t == tick)
    }

    /// Apply the retention policy without appending anything.
    pub fn trim(&mut self, policy: &RetentionPolicy) -> usize {
        policy.trim(&mut self.ticks)
    }
}

/// Pure form of [`TickWindow::append_delta`] with the default retention.
pub fn append_delta(existing: TickWindow, delta: TickWindow) -> TickWindow {
    let mut window = existing;
    window.append_delta(delta, &RetentionPolicy::default());
    window
}

/// Tick windows keyed by instrument symbol.
#[derive(Debug, Clone, Default)]
pub struct TickStore {
    windows: AHashMap<String, TickWindow>,
    policy: RetentionPolicy,
}

impl TickStore {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            windows: AHashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Replace the window for `symbol` (initial download).
    ///
    /// Field-identical repeats are dropped so later appends start clean.
    pub fn insert(&mut self, symbol: &str, mut window: TickWindow) {
        if !is_time_ordered(window.ticks()) {
            window.ticks.sort_by_key(|t| t.time_msc);
        }
        let removed = window.dedup_identical();
        if removed > 0 {
            log::debug!("{symbol}: dropped {removed} repeated ticks from download");
        }
        self.windows.insert(symbol.to_string(), window);
    }

    pub fn get(&self, symbol: &str) -> Option<&TickWindow> {
        self.windows.get(symbol)
    }

    /// Append a delta to `symbol`'s window, creating it if absent.
    pub fn append(&mut self, symbol: &str, delta: TickWindow) -> AppendReport {
        let policy = self.policy;
        let window = self.windows.entry(symbol.to_string()).or_default();
        let report = window.append_delta(delta, &policy);

        if let Some(gap) = report.gap {
            log::warn!(
                "{symbol}: gap of {:.3}s between tick updates",
                gap.num_milliseconds() as f64 / 1000.0
            );
        }
        log::debug!(
            "{symbol}: +{} ticks ({} boundary dropped, {} duplicates, {} trimmed), {} held",
            report.appended,
            report.dropped_boundary,
            report.duplicates_skipped,
            report.trimmed,
            window.len()
        );
        report
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn total_ticks(&self) -> usize {
        self.windows.values().map(TickWindow::len).sum()
    }

    pub fn clear(&mut self) {
        self.windows.clear();
    }
}
