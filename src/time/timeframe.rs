//! Timeframe parsing and boundary rounding.
//!
//! Feature windows and the trading action loop share one periodic grid: with a
//! `10s` timeframe and a `3s` offset the boundaries fall on `:03, :13, :23, …`.
//! A tick belongs to the window whose end is [`ceil_to_timeframe`] of its
//! timestamp, so a tick exactly on a boundary closes that window.

use crate::error::{Result, TickError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Sleep returned while the market is closed (weekends).
pub const MARKET_CLOSED_RETRY: Duration = Duration::from_secs(5);

/// Fixed-length aggregation period parsed from strings like `"10s"` or `"1h"`.
///
/// Supported units: `ms`, `s`, `m` / `min`, `h`, `d`. A zero-length value
/// parses (it is a valid offset) but is rejected wherever a bucket width is
/// required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    nanos: i64,
}

impl Timeframe {
    pub const fn from_secs(secs: i64) -> Self {
        Self {
            nanos: secs * NANOS_PER_SEC,
        }
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self {
            nanos: millis * NANOS_PER_MILLI,
        }
    }

    pub const fn zero() -> Self {
        Self { nanos: 0 }
    }

    #[inline]
    pub fn as_nanos(&self) -> i64 {
        self.nanos
    }

    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC as f64
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn to_chrono(&self) -> chrono::Duration {
        chrono::Duration::nanoseconds(self.nanos)
    }

    pub fn to_std(&self) -> Duration {
        Duration::from_nanos(self.nanos.max(0) as u64)
    }

    /// Whether this timeframe tiles a minute exactly (1s, 2s, 5s, 10s, 30s, …).
    pub fn divides_minute(&self) -> bool {
        self.nanos > 0 && (60 * NANOS_PER_SEC) % self.nanos == 0
    }
}

impl FromStr for Timeframe {
    type Err = TickError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| TickError::InvalidTimeframe(s.to_string()))?;
        let (num, unit) = trimmed.split_at(split);
        let value: i64 = num
            .parse()
            .map_err(|_| TickError::InvalidTimeframe(s.to_string()))?;

        let unit_nanos = match unit {
            "ms" => NANOS_PER_MILLI,
            "s" => NANOS_PER_SEC,
            "m" | "min" => 60 * NANOS_PER_SEC,
            "h" => 3_600 * NANOS_PER_SEC,
            "d" => 86_400 * NANOS_PER_SEC,
            _ => return Err(TickError::InvalidTimeframe(s.to_string())),
        };

        value
            .checked_mul(unit_nanos)
            .map(|nanos| Self { nanos })
            .ok_or_else(|| TickError::InvalidTimeframe(s.to_string()))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TickError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(i64, &str); 5] = [
            (86_400 * NANOS_PER_SEC, "d"),
            (3_600 * NANOS_PER_SEC, "h"),
            (60 * NANOS_PER_SEC, "m"),
            (NANOS_PER_SEC, "s"),
            (NANOS_PER_MILLI, "ms"),
        ];
        if self.nanos == 0 {
            return write!(f, "0s");
        }
        for (size, unit) in UNITS {
            if self.nanos % size == 0 {
                return write!(f, "{}{}", self.nanos / size, unit);
            }
        }
        write!(f, "{}ms", self.nanos as f64 / NANOS_PER_MILLI as f64)
    }
}

/// Round `t` up to the next timeframe boundary, shifted by `offset`.
///
/// Subtracts the offset, rounds up to a multiple of `timeframe` counted from
/// the Unix epoch, and adds the offset back. A time already on a boundary is
/// returned unchanged.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use tick_features::time::{ceil_to_timeframe, Timeframe};
///
/// let t = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()
///     .and_hms_milli_opt(10, 20, 25, 123).unwrap();
/// let tf: Timeframe = "10s".parse().unwrap();
/// let off: Timeframe = "3s".parse().unwrap();
/// let end = ceil_to_timeframe(t, tf, off);
/// assert_eq!(end.format("%H:%M:%S%.3f").to_string(), "10:20:33.000");
/// ```
pub fn ceil_to_timeframe(t: NaiveDateTime, timeframe: Timeframe, offset: Timeframe) -> NaiveDateTime {
    let tf = timeframe.as_nanos();
    if tf <= 0 {
        return t;
    }
    let Some(ns) = t.and_utc().timestamp_nanos_opt() else {
        return t;
    };

    let shifted = ns - offset.as_nanos();
    let rem = shifted.rem_euclid(tf);
    let ceiled = if rem == 0 { shifted } else { shifted - rem + tf };

    DateTime::from_timestamp_nanos(ceiled + offset.as_nanos()).naive_utc()
}

/// Latest boundary at or before `now`: the end of the newest closed window.
pub fn last_closed_boundary(now: NaiveDateTime, timeframe: Timeframe, offset: Timeframe) -> NaiveDateTime {
    let ceiled = ceil_to_timeframe(now, timeframe, offset);
    if ceiled > now {
        ceiled - timeframe.to_chrono()
    } else {
        ceiled
    }
}

/// Truncate sub-second precision.
pub fn floor_to_second(t: NaiveDateTime) -> NaiveDateTime {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Saturday or Sunday.
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// How long the action loop should sleep before its next decision point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionWait {
    /// No trading in the coming period (weekend)
    pub market_closed: bool,
    pub sleep: Duration,
}

impl ActionWait {
    pub fn sleep_secs(&self) -> f64 {
        self.sleep.as_secs_f64()
    }
}

/// Time remaining until the next action boundary.
///
/// On Saturday and Sunday returns `market_closed = true` with a short
/// [`MARKET_CLOSED_RETRY`] sleep. Otherwise works on the position within the
/// minute: `s = (second + micros * 1e-6) mod timeframe`, sleeping to `offset`
/// when `s <= offset` and to `timeframe + offset` when past it. Never negative.
/// The timeframe is expected to divide a minute.
pub fn wait_until_next_boundary(
    timeframe: Timeframe,
    offset: Timeframe,
    now: NaiveDateTime,
) -> ActionWait {
    if is_weekend(now.date()) {
        return ActionWait {
            market_closed: true,
            sleep: MARKET_CLOSED_RETRY,
        };
    }

    let tf = timeframe.as_secs_f64();
    if tf <= 0.0 {
        return ActionWait {
            market_closed: false,
            sleep: Duration::ZERO,
        };
    }
    let off = offset.as_secs_f64();

    let micros = (now.nanosecond() % 1_000_000_000) / 1_000;
    let seconds = (now.second() as f64 + micros as f64 / 1e6) % tf;
    let target = if seconds > off { tf + off } else { off };

    ActionWait {
        market_closed: false,
        sleep: Duration::from_secs_f64((target - seconds).max(0.0)),
    }
}

/// Calendar unit for [`ceil_calendar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarUnit {
    Day,
    Month,
    Year,
    Decade,
}

/// Start of the next calendar period after `t`.
///
/// Always moves forward: midnight of 2023-01-01 ceils to 2023-01-02 by day.
pub fn ceil_calendar(t: NaiveDateTime, unit: CalendarUnit) -> NaiveDateTime {
    let date = t.date();
    let next = match unit {
        CalendarUnit::Day => date.succ_opt(),
        CalendarUnit::Month => {
            let (y, m) = if date.month() == 12 {
                (date.year() + 1, 1)
            } else {
                (date.year(), date.month() + 1)
            };
            NaiveDate::from_ymd_opt(y, m, 1)
        }
        CalendarUnit::Year => NaiveDate::from_ymd_opt(date.year() + 1, 1, 1),
        CalendarUnit::Decade => {
            NaiveDate::from_ymd_opt(date.year() + 10 - date.year().rem_euclid(10), 1, 1)
        }
    };
    next.map(|d| d.and_time(chrono::NaiveTime::MIN)).unwrap_or(t)
}
