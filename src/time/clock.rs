//! Broker clock offset.
//!
//! Trading terminals report tick times in the broker server's local clock,
//! not UTC. Many FX servers run on Eastern European time (UTC+2, UTC+3 during
//! EU summer time), so the offset moves twice a year.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Offset between UTC and the broker's server clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BrokerClock {
    /// Broker runs on UTC
    Utc,
    /// Constant offset in hours
    Fixed { hours: i32 },
    /// EU daylight-saving rule around a standard offset (Europe/Helsinki style:
    /// standard UTC+2, +1h from the last Sunday of March 01:00 UTC to the last
    /// Sunday of October 01:00 UTC)
    EuDst { standard_hours: i32 },
}

impl Default for BrokerClock {
    fn default() -> Self {
        BrokerClock::EuDst { standard_hours: 2 }
    }
}

impl BrokerClock {
    /// Offset from UTC in effect at `utc`.
    pub fn offset_at(&self, utc: DateTime<Utc>) -> Duration {
        match *self {
            BrokerClock::Utc => Duration::zero(),
            BrokerClock::Fixed { hours } => Duration::hours(hours as i64),
            BrokerClock::EuDst { standard_hours } => {
                let extra = if is_eu_summer_time(utc) { 1 } else { 0 };
                Duration::hours((standard_hours + extra) as i64)
            }
        }
    }

    /// Whole-hour difference between UTC and broker time at `utc`.
    pub fn hour_diff(&self, utc: DateTime<Utc>) -> i64 {
        self.offset_at(utc).num_hours()
    }

    /// Convert a UTC instant to broker-local naive time.
    pub fn to_broker(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.naive_utc() + self.offset_at(utc)
    }

    /// Current broker-local time.
    pub fn now(&self) -> NaiveDateTime {
        self.to_broker(Utc::now())
    }
}

fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next.pred_opt()?;
    while day.weekday() != Weekday::Sun {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// EU summer time: last Sunday of March 01:00 UTC until last Sunday of
/// October 01:00 UTC.
pub fn is_eu_summer_time(utc: DateTime<Utc>) -> bool {
    let year = utc.year();
    let (Some(start), Some(end)) = (last_sunday(year, 3), last_sunday(year, 10)) else {
        return false;
    };
    let one_am = chrono::NaiveTime::from_hms_opt(1, 0, 0).unwrap_or(chrono::NaiveTime::MIN);
    let start = start.and_time(one_am).and_utc();
    let end = end.and_time(one_am).and_utc();
    utc >= start && utc < end
}
