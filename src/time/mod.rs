//! Time utilities.
//!
//! - [`timeframe`]: timeframe strings, boundary rounding, action-loop waits
//! - [`clock`]: broker clock offset from UTC
//!
//! Bridge requests carry datetimes as `"%Y-%m-%d %H:%M:%S%.6f"` strings; see
//! [`format_bridge_time`] and [`parse_bridge_time`].

pub mod clock;
pub mod timeframe;

pub use clock::{is_eu_summer_time, BrokerClock};
pub use timeframe::{
    ceil_calendar, ceil_to_timeframe, floor_to_second, is_weekend, last_closed_boundary,
    wait_until_next_boundary, ActionWait, CalendarUnit, Timeframe, MARKET_CLOSED_RETRY,
};

use crate::error::{Result, TickError};
use chrono::NaiveDateTime;

/// Datetime layout used in bridge request payloads.
pub const BRIDGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format a timestamp for a bridge request (microsecond precision).
pub fn format_bridge_time(t: NaiveDateTime) -> String {
    t.format(BRIDGE_TIME_FORMAT).to_string()
}

/// Parse a bridge-formatted timestamp. Fractional seconds are optional.
pub fn parse_bridge_time(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| TickError::generic(format!("invalid bridge time '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn test_bridge_time_round_trip() {
        let t = NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_micro_opt(10, 20, 25, 123_000)
            .unwrap();
        let s = format_bridge_time(t);
        assert_eq!(s, "2023-01-04 10:20:25.123000");
        assert_eq!(parse_bridge_time(&s).unwrap(), t);
        assert_eq!(
            parse_bridge_time("2023-01-04 10:20:25").unwrap(),
            t.with_nanosecond(0).unwrap()
        );
        assert!(parse_bridge_time("yesterday").is_err());
    }
}
