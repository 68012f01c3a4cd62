//! Tick Buffer Integration Tests
//!
//! Delta appends and retention through the public API.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tick_features::buffer::{append_delta, RetentionPolicy, TickStore};
use tick_features::{Tick, TickWindow};

fn at(day: u32, h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, day)
        .unwrap()
        .and_hms_milli_opt(h, m, s, ms)
        .unwrap()
}

fn quote(t: NaiveDateTime, bid: f64) -> Tick {
    Tick::quote(t, bid, bid + 0.0002, 6)
}

#[test]
fn test_partial_last_second_is_refetched() {
    // Wednesday 2023-01-04
    let existing = TickWindow::from_ticks(vec![
        quote(at(4, 10, 20, 24, 900), 1.1000),
        quote(at(4, 10, 20, 25, 100), 1.1001),
        quote(at(4, 10, 20, 25, 400), 1.1002),
    ]);
    // Re-fetch from 10:20:25.000 brings a corrected 25.400 and a new 25.700
    let delta = TickWindow::from_ticks(vec![
        quote(at(4, 10, 20, 25, 100), 1.1001),
        quote(at(4, 10, 20, 25, 400), 1.1005),
        quote(at(4, 10, 20, 25, 700), 1.1006),
    ]);

    let merged = append_delta(existing, delta);
    let bids: Vec<f64> = merged.iter().map(|t| t.bid).collect();
    assert_eq!(bids, vec![1.1000, 1.1001, 1.1005, 1.1006]);
}

#[test]
fn test_empty_delta_keeps_window() {
    let existing = TickWindow::from_ticks(vec![quote(at(4, 10, 0, 0, 0), 1.1)]);
    let merged = append_delta(existing.clone(), TickWindow::new());
    assert_eq!(merged, existing);
}

#[test]
fn test_weekday_retention_is_24h() {
    let mut store = TickStore::new(RetentionPolicy::default());
    store.insert(
        "EURUSD",
        TickWindow::from_ticks(vec![quote(at(3, 9, 0, 0, 0), 1.1), quote(at(3, 11, 0, 0, 0), 1.1)]),
    );

    // The delta always starts at the last held second
    let delta = TickWindow::from_ticks(vec![quote(at(3, 11, 0, 0, 0), 1.1), quote(at(4, 10, 0, 0, 0), 1.2)]);
    let report = store.append("EURUSD", delta);
    assert_eq!(report.trimmed, 1);

    let window = store.get("EURUSD").unwrap();
    assert_eq!(window.first_time(), Some(at(3, 11, 0, 0, 0)));
}

#[test]
fn test_monday_keeps_friday_session() {
    let mut store = TickStore::new(RetentionPolicy::default());
    store.insert(
        "EURUSD",
        TickWindow::from_ticks(vec![
            quote(at(6, 9, 0, 0, 0), 1.1),  // Friday, more than 72h back
            quote(at(6, 21, 0, 0, 0), 1.1), // Friday evening
        ]),
    );

    // Monday 10:00, 24h back is Sunday so the horizon grows to 72h
    let delta = TickWindow::from_ticks(vec![quote(at(6, 21, 0, 0, 0), 1.1), quote(at(9, 10, 0, 0, 0), 1.2)]);
    store.append("EURUSD", delta);

    let window = store.get("EURUSD").unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(window.first_time(), Some(at(6, 21, 0, 0, 0)));
}

#[test]
fn test_retention_horizon() {
    let policy = RetentionPolicy::default();
    assert_eq!(policy.horizon(at(4, 10, 0, 0, 0)), Duration::hours(24));
    assert_eq!(policy.horizon(at(9, 10, 0, 0, 0)), Duration::hours(72));
    // Tuesday: 24h back is Monday
    assert_eq!(policy.horizon(at(10, 10, 0, 0, 0)), Duration::hours(24));
}

#[test]
fn test_store_append_creates_window() {
    let mut store = TickStore::default();
    let report = store.append(
        "XAUUSD",
        TickWindow::from_ticks(vec![quote(at(4, 10, 0, 0, 0), 1800.0), quote(at(4, 10, 0, 1, 0), 1800.1)]),
    );
    assert_eq!(report.appended, 2);
    assert_eq!(store.total_ticks(), 2);
    assert_eq!(store.symbols().collect::<Vec<_>>(), vec!["XAUUSD"]);
}
