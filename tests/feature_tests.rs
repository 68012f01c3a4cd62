//! Feature Engine Integration Tests
//!
//! Grouping on the action grid, gated statistics, and model input assembly.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tick_features::features::{
    flags, gradient, stats, transforms, FeatureConfig, FeatureEngine, FeatureFunc,
    FeatureGroupConfig, FillPolicy, Transform,
};
use tick_features::time::Timeframe;
use tick_features::{Column, Tick};

const PIP: f64 = 1e-4;

fn at(m: u32, s: u32, ms: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 4)
        .unwrap()
        .and_hms_milli_opt(10, m, s, ms)
        .unwrap()
}

fn quote(t: NaiveDateTime, bid: f64, flags: i32) -> Tick {
    Tick::quote(t, bid, bid + 0.0002, flags)
}

fn engine(group: FeatureGroupConfig) -> FeatureEngine {
    FeatureEngine::new(vec![group], Timeframe::from_secs(3)).unwrap()
}

#[test]
fn test_buckets_close_on_offset_grid() {
    let ticks = vec![
        quote(at(20, 21, 0), 1.1000, 2),
        quote(at(20, 25, 0), 1.1001, 2),
        quote(at(20, 31, 0), 1.1002, 4),
        quote(at(20, 33, 0), 1.1003, 6),
        quote(at(20, 33, 1), 1.1004, 6),
    ];
    let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
        .with_feature(FeatureConfig::new("bid_last", FeatureFunc::Last, Column::Bid));
    let out = engine(group.clone()).compute_group(&group, &ticks, PIP, None).unwrap();

    let frame = out.frame("bid_last").unwrap();
    let ends: Vec<NaiveDateTime> = frame.rows.iter().map(|r| r.window_end).collect();
    assert_eq!(ends, vec![at(20, 23, 0), at(20, 33, 0), at(20, 43, 0)]);
    assert_eq!(frame.values(), vec![1.1000, 1.1003, 1.1004]);
}

#[test]
fn test_open_bucket_excluded_with_now() {
    let ticks = vec![quote(at(20, 21, 0), 1.1, 2), quote(at(20, 25, 0), 1.1, 2)];
    let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
        .with_feature(FeatureConfig::new("bid_mean", FeatureFunc::Mean, Column::Bid));
    let out = engine(group.clone())
        .compute_group(&group, &ticks, PIP, Some(at(20, 30, 0)))
        .unwrap();
    assert_eq!(out.last_window_end(), Some(at(20, 23, 0)));
}

#[test]
fn test_skew_gate() {
    let mut values = vec![1.1; 10];
    assert_eq!(stats::skew(&values, PIP, 10), 0.0);

    values.push(1.1010);
    let s = stats::skew(&values, PIP, 10);
    assert!(s > 0.0, "one upward jump skews right, got {s}");

    // Identical values carry no shape
    assert_eq!(stats::skew(&[1.1; 20], PIP, 10), 0.0);
}

#[test]
fn test_min_max_relative_to_mean() {
    let values = [1.0, 2.0, 3.0, 6.0];
    assert!((stats::min_rel(&values) - 2.0).abs() < 1e-12);
    assert!((stats::max_rel(&values) - 3.0).abs() < 1e-12);
    assert_eq!(stats::min_rel(&[]), 0.0);
}

#[test]
fn test_flag_one_hot() {
    assert_eq!(flags::one_hot(&[2, 2, 4, 6]), [0.5, 0.25, 4.0]);
    assert_eq!(flags::one_hot(&[]), [0.0, 0.0, 0.0]);
}

#[test]
fn test_gradient_one_pip_per_second() {
    let ticks: Vec<Tick> = (0..10)
        .map(|i| quote(at(20, 4, 0) + Duration::seconds(i), 1.1 + i as f64 * PIP, 6))
        .collect();
    let expected = 60.0_f64.atan().to_degrees();
    let angle = gradient::gradient_ticks(&ticks, |t| t.bid, PIP, 10);
    assert!((angle - expected).abs() < 1e-6, "got {angle}");

    // Below the gate
    assert_eq!(gradient::gradient_ticks(&ticks[..9], |t| t.bid, PIP, 10), 0.0);
}

#[test]
fn test_gradient_through_engine() {
    let ticks: Vec<Tick> = (0..10)
        .map(|i| quote(at(20, 4, 0) + Duration::seconds(i), 1.1 - i as f64 * PIP, 6))
        .collect();
    let group = FeatureGroupConfig::new(Timeframe::from_secs(60))
        .with_feature(FeatureConfig::new("bid_gradient", FeatureFunc::Gradient, Column::Bid));
    let out = engine(group.clone()).compute_group(&group, &ticks, PIP, None).unwrap();

    let frame = out.frame("bid_gradient").unwrap();
    assert_eq!(frame.rows[0].window_end, at(21, 3, 0));
    assert!(frame.rows[0].value < -89.0);
}

#[test]
fn test_tail_log_transform() {
    assert!((transforms::log_tail(3.0, 1.0, None) - (1.0 + 3.0_f64.ln())).abs() < 1e-12);
    assert!((transforms::log_tail(-3.0, 1.0, None) + (1.0 + 3.0_f64.ln())).abs() < 1e-12);
    assert_eq!(transforms::log_tail(0.5, 1.0, None), 0.5);
    assert_eq!(transforms::sign(-0.3), -1.0);
    assert!((transforms::log(100.0, Some(10.0)) - 2.0).abs() < 1e-12);
}

#[test]
fn test_transform_applied_after_aggregation() {
    let ticks = vec![quote(at(20, 21, 0), -0.5, 2), quote(at(20, 22, 0), 2.0, 2)];
    let group = FeatureGroupConfig::new(Timeframe::from_secs(10)).with_feature(
        FeatureConfig::new("bid_sign", FeatureFunc::Last, Column::Bid).with_transform(Transform::Sign),
    );
    let out = engine(group.clone()).compute_group(&group, &ticks, PIP, None).unwrap();
    assert_eq!(out.frame("bid_sign").unwrap().values(), vec![1.0]);
}

#[test]
fn test_model_input_forward_fills_gaps() {
    let ticks = vec![quote(at(20, 21, 0), 1.1, 2), quote(at(20, 51, 0), 1.2, 2)];
    let group = FeatureGroupConfig::new(Timeframe::from_secs(10))
        .with_window_len(4)
        .with_feature(FeatureConfig::new("bid_last", FeatureFunc::Last, Column::Bid));
    let out = engine(group.clone()).compute_group(&group, &ticks, PIP, None).unwrap();

    let input = out.to_model_input(at(20, 53, 0), 4, FillPolicy::ForwardFill).unwrap();
    assert_eq!(input.dim(), (4, 1));
    assert_eq!(input.column(0).to_vec(), vec![1.1, 1.1, 1.1, 1.2]);

    let zeros = out.to_model_input(at(20, 53, 0), 4, FillPolicy::Zero).unwrap();
    assert_eq!(zeros.column(0).to_vec(), vec![1.1, 0.0, 0.0, 1.2]);
}

#[test]
fn test_invalid_groups_rejected() {
    let one_hot_on_bid = FeatureGroupConfig::new(Timeframe::from_secs(10))
        .with_feature(FeatureConfig::new("flags", FeatureFunc::OneHotFlag, Column::Bid));
    assert!(FeatureEngine::new(vec![one_hot_on_bid], Timeframe::from_secs(3)).is_err());

    let duplicate = FeatureGroupConfig::new(Timeframe::from_secs(10))
        .with_feature(FeatureConfig::new("x", FeatureFunc::Last, Column::Bid))
        .with_feature(FeatureConfig::new("x", FeatureFunc::Mean, Column::Ask));
    assert!(FeatureEngine::new(vec![duplicate], Timeframe::from_secs(3)).is_err());

    let empty = FeatureGroupConfig::new(Timeframe::from_secs(10));
    assert!(FeatureEngine::new(vec![empty], Timeframe::from_secs(3)).is_err());
}

#[test]
fn test_feature_config_from_toml() {
    let text = r#"
        timeframe = "1m"
        window_len = 30

        [[features]]
        name = "ask_skew"
        func = "skew"
        inputs = ["ask"]
        kwargs = { min_num = 20 }
        transform = { kind = "log_tail", threshold = 1.0 }
    "#;
    let group: FeatureGroupConfig = toml::from_str(text).unwrap();
    assert_eq!(group.timeframe, Timeframe::from_secs(60));
    assert_eq!(group.fill, FillPolicy::ForwardFill);
    assert_eq!(group.features[0].kwargs.min_num(), 20);
    assert_eq!(
        group.features[0].transform,
        Some(Transform::LogTail { threshold: 1.0, base: None })
    );
    assert!(group.validate().is_ok());
}
