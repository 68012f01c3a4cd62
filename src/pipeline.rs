//! Control loop: tick maintenance and feature emission for one agent.
//!
//! # Architecture
//!
//! ```text
//!  BrokerClock ─▶ wait_until_next_boundary ─▶ sleep
//!                                               │
//!                                               ▼
//!  TickClient ──fetch delta──▶ TickStore::append ──▶ ConsistencyChecker (re-fetch tail)
//!                                     │
//!                                     ▼
//!                              FeatureEngine ──▶ FeatureSnapshot ──▶ FeatureSink
//! ```
//!
//! [`TickHandler`] owns everything one agent needs: configuration, bridge
//! client, tick windows, feature engine. Nothing is global; a second agent is
//! a second handler with its own copy of the windows.
//!
//! # Cycle
//!
//! 1. Download `history_hours` of ticks once at start-up
//! 2. At each action boundary fetch from the last held second to now
//! 3. Append the delta (boundary ticks replaced, retention trimmed)
//! 4. Re-fetch the tail and compare (mismatches logged, never fatal)
//! 5. Compute every feature group over closed windows and emit
//!
//! # Example
//!
//! ```ignore
//! use tick_features::prelude::*;
//!
//! let config = AgentConfig::load_toml("agent.toml")?;
//! let bridge = HttpBridge::new(&config.broker.bridge_url, config.broker.request_timeout())?;
//! let handler = TickHandler::new(config, bridge)?;
//! let mut control = ControlLoop::new(handler, JsonLinesSink::stdout());
//! control.run()?;
//! ```

use crate::buffer::{AppendReport, TickStore};
use crate::client::{TerminalBridge, TickClient};
use crate::config::AgentConfig;
use crate::error::{Result, TickError};
use crate::features::{to_records, FeatureEngine, FeatureGroupOutput, FeatureRecord};
use crate::time::{floor_to_second, last_closed_boundary, wait_until_next_boundary, BrokerClock, Timeframe};
use crate::types::TickWindow;
use crate::validation::{ConsistencyChecker, ConsistencyReport, FeatureValidator};
use ahash::AHashMap;
use chrono::{Duration, NaiveDateTime};
use log::{debug, error, info, warn};
use ndarray::Array2;
use std::io::{self, Write};

/// Feature group result ready for the model.
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    pub timeframe: Timeframe,
    /// Newest closed window end
    pub window_end: NaiveDateTime,
    /// Sparse per-window values
    pub output: FeatureGroupOutput,
    /// Dense `window_len x columns` matrix ending at `window_end`
    pub input: Array2<f64>,
}

impl GroupSnapshot {
    /// Values of the newest grid row, one record per column.
    pub fn latest_records(&self, symbol: &str) -> Vec<FeatureRecord> {
        let Some(last) = self.input.rows().into_iter().last() else {
            return Vec::new();
        };
        self.output
            .frames
            .iter()
            .zip(last.iter())
            .map(|(frame, &value)| FeatureRecord {
                timestamp: self.window_end,
                symbol: symbol.to_string(),
                timeframe: self.timeframe,
                feature: frame.name.clone(),
                value,
            })
            .collect()
    }
}

/// All feature groups for one instrument.
#[derive(Debug, Clone)]
pub struct SymbolFeatures {
    pub symbol: String,
    pub groups: Vec<GroupSnapshot>,
}

/// Features computed in one cycle.
#[derive(Debug, Clone)]
pub struct FeatureSnapshot {
    /// Broker time the cycle ran at
    pub timestamp: NaiveDateTime,
    pub symbols: Vec<SymbolFeatures>,
}

impl FeatureSnapshot {
    /// Every computed window, ordered by timestamp within each symbol.
    pub fn records(&self) -> Vec<FeatureRecord> {
        self.symbols
            .iter()
            .flat_map(|s| {
                let outputs: Vec<FeatureGroupOutput> = s.groups.iter().map(|g| g.output.clone()).collect();
                to_records(&s.symbol, &outputs)
            })
            .collect()
    }

    /// Newest grid row of every group.
    pub fn latest_records(&self) -> Vec<FeatureRecord> {
        self.symbols
            .iter()
            .flat_map(|s| s.groups.iter().flat_map(|g| g.latest_records(&s.symbol)))
            .collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolFeatures> {
        self.symbols.iter().find(|s| s.symbol == symbol)
    }
}

/// Consumer of per-cycle feature output.
pub trait FeatureSink {
    fn emit(&mut self, snapshot: &FeatureSnapshot) -> Result<()>;
}

/// Writes the newest record of every column as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> FeatureSink for JsonLinesSink<W> {
    fn emit(&mut self, snapshot: &FeatureSnapshot) -> Result<()> {
        for record in snapshot.latest_records() {
            serde_json::to_writer(&mut self.writer, &record)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps the latest snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<FeatureSnapshot>,
}

impl FeatureSink for MemorySink {
    fn emit(&mut self, snapshot: &FeatureSnapshot) -> Result<()> {
        self.snapshots.push(snapshot.clone());
        Ok(())
    }
}

/// Owned per-agent context: configuration, bridge client, tick windows.
pub struct TickHandler<B: TerminalBridge> {
    config: AgentConfig,
    client: TickClient<B>,
    store: TickStore,
    engine: FeatureEngine,
    checker: ConsistencyChecker,
    validator: FeatureValidator,
    /// Last tick time before the latest update, per symbol
    pending_checks: AHashMap<String, NaiveDateTime>,
}

impl<B: TerminalBridge> TickHandler<B> {
    /// Validates the configuration and wires the components.
    pub fn new(config: AgentConfig, bridge: B) -> Result<Self> {
        config.validate()?;

        let client = TickClient::new(bridge, config.broker.credentials.clone())
            .with_reinit_backoff(config.broker.reinit_backoff());
        let engine = FeatureEngine::new(config.feature_groups.clone(), config.trade.action_offset)?;

        Ok(Self {
            store: TickStore::new(config.retention),
            checker: ConsistencyChecker::new(config.check_lookback),
            validator: FeatureValidator::new(),
            pending_checks: AHashMap::new(),
            engine,
            client,
            config,
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn store(&self) -> &TickStore {
        &self.store
    }

    pub fn client(&self) -> &TickClient<B> {
        &self.client
    }

    pub fn window(&self, symbol: &str) -> Option<&TickWindow> {
        self.store.get(symbol)
    }

    /// Download `history_hours` of ticks ending at `now` for every instrument.
    pub fn init_tick_data(&mut self, now: NaiveDateTime) -> Result<()> {
        let start = now - Duration::hours(self.config.history_hours as i64);
        for inst in &self.config.instruments {
            let window = self.client.fetch_ticks(&inst.symbol, start, now)?;
            info!("{}: initialized with {} ticks from {start}", inst.symbol, window.len());
            self.store.insert(&inst.symbol, window);
        }
        self.pending_checks.clear();
        Ok(())
    }

    /// Fetch and append ticks since the last held second, up to `now`.
    ///
    /// Instruments without data yet get a full history download.
    pub fn update_tick_data(&mut self, now: NaiveDateTime) -> Result<Vec<(String, AppendReport)>> {
        let mut reports = Vec::with_capacity(self.config.instruments.len());
        for inst in &self.config.instruments {
            let symbol = inst.symbol.as_str();
            let Some(prev_last) = self.store.get(symbol).and_then(TickWindow::last_time) else {
                let start = now - Duration::hours(self.config.history_hours as i64);
                let window = self.client.fetch_ticks(symbol, start, now)?;
                info!("{symbol}: no ticks held, downloaded {} from {start}", window.len());
                self.store.insert(symbol, window);
                continue;
            };

            let delta = self.client.fetch_ticks(symbol, floor_to_second(prev_last), now)?;
            let quality = self.validator.validate_ticks(delta.ticks());
            if quality.has_errors() {
                warn!("{symbol}: suspicious ticks in update: {}", quality.errors().join("; "));
            }
            let report = self.store.append(symbol, delta);
            self.pending_checks.insert(symbol.to_string(), prev_last);
            reports.push((symbol.to_string(), report));
        }
        Ok(reports)
    }

    /// Re-fetch the tail of every window updated since the last check.
    ///
    /// Mismatches are logged by the checker and returned; only fetch failures
    /// are errors.
    pub fn check_tick_data(&mut self) -> Result<Vec<(String, ConsistencyReport)>> {
        let mut reports = Vec::with_capacity(self.pending_checks.len());
        let mut pending: Vec<(String, NaiveDateTime)> = self.pending_checks.drain().collect();
        pending.sort();

        for (symbol, since) in pending {
            let Some(window) = self.store.get(&symbol) else {
                continue;
            };
            let report = self.checker.check(&mut self.client, &symbol, window, since)?;
            reports.push((symbol, report));
        }
        Ok(reports)
    }

    /// Compute every feature group over windows closed by `now`.
    pub fn compute_features(&self, now: NaiveDateTime) -> Result<FeatureSnapshot> {
        let offset = self.config.trade.action_offset;
        let empty = TickWindow::new();
        let mut symbols = Vec::with_capacity(self.config.instruments.len());

        for inst in &self.config.instruments {
            let window = self.store.get(&inst.symbol).unwrap_or(&empty);
            let mut groups = Vec::new();

            for group in self.engine.groups().iter().filter(|g| g.applies_to(&inst.symbol)) {
                let output = self.engine.compute_group(group, window.ticks(), inst.pip, Some(now))?;

                let check = self.validator.validate_output(&output);
                if check.has_errors() {
                    warn!("{} {}: {}", inst.symbol, group.timeframe, check.errors().join("; "));
                }

                let window_end = last_closed_boundary(now, group.timeframe, offset);
                let input = output.to_model_input(window_end, group.window_len, group.fill)?;
                groups.push(GroupSnapshot {
                    timeframe: group.timeframe,
                    window_end,
                    output,
                    input,
                });
            }

            symbols.push(SymbolFeatures {
                symbol: inst.symbol.clone(),
                groups,
            });
        }

        debug!("Computed features for {} instruments at {now}", symbols.len());
        Ok(FeatureSnapshot { timestamp: now, symbols })
    }
}

/// Summary of one control-loop cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSummary {
    pub appended: usize,
    pub mismatches: usize,
    pub records: usize,
}

/// Sleep-update-compute-emit loop around a [`TickHandler`].
pub struct ControlLoop<B: TerminalBridge, S: FeatureSink> {
    handler: TickHandler<B>,
    sink: S,
    clock: BrokerClock,
    initialized: bool,
}

impl<B: TerminalBridge, S: FeatureSink> ControlLoop<B, S> {
    pub fn new(handler: TickHandler<B>, sink: S) -> Self {
        let clock = handler.config().broker.clock;
        Self {
            handler,
            sink,
            clock,
            initialized: false,
        }
    }

    pub fn handler(&self) -> &TickHandler<B> {
        &self.handler
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Download the start-up history.
    pub fn initialize(&mut self, now: NaiveDateTime) -> Result<()> {
        self.handler.init_tick_data(now)?;
        self.initialized = true;
        Ok(())
    }

    /// One cycle at broker time `now`. Initializes first if needed.
    pub fn run_cycle(&mut self, now: NaiveDateTime) -> Result<CycleSummary> {
        let mut summary = CycleSummary::default();

        if !self.initialized {
            self.initialize(now)?;
        } else {
            let reports = self.handler.update_tick_data(now)?;
            summary.appended = reports.iter().map(|(_, r)| r.appended).sum();

            if self.handler.config().check_consistency {
                let checks = self.handler.check_tick_data()?;
                summary.mismatches = checks.iter().filter(|(_, r)| !r.passed).count();
            }
        }

        let snapshot = self.handler.compute_features(now)?;
        summary.records = snapshot.latest_records().len();
        self.sink.emit(&snapshot)?;
        Ok(summary)
    }

    /// Run until a fatal error.
    ///
    /// Sleeps to each action boundary on the broker clock, skips closed
    /// market periods, and keeps going after recoverable errors.
    pub fn run(&mut self) -> Result<()> {
        let trade = self.handler.config().trade;
        info!(
            "Starting control loop for {} ({} / offset {})",
            self.handler.config().agent_version,
            trade.timeframe,
            trade.action_offset
        );

        loop {
            let wait = wait_until_next_boundary(trade.timeframe, trade.action_offset, self.clock.now());
            std::thread::sleep(wait.sleep);
            if wait.market_closed {
                continue;
            }

            let now = self.clock.now();
            match self.run_cycle(now) {
                Ok(summary) => debug!(
                    "Cycle {now}: {} ticks appended, {} mismatches, {} records",
                    summary.appended, summary.mismatches, summary.records
                ),
                Err(e) if e.is_recoverable() => warn!("Cycle {now} failed, continuing: {e}"),
                Err(e) => {
                    error!("Cycle {now} failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

/// Model input for `symbol`'s group at `timeframe` in a snapshot.
pub fn model_input<'a>(snapshot: &'a FeatureSnapshot, symbol: &str, timeframe: Timeframe) -> Result<&'a Array2<f64>> {
    snapshot
        .get(symbol)
        .and_then(|s| s.groups.iter().find(|g| g.timeframe == timeframe))
        .map(|g| &g.input)
        .ok_or_else(|| TickError::generic(format!("no {timeframe} features for {symbol}")))
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::ScriptedBridge;
    use crate::types::{RawTick, Tick};
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    /// Quotes every 250ms from 10:00:00 to 10:04:59.750.
    fn server_ticks() -> Vec<RawTick> {
        (0..1200)
            .map(|i| {
                let bid = 1.1 + i as f64 * 1e-5;
                let flags = if i % 2 == 0 { 2 } else { 6 };
                RawTick::from(&Tick::quote(
                    at(10, 0, 0) + Duration::milliseconds(i * 250),
                    bid,
                    bid + 0.0002,
                    flags,
                ))
            })
            .collect()
    }

    fn handler_over(ticks: Vec<RawTick>) -> TickHandler<ScriptedBridge> {
        let mut config = AgentConfig::default();
        config.broker.reinit_backoff_secs = 0;
        TickHandler::new(config, ScriptedBridge::healthy(ticks)).unwrap()
    }

    fn handler() -> TickHandler<ScriptedBridge> {
        handler_over(server_ticks())
    }

    #[test]
    fn test_init_downloads_history_before_now() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();

        let window = h.window("EURUSD").unwrap();
        assert_eq!(window.len(), 480);
        assert_eq!(window.last_time(), Some(at(10, 1, 59) + Duration::milliseconds(750)));
    }

    #[test]
    fn test_update_appends_delta_from_last_second() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();

        let reports = h.update_tick_data(at(10, 3, 0)).unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, "EURUSD");

        let window = h.window("EURUSD").unwrap();
        assert_eq!(window.len(), 720);
        assert_eq!(window.last_time(), Some(at(10, 2, 59) + Duration::milliseconds(750)));
        assert!(crate::types::is_time_ordered(window.ticks()));
    }

    #[test]
    fn test_update_without_history_downloads_full_window() {
        let mut h = handler();
        let reports = h.update_tick_data(at(10, 1, 0)).unwrap();
        assert!(reports.is_empty());
        assert_eq!(h.window("EURUSD").unwrap().len(), 240);
    }

    #[test]
    fn test_check_drains_pending_symbols() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();
        h.update_tick_data(at(10, 3, 0)).unwrap();

        let checks = h.check_tick_data().unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].1.passed);
        assert!(checks[0].1.compared > 0);

        assert!(h.check_tick_data().unwrap().is_empty());
    }

    /// Server ticks with an exact repeat of the tick at `index`.
    fn ticks_with_repeat(index: usize) -> Vec<RawTick> {
        let mut ticks = server_ticks();
        ticks.insert(index + 1, ticks[index].clone());
        ticks
    }

    #[test]
    fn test_repeated_tick_in_checked_tail_is_consistent() {
        // 10:02:30.000 is tick #600, inside the tail re-verified after 10:03
        let mut h = handler_over(ticks_with_repeat(600));
        h.init_tick_data(at(10, 2, 0)).unwrap();
        h.update_tick_data(at(10, 3, 0)).unwrap();

        let checks = h.check_tick_data().unwrap();
        assert_eq!(checks.len(), 1);
        assert!(checks[0].1.passed, "{:?}", checks[0].1.mismatches);
    }

    #[test]
    fn test_repeated_tick_in_history_is_dropped() {
        let mut h = handler_over(ticks_with_repeat(100));
        h.init_tick_data(at(10, 2, 0)).unwrap();
        h.update_tick_data(at(10, 3, 0)).unwrap();

        let window = h.window("EURUSD").unwrap();
        assert_eq!(window.len(), 720);
        assert!(window.ticks().windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn test_compute_features_shapes() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();

        let snapshot = h.compute_features(at(10, 2, 0)).unwrap();
        let eurusd = snapshot.get("EURUSD").unwrap();
        assert_eq!(eurusd.groups.len(), 2);

        let fast = &eurusd.groups[0];
        assert_eq!(fast.window_end, at(10, 1, 53));
        assert_eq!(fast.input.dim(), (60, 7));

        // bid_last of the window closing at 10:01:53 is tick #452
        let last_row = fast.input.row(59);
        assert!((last_row[0] - (1.1 + 452.0 * 1e-5)).abs() < 1e-12);

        let slow = &eurusd.groups[1];
        assert_eq!(slow.input.dim(), (30, 1));
        assert!(model_input(&snapshot, "EURUSD", Timeframe::from_secs(60)).is_ok());
        assert!(model_input(&snapshot, "GBPUSD", Timeframe::from_secs(60)).is_err());
    }

    #[test]
    fn test_open_window_not_emitted() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();

        let snapshot = h.compute_features(at(10, 2, 0)).unwrap();
        let output = &snapshot.get("EURUSD").unwrap().groups[0].output;
        assert_eq!(output.last_window_end(), Some(at(10, 1, 53)));
    }

    #[test]
    fn test_jsonl_sink_writes_latest_row() {
        let mut h = handler();
        h.init_tick_data(at(10, 2, 0)).unwrap();
        let snapshot = h.compute_features(at(10, 2, 0)).unwrap();

        let mut sink = JsonLinesSink::new(Vec::new());
        sink.emit(&snapshot).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 8);
        let first: FeatureRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.symbol, "EURUSD");
        assert_eq!(first.feature, "bid_last");
        assert_eq!(first.timestamp, at(10, 1, 53));
    }

    #[test]
    fn test_control_loop_cycles() {
        let mut control = ControlLoop::new(handler(), MemorySink::default());

        let first = control.run_cycle(at(10, 2, 0)).unwrap();
        assert_eq!(first.appended, 0);
        assert_eq!(first.records, 8);

        let second = control.run_cycle(at(10, 2, 10)).unwrap();
        assert!(second.appended >= 40);
        assert_eq!(second.mismatches, 0);

        let sink = control.into_sink();
        assert_eq!(sink.snapshots.len(), 2);
        assert_eq!(sink.snapshots[1].timestamp, at(10, 2, 10));
    }
}
