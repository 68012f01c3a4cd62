//! Agent configuration management.
//!
//! One immutable configuration per agent version, combining the terminal
//! bridge, the traded instruments, the action grid, retention, and the
//! feature groups the model consumes.
//!
//! # Features
//!
//! - **Unified Configuration**: Single struct for the whole control loop
//! - **Serialization**: Save/load configurations to TOML or JSON
//! - **Validation**: Checked on load, before the loop touches the bridge
//!
//! # Example
//!
//! ```toml
//! agent_version = "t00001"
//! history_hours = 72
//!
//! [broker]
//! name = "metaquotes"
//! bridge_url = "http://127.0.0.1:2000"
//! credentials = { server = "MetaQuotes-Demo", login = 1234, password = "secret" }
//! clock = { kind = "eu_dst", standard_hours = 2 }
//!
//! [[instruments]]
//! symbol = "EURUSD"
//! pip = 0.0001
//!
//! [trade]
//! timeframe = "10s"
//! action_offset = "3s"
//!
//! [[feature_groups]]
//! timeframe = "10s"
//! window_len = 60
//!
//! [[feature_groups.features]]
//! name = "bid_skew"
//! func = "skew"
//! inputs = ["bid"]
//! kwargs = { min_num = 10 }
//! transform = { kind = "log_tail", threshold = 1.0 }
//! ```

use crate::buffer::RetentionPolicy;
use crate::client::Credentials;
use crate::error::{Result, TickError};
use crate::features::{FeatureConfig, FeatureFunc, FeatureGroupConfig};
use crate::time::{BrokerClock, Timeframe};
use crate::types::Column;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Complete configuration for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identifier, e.g. `"t00001"`
    pub agent_version: String,

    pub broker: BrokerConfig,

    pub instruments: Vec<InstrumentConfig>,

    pub trade: TradeConfig,

    #[serde(default)]
    pub retention: RetentionPolicy,

    /// Hours of history downloaded at start-up
    #[serde(default = "default_history_hours")]
    pub history_hours: u32,

    /// Ticks before the previous last tick re-verified after each update
    #[serde(default = "default_check_lookback")]
    pub check_lookback: usize,

    /// Re-fetch and compare after each update
    #[serde(default = "default_true")]
    pub check_consistency: bool,

    pub feature_groups: Vec<FeatureGroupConfig>,
}

/// Terminal bridge connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub name: String,

    /// Base URL of the terminal bridge
    pub bridge_url: String,

    #[serde(default)]
    pub credentials: Credentials,

    /// Broker server clock
    #[serde(default)]
    pub clock: BrokerClock,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Wait between re-initialization and the second health check
    #[serde(default = "default_reinit_backoff_secs")]
    pub reinit_backoff_secs: u64,
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn reinit_backoff(&self) -> Duration {
        Duration::from_secs(self.reinit_backoff_secs)
    }
}

/// A traded instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    /// Smallest meaningful price increment (1e-4 for EURUSD)
    pub pip: f64,
}

impl InstrumentConfig {
    pub fn new(symbol: impl Into<String>, pip: f64) -> Self {
        Self {
            symbol: symbol.into(),
            pip,
        }
    }

    /// Instrument with a well-known pip size.
    pub fn known(symbol: &str) -> Option<Self> {
        default_pip(symbol).map(|pip| Self::new(symbol, pip))
    }
}

/// Pip size of common instruments.
pub fn default_pip(symbol: &str) -> Option<f64> {
    match symbol {
        "XAUUSD" => Some(0.1),
        "ND100m" => Some(1.0),
        s if s.len() == 6 && s.ends_with("JPY") => Some(1e-2),
        s if s.len() == 6 && s.chars().all(|c| c.is_ascii_uppercase()) => Some(1e-4),
        _ => None,
    }
}

/// Action grid shared by the control loop and feature buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Decision period; must divide one minute
    pub timeframe: Timeframe,
    /// Phase of decision points within the period
    pub action_offset: Timeframe,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::from_secs(10),
            action_offset: Timeframe::from_secs(3),
        }
    }
}

fn default_history_hours() -> u32 {
    72
}

fn default_check_lookback() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_reinit_backoff_secs() -> u64 {
    15
}

impl Default for AgentConfig {
    fn default() -> Self {
        let price_group = FeatureGroupConfig::new(Timeframe::from_secs(10))
            .with_feature(FeatureConfig::new("bid_last", FeatureFunc::Last, Column::Bid))
            .with_feature(FeatureConfig::new("bid_min", FeatureFunc::Min, Column::Bid))
            .with_feature(FeatureConfig::new("bid_max", FeatureFunc::Max, Column::Bid))
            .with_feature(FeatureConfig::new("bid_skew", FeatureFunc::Skew, Column::Bid))
            .with_feature(FeatureConfig::new("flags", FeatureFunc::OneHotFlag, Column::Flags));
        let trend_group = FeatureGroupConfig::new(Timeframe::from_secs(60))
            .with_window_len(30)
            .with_feature(FeatureConfig::new("ask_gradient", FeatureFunc::Gradient, Column::Ask));

        Self {
            agent_version: "t00001".to_string(),
            broker: BrokerConfig {
                name: "metaquotes".to_string(),
                bridge_url: "http://127.0.0.1:2000".to_string(),
                credentials: Credentials::default(),
                clock: BrokerClock::default(),
                request_timeout_secs: default_request_timeout_secs(),
                reinit_backoff_secs: default_reinit_backoff_secs(),
            },
            instruments: vec![InstrumentConfig::new("EURUSD", 1e-4)],
            trade: TradeConfig::default(),
            retention: RetentionPolicy::default(),
            history_hours: default_history_hours(),
            check_lookback: default_check_lookback(),
            check_consistency: true,
            feature_groups: vec![price_group, trend_group],
        }
    }
}

impl AgentConfig {
    pub fn new(agent_version: impl Into<String>) -> Self {
        Self {
            agent_version: agent_version.into(),
            ..Default::default()
        }
    }

    pub fn with_instrument(mut self, instrument: InstrumentConfig) -> Self {
        self.instruments.push(instrument);
        self
    }

    pub fn with_feature_group(mut self, group: FeatureGroupConfig) -> Self {
        self.feature_groups.push(group);
        self
    }

    pub fn with_trade(mut self, trade: TradeConfig) -> Self {
        self.trade = trade;
        self
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentConfig> {
        self.instruments.iter().find(|i| i.symbol == symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().map(|i| i.symbol.as_str())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.agent_version.trim().is_empty() {
            return Err(TickError::config("agent_version must not be empty"));
        }
        if self.broker.bridge_url.trim().is_empty() {
            return Err(TickError::config("broker.bridge_url must not be empty"));
        }

        if self.instruments.is_empty() {
            return Err(TickError::config("at least one instrument is required"));
        }
        let mut seen = ahash::AHashSet::new();
        for inst in &self.instruments {
            if !(inst.pip.is_finite() && inst.pip > 0.0) {
                return Err(TickError::config(format!(
                    "instrument {}: pip must be > 0, got {}",
                    inst.symbol, inst.pip
                )));
            }
            if !seen.insert(inst.symbol.as_str()) {
                return Err(TickError::config(format!("duplicate instrument {}", inst.symbol)));
            }
        }

        let trade = &self.trade;
        if !trade.timeframe.divides_minute() {
            return Err(TickError::config(format!(
                "trade.timeframe {} must divide one minute",
                trade.timeframe
            )));
        }
        if trade.action_offset >= trade.timeframe {
            return Err(TickError::config(format!(
                "trade.action_offset {} must be shorter than trade.timeframe {}",
                trade.action_offset, trade.timeframe
            )));
        }

        if self.retention.base_hours == 0 {
            return Err(TickError::config("retention.base_hours must be > 0"));
        }
        if self.history_hours == 0 {
            return Err(TickError::config("history_hours must be > 0"));
        }

        if self.feature_groups.is_empty() {
            return Err(TickError::config("at least one feature group is required"));
        }
        for group in &self.feature_groups {
            group.validate()?;
            for symbol in &group.instruments {
                if self.instrument(symbol).is_none() {
                    return Err(TickError::config(format!(
                        "feature group {} references unknown instrument {symbol}",
                        group.timeframe
                    )));
                }
            }
        }

        Ok(())
    }

    /// Save configuration to TOML file.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    /// Load and validate configuration from TOML file.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AgentConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to JSON file.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string)?;
        Ok(())
    }

    /// Load and validate configuration from JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AgentConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load by file extension (`.json`, anything else as TOML).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::load_json(path),
            _ => Self::load_toml(path),
        }
    }
}
