//! Tick Features
//!
//! Streaming tick-to-feature engine for a trading agent.
//!
//! # Overview
//!
//! This library keeps a rolling window of raw ticks per instrument, pulled
//! from a trading terminal over an HTTP bridge, and turns it into
//! timeframe-aligned feature matrices on a fixed action grid:
//!
//! - **Tick buffers**: delta appends from the last held second, 24h retention
//!   extended over weekends
//! - **Feature functions**: last, mean, min/max, skew, flag one-hot, gradient
//! - **Bridge client**: health check, one re-initialization, then fatal
//! - **Consistency checks**: re-fetch the appended tail and compare
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Tick Features                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  time/        - Timeframes, action grid, broker clock           │
//! │  client       - Terminal bridge client with recovery            │
//! │  buffer       - Rolling tick windows and retention              │
//! │  features/    - Feature functions over grouped windows          │
//! │  validation   - Tick/feature sanity and consistency checks      │
//! │  pipeline     - Per-agent handler and control loop              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tick_features::prelude::*;
//!
//! let config = AgentConfig::load("agent.toml")?;
//! let bridge = HttpBridge::new(&config.broker.bridge_url, config.broker.request_timeout())?;
//! let mut handler = TickHandler::new(config, bridge)?;
//!
//! let now = handler.config().broker.clock.now();
//! handler.init_tick_data(now)?;
//! let snapshot = handler.compute_features(now)?;
//! ```

pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod prelude;
pub mod time;
pub mod types;
pub mod validation;

// Re-exports - Core types
pub use error::{Result, TickError};
pub use types::{Column, RawTick, Tick, TickWindow};

// Re-exports - Config
pub use config::{AgentConfig, BrokerConfig, InstrumentConfig, TradeConfig};

// Re-exports - Time
pub use time::{BrokerClock, Timeframe};

// Re-exports - Buffers
pub use buffer::{append_delta, AppendReport, RetentionPolicy, TickStore};

// Re-exports - Client
pub use client::{Credentials, HealthStatus, HttpBridge, TerminalBridge, TickClient};

// Re-exports - Features
pub use features::{
    FeatureConfig, FeatureEngine, FeatureFunc, FeatureGroupConfig, FeatureGroupOutput,
    FeatureRecord, FillPolicy, Transform,
};

// Re-exports - Validation
pub use validation::{
    validate_timestamps, verify, ConsistencyChecker, ConsistencyReport, FeatureValidator,
    Mismatch, ValidationConfig, ValidationLevel, ValidationResult,
};

// Re-exports - Pipeline
pub use pipeline::{
    ControlLoop, FeatureSink, FeatureSnapshot, JsonLinesSink, MemorySink, TickHandler,
};
