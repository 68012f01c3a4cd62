//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use tick_features::prelude::*;
//!
//! let config = AgentConfig::default();
//! let bridge = HttpBridge::new(&config.broker.bridge_url, config.broker.request_timeout())?;
//! let handler = TickHandler::new(config, bridge)?;
//! ControlLoop::new(handler, JsonLinesSink::stdout()).run()?;
//! ```
//!
//! # What's Included
//!
//! ## Control Loop
//! - [`TickHandler`] - Per-agent tick maintenance and feature computation
//! - [`ControlLoop`] - Sleep/update/compute/emit loop
//! - [`FeatureSink`], [`JsonLinesSink`] - Output of each cycle
//!
//! ## Configuration
//! - [`AgentConfig`] - Whole-agent configuration
//! - [`FeatureGroupConfig`], [`FeatureConfig`] - Feature definitions
//!
//! ## Data
//! - [`Tick`], [`TickWindow`], [`Column`]
//! - [`Timeframe`], [`BrokerClock`]

// ============================================================================
// Control Loop
// ============================================================================

pub use crate::pipeline::{
    ControlLoop, FeatureSink, FeatureSnapshot, GroupSnapshot, JsonLinesSink, MemorySink,
    SymbolFeatures, TickHandler,
};

// ============================================================================
// Configuration
// ============================================================================

pub use crate::config::{AgentConfig, BrokerConfig, InstrumentConfig, TradeConfig};
pub use crate::features::{FeatureConfig, FeatureFunc, FeatureGroupConfig, FillPolicy, Transform};

// ============================================================================
// Data
// ============================================================================

pub use crate::buffer::{AppendReport, RetentionPolicy, TickStore};
pub use crate::time::{BrokerClock, Timeframe};
pub use crate::types::{Column, RawTick, Tick, TickWindow};

// ============================================================================
// Bridge
// ============================================================================

pub use crate::client::{Credentials, HttpBridge, TerminalBridge, TickClient};

// ============================================================================
// Features and Validation
// ============================================================================

pub use crate::features::{FeatureEngine, FeatureGroupOutput, FeatureRecord};
pub use crate::validation::{ConsistencyChecker, ConsistencyReport, FeatureValidator};

pub use crate::error::{Result, TickError};
