//! Error types for the tick feature engine.
//!
//! Feature functions never return these for sparse or empty groups; errors are
//! reserved for bad configuration, malformed bridge payloads, and a terminal
//! bridge that stays unhealthy after one re-initialization.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, TickError>;

/// Errors surfaced by the tick feature engine.
#[derive(Error, Debug)]
pub enum TickError {
    /// Timeframe string could not be parsed (e.g. `"10x"`, `"0s"`).
    #[error("Invalid timeframe '{0}': expected <number><ms|s|m|min|h|d>")]
    InvalidTimeframe(String),

    /// Configuration failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A tick record from the bridge is missing a required field.
    #[error("Malformed tick payload: missing field '{field}' in record {index}")]
    MalformedPayload { field: &'static str, index: usize },

    /// A feature references a column it cannot be computed from.
    #[error("Feature '{feature}' requires input column '{column}'")]
    MissingColumn { feature: String, column: String },

    /// Terminal bridge still unhealthy after re-initialization.
    #[error("Terminal bridge at {url} unavailable: {reason}")]
    BridgeUnavailable { url: String, reason: String },

    /// Transport-level HTTP failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else, with a message.
    #[error("{0}")]
    Generic(String),
}

impl TickError {
    /// Build a generic error from any message.
    pub fn generic(msg: impl Into<String>) -> Self {
        TickError::Generic(msg.into())
    }

    /// Build a configuration error from any message.
    pub fn config(msg: impl Into<String>) -> Self {
        TickError::Config(msg.into())
    }

    /// Whether the control loop may keep running after this error.
    ///
    /// Only transport hiccups qualify; everything else means the data or the
    /// configuration cannot be trusted.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TickError::Http(_))
    }
}

impl From<String> for TickError {
    fn from(msg: String) -> Self {
        TickError::Generic(msg)
    }
}
