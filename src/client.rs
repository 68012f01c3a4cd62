//! Tick data client for the trading terminal bridge.
//!
//! The terminal runs behind a small HTTP bridge:
//!
//! | Endpoint | Method | Body | Response |
//! |---|---|---|---|
//! | `/healthcheck` | GET | - | `{"status": "ok", ...terminal metadata}` |
//! | `/init` | POST | `{server, login, password}` | terminal ready |
//! | `/get_tick_data` | GET | `{symbol, dt0, dt1}` | tick records |
//!
//! `dt0`/`dt1` use [`BRIDGE_TIME_FORMAT`](crate::time::BRIDGE_TIME_FORMAT).
//! Tick records arrive either as a list of objects or as one object of
//! parallel column arrays, with `time_msc` as millisecond epoch integers.
//!
//! # Recovery
//!
//! ```text
//! check ──ok──▶ fetch
//!   │
//!  fail ──▶ warn ──▶ initialize(credentials) ──▶ sleep(backoff) ──▶ check ──ok──▶ fetch
//!                                                                     │
//!                                                                    fail ──▶ BridgeUnavailable
//! ```
//!
//! The bridge sits behind the [`TerminalBridge`] trait so the client and the
//! control loop can run against an in-memory bridge in tests.

use crate::error::{Result, TickError};
use crate::time::format_bridge_time;
use crate::types::{RawTick, Tick, TickWindow};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default wait between re-initialization and the second health check.
pub const DEFAULT_REINIT_BACKOFF: Duration = Duration::from_secs(15);

/// Default HTTP request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Terminal login credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub server: String,
    pub login: u64,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server", &self.server)
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Health check response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    /// Terminal metadata reported alongside the status
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl HealthStatus {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            metadata: Default::default(),
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Request body for `/get_tick_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRequest {
    pub symbol: String,
    pub dt0: String,
    pub dt1: String,
}

impl TickRequest {
    pub fn new(symbol: &str, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.to_string(),
            dt0: format_bridge_time(start),
            dt1: format_bridge_time(end),
        }
    }
}

/// Column-oriented tick payload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TickColumns {
    pub ask: Vec<f64>,
    pub bid: Vec<f64>,
    pub last: Vec<f64>,
    pub volume: Vec<f64>,
    pub volume_real: Vec<f64>,
    pub flags: Vec<i32>,
    pub time_msc: Vec<i64>,
}

/// Tick payload in either of the shapes the bridge emits.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TickPayload {
    Records(Vec<RawTick>),
    Columns(TickColumns),
}

impl TickPayload {
    /// Flatten into records. Short columns leave fields unset, which
    /// conversion to [`Tick`] reports as malformed.
    pub fn into_records(self) -> Vec<RawTick> {
        match self {
            TickPayload::Records(records) => records,
            TickPayload::Columns(c) => (0..c.time_msc.len())
                .map(|i| RawTick {
                    ask: c.ask.get(i).copied(),
                    bid: c.bid.get(i).copied(),
                    last: c.last.get(i).copied(),
                    volume: c.volume.get(i).copied(),
                    volume_real: c.volume_real.get(i).copied(),
                    flags: c.flags.get(i).copied(),
                    time_msc: c.time_msc.get(i).copied(),
                })
                .collect(),
        }
    }
}

/// Transport to the trading terminal.
pub trait TerminalBridge {
    /// Where the bridge lives, for error messages.
    fn endpoint(&self) -> &str;

    fn health_check(&self) -> Result<HealthStatus>;

    /// Log the terminal in. Returns whether the bridge accepted the request.
    fn initialize(&self, credentials: &Credentials) -> Result<bool>;

    fn fetch_ticks(&self, symbol: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<RawTick>>;
}

/// Blocking HTTP bridge.
#[derive(Debug, Clone)]
pub struct HttpBridge {
    base_url: String,
    http: reqwest::blocking::Client,
}

impl HttpBridge {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl TerminalBridge for HttpBridge {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    fn health_check(&self) -> Result<HealthStatus> {
        let resp = self.http.get(self.url("healthcheck")).send()?.error_for_status()?;
        Ok(resp.json()?)
    }

    fn initialize(&self, credentials: &Credentials) -> Result<bool> {
        let resp = self.http.post(self.url("init")).json(credentials).send()?;
        Ok(resp.status().is_success())
    }

    fn fetch_ticks(&self, symbol: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<Vec<RawTick>> {
        let resp = self
            .http
            .get(self.url("get_tick_data"))
            .json(&TickRequest::new(symbol, start, end))
            .send()?
            .error_for_status()?;
        let payload: TickPayload = resp.json()?;
        Ok(payload.into_records())
    }
}

/// Fetches normalized tick windows, re-initializing the bridge when needed.
#[derive(Debug)]
pub struct TickClient<B: TerminalBridge> {
    bridge: B,
    credentials: Credentials,
    reinit_backoff: Duration,
    logged_in: bool,
}

impl<B: TerminalBridge> TickClient<B> {
    pub fn new(bridge: B, credentials: Credentials) -> Self {
        Self {
            bridge,
            credentials,
            reinit_backoff: DEFAULT_REINIT_BACKOFF,
            logged_in: false,
        }
    }

    pub fn with_reinit_backoff(mut self, backoff: Duration) -> Self {
        self.reinit_backoff = backoff;
        self
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }

    /// Check bridge health, re-initializing once if it is down.
    ///
    /// The first healthy check also logs the terminal in with the stored
    /// credentials.
    ///
    /// # Errors
    ///
    /// [`TickError::BridgeUnavailable`] when the check fails again after
    /// re-initialization.
    pub fn ensure_ready(&mut self) -> Result<HealthStatus> {
        let first = self.bridge.health_check();
        let status = match first {
            Ok(status) if status.is_ok() => status,
            other => {
                let reason = health_failure(&other);
                warn!("Terminal bridge {} unhealthy ({reason}), re-initializing", self.bridge.endpoint());
                self.login();
                std::thread::sleep(self.reinit_backoff);

                match self.bridge.health_check() {
                    Ok(status) if status.is_ok() => {
                        info!("Terminal bridge {} recovered", self.bridge.endpoint());
                        status
                    }
                    second => {
                        return Err(TickError::BridgeUnavailable {
                            url: self.bridge.endpoint().to_string(),
                            reason: health_failure(&second),
                        })
                    }
                }
            }
        };

        if !self.logged_in {
            self.login();
        }
        Ok(status)
    }

    fn login(&mut self) {
        match self.bridge.initialize(&self.credentials) {
            Ok(true) => {
                debug!("Terminal initialized on {}", self.credentials.server);
                self.logged_in = true;
            }
            Ok(false) => warn!("Terminal rejected initialization on {}", self.credentials.server),
            Err(e) => warn!("Terminal initialization request failed: {e}"),
        }
    }

    /// Ticks for `symbol` in `[start, end)`, sorted by time.
    ///
    /// # Errors
    ///
    /// Bridge unavailable after retry, transport failure, or a record missing
    /// a field.
    pub fn fetch_ticks(&mut self, symbol: &str, start: NaiveDateTime, end: NaiveDateTime) -> Result<TickWindow> {
        self.ensure_ready()?;

        let raw = self.bridge.fetch_ticks(symbol, start, end)?;
        let received = raw.len();
        let ticks = raw
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.into_tick(i))
            .filter(|t| match t {
                Ok(t) => t.time_msc >= start && t.time_msc < end,
                Err(_) => true,
            })
            .collect::<Result<Vec<Tick>>>()?;

        debug!("{symbol}: downloaded {received} ticks, kept {} in [{start}, {end})", ticks.len());
        Ok(TickWindow::from_ticks(ticks))
    }
}

fn health_failure(result: &Result<HealthStatus>) -> String {
    match result {
        Ok(status) => format!("status '{}'", status.status),
        Err(e) => e.to_string(),
    }
}
