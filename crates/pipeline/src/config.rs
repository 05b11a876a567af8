//! Pipeline configuration.
//!
//! [`PipelineConfig`] carries the plain-data settings of one API surface. It
//! can be built in code (starting from [`PipelineConfig::new`]) or loaded from
//! JSON with [`PipelineConfig::from_json_str`]. Behavioural settings such as
//! default header providers are closures and live on
//! [`crate::PipelineBuilder`] instead.
//!
//! ## Example
//!
//! ```json
//! {
//!   "server_url": "https://api.example.com/v1",
//!   "format": "json",
//!   "compress": false,
//!   "retry_count": 5,
//!   "retry_delay_seconds": 0.5,
//!   "headers": { "x-client": "courier" }
//! }
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PipelineError, WireFormat};

/// Default number of retries after the first failed attempt.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default delay between attempts, in seconds.
pub const DEFAULT_RETRY_DELAY_SECONDS: f64 = 2.0;

/// Default per-exchange transport timeout, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 3;

/// Settings for one [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL every request path is joined onto.
    pub server_url: String,

    /// Compress outgoing bodies and decompress incoming ones.
    #[serde(default = "default_compress")]
    pub compress: bool,

    /// Wire format for request and response bodies.
    #[serde(default)]
    pub format: WireFormat,

    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Delay between a failed attempt and the next one.
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: f64,

    /// Timeout handed to the transport for each exchange.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Headers merged into every request. Caller-supplied headers win.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_compress() -> bool {
    true
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_retry_delay_seconds() -> f64 {
    DEFAULT_RETRY_DELAY_SECONDS
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

impl PipelineConfig {
    /// Creates a configuration for `server_url` with every other setting at
    /// its default.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            compress: default_compress(),
            format: WireFormat::default(),
            retry_count: DEFAULT_RETRY_COUNT,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECONDS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            headers: BTreeMap::new(),
        }
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// An unknown `format` tag is reported as
    /// [`PipelineError::UnsupportedFormat`]; any other problem as
    /// [`PipelineError::Configuration`].
    pub fn from_json_str(json: &str) -> Result<Self, PipelineError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| PipelineError::configuration(format!("invalid config JSON: {e}")))?;

        if let Some(tag) = value.get("format").and_then(serde_json::Value::as_str) {
            tag.parse::<WireFormat>()?;
        }

        let config: Self = serde_json::from_value(value)
            .map_err(|e| PipelineError::configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.server_url.trim().is_empty() {
            return Err(PipelineError::configuration("server_url must not be empty"));
        }
        if !self.retry_delay_seconds.is_finite() || self.retry_delay_seconds < 0.0 {
            return Err(PipelineError::configuration(format!(
                "retry_delay_seconds must be a non-negative number, got {}",
                self.retry_delay_seconds
            )));
        }
        Ok(())
    }

    /// The delay between attempts. Only meaningful on a validated config.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_seconds).unwrap_or_default()
    }

    /// The per-exchange transport timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
