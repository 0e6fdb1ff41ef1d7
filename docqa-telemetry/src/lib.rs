//! # docqa-telemetry
//!
//! Logging setup for docqa binaries and tests.
//!
//! [`init`] installs a global `tracing` subscriber with an `EnvFilter`
//! (`RUST_LOG`, falling back to the configured default) and one of three
//! output formats. The [`capture`] module records events in memory so tests
//! can assert on what was logged.
//!
//! ```rust,ignore
//! use docqa_telemetry::{LogFormat, TelemetryConfig};
//!
//! docqa_telemetry::init(&TelemetryConfig { format: LogFormat::Json, ..Default::default() })?;
//! ```

pub mod capture;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt};

pub use capture::{CapturedEvent, EventCapture};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, human friendly.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected pretty, compact or json)")),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_filter: String,
    /// Write to stderr instead of stdout.
    pub stderr: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { format: LogFormat::Compact, default_filter: "info".to_string(), stderr: true }
    }
}

impl TelemetryConfig {
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already set.
pub fn init(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(config.env_filter());
    let stderr = config.stderr;
    let writer = move || -> Box<dyn std::io::Write> {
        if stderr { Box::new(std::io::stderr()) } else { Box::new(std::io::stdout()) }
    };

    match config.format {
        LogFormat::Pretty => {
            registry.with(tracing_fmt::layer().pretty().with_writer(writer)).try_init()
        }
        LogFormat::Compact => {
            registry.with(tracing_fmt::layer().compact().with_writer(writer)).try_init()
        }
        LogFormat::Json => registry
            .with(tracing_fmt::layer().json().flatten_event(true).with_writer(writer))
            .try_init(),
    }
}
