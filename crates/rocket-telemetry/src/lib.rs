//! Rocket Telemetry - Logging for Rocket Reserver.
//!
//! - **Structured Logging**: pretty or JSON `tracing` output on stderr,
//!   filtered by `RUST_LOG` or the configured level
//! - **Redaction**: tokens and authorization headers never reach log output
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rocket_telemetry::{TelemetryConfig, init_telemetry};
//!
//! init_telemetry(TelemetryConfig::new("rocket-reserver").with_log_level("debug"))?;
//! tracing::info!(endpoint = %url, "starting");
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod logging;

pub use logging::*;

use std::sync::OnceLock;

/// Global telemetry state.
static TELEMETRY: OnceLock<TelemetryConfig> = OnceLock::new();

/// Configuration for telemetry initialization.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event.
    pub service_name: String,

    /// Log level filter (e.g., "info", "debug", "rocket_graphql=trace").
    pub log_level: String,

    /// Enable JSON log output.
    pub json_logs: bool,

    /// Fields to redact from logged payloads.
    pub redact_fields: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "rocket-reserver".to_string(),
            log_level: "warn".to_string(),
            json_logs: false,
            redact_fields: DEFAULT_REDACT_FIELDS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the log level.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON logs.
    #[must_use]
    pub const fn with_json_logs(mut self, enabled: bool) -> Self {
        self.json_logs = enabled;
        self
    }

    /// Add fields to redact from logs.
    #[must_use]
    pub fn with_redact_fields(mut self, fields: Vec<String>) -> Self {
        self.redact_fields.extend(fields);
        self
    }
}

/// Telemetry errors.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter could not be parsed.
    #[error("invalid log filter {filter:?}: {message}")]
    InvalidFilter {
        /// Filter text.
        filter: String,
        /// Parser message.
        message: String,
    },

    /// A global subscriber is already installed.
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
}

/// Initialize the telemetry system.
///
/// Call once at startup. Later calls return `Ok` without reinstalling.
///
/// # Errors
///
/// Returns an error if the filter is invalid or another subscriber owns the
/// global dispatcher.
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    if TELEMETRY.get().is_some() {
        return Ok(());
    }
    init_logging(&config)?;
    tracing::debug!(
        service = %config.service_name,
        json = config.json_logs,
        "telemetry initialized"
    );
    let _ = TELEMETRY.set(config);
    Ok(())
}

/// Fields redacted by the active configuration, or the defaults before
/// initialization.
#[must_use]
pub fn redact_fields() -> Vec<String> {
    TELEMETRY.get().map_or_else(
        || TelemetryConfig::default().redact_fields,
        |config| config.redact_fields.clone(),
    )
}
