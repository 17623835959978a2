//! Log output setup and payload redaction.

use serde_json::Value;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

use crate::{TelemetryConfig, TelemetryError};

/// Fields redacted when no configuration says otherwise.
pub const DEFAULT_REDACT_FIELDS: &[&str] = &["token", "authorization", "password", "secret"];

const REDACTED: &str = "[REDACTED]";

/// Install the global subscriber. Output goes to stderr so stdout stays
/// free for command results.
pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            TelemetryError::InvalidFilter {
                filter: config.log_level.clone(),
                message: e.to_string(),
            }
        })?,
    };

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.json_logs {
        let json_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE);

        subscriber
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
    } else {
        let pretty_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
            .with_target(true)
            .compact();

        subscriber
            .with(pretty_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
    }
}

/// Whether `key` names a sensitive field. Matching is a case-insensitive
/// substring test, so `accessToken` matches `token`.
#[must_use]
pub fn is_sensitive_field(key: &str, fields: &[String]) -> bool {
    let key = key.to_lowercase();
    fields
        .iter()
        .any(|field| key.contains(&field.to_lowercase()))
}

/// Redact sensitive fields from a JSON value.
#[must_use]
pub fn redact_sensitive(value: &Value, fields: &[String]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, val)| {
                    let val = if is_sensitive_field(key, fields) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_sensitive(val, fields)
                    };
                    (key.clone(), val)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_sensitive(item, fields))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Log one GraphQL exchange with both payloads redacted.
pub fn log_exchange(
    operation: &str,
    request: &Value,
    response: &Value,
    duration_ms: u64,
    success: bool,
) {
    let fields = crate::redact_fields();
    let request = redact_sensitive(request, &fields);
    let response = redact_sensitive(response, &fields);

    if success {
        tracing::debug!(
            operation,
            request = %request,
            response = %response,
            duration_ms,
            "exchange completed"
        );
    } else {
        tracing::warn!(
            operation,
            request = %request,
            response = %response,
            duration_ms,
            "exchange failed"
        );
    }
}
