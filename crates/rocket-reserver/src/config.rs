//! Client configuration.
//!
//! Settings come from an optional TOML file; command-line flags and
//! environment variables override individual fields through
//! [`ConfigOverrides`].
//!
//! ```toml
//! endpoint = "https://apollo-fullstack-tutorial.herokuapp.com/graphql"
//! ws_protocol = "graphql-transport-ws"
//! timeout_secs = 10
//!
//! [retry]
//! max_attempts = 5
//!
//! [log]
//! level = "rocket_graphql=debug"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rocket_credentials::CredentialStore;
use rocket_graphql::{GraphqlClient, RetryPolicy, WsProtocol};
use rocket_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::error::ReserverError;
use crate::trace::BodyTraceInterceptor;

/// Public tutorial server.
pub const DEFAULT_ENDPOINT: &str = "https://apollo-fullstack-tutorial.herokuapp.com/graphql";

const SERVICE_NAME: &str = "rocket-reserver";
const CONFIG_DIR: &str = "rocket-reserver";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIAL_FILE: &str = "credentials.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A URL field does not parse or has the wrong scheme.
    #[error("invalid {field} {value:?}: {message}")]
    InvalidUrl {
        /// Field name.
        field: &'static str,
        /// Value as configured.
        value: String,
        /// What is wrong.
        message: String,
    },

    /// A numeric field is out of range.
    #[error("invalid {field}: {message}")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// What is wrong.
        message: String,
    },
}

/// Retry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Attempts including the first one.
    pub max_attempts: usize,
    /// Backoff base delay.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            base_delay_ms: duration_ms(policy.base_delay),
            max_delay_ms: duration_ms(policy.max_delay),
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
    /// Log redacted request and response bodies.
    pub trace_bodies: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            trace_bodies: false,
        }
    }
}

/// Effective client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReserverConfig {
    /// GraphQL HTTP endpoint.
    pub endpoint: String,
    /// WebSocket URL; derived from `endpoint` when unset.
    pub subscription_url: Option<String>,
    /// Subscription wire protocol.
    pub ws_protocol: WsProtocol,
    /// Credential file; a per-user default when unset.
    pub credential_file: Option<PathBuf>,
    /// HTTP request timeout.
    pub timeout_secs: u64,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Log settings.
    pub log: LogSettings,
}

impl Default for ReserverConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subscription_url: None,
            ws_protocol: WsProtocol::default(),
            credential_file: None,
            timeout_secs: 30,
            retry: RetrySettings::default(),
            log: LogSettings::default(),
        }
    }
}

/// Per-field overrides, usually from CLI flags and environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Replaces `endpoint`.
    pub endpoint: Option<String>,
    /// Replaces `subscription_url`.
    pub subscription_url: Option<String>,
    /// Replaces `ws_protocol`.
    pub ws_protocol: Option<WsProtocol>,
    /// Replaces `credential_file`.
    pub credential_file: Option<PathBuf>,
    /// Replaces `timeout_secs`.
    pub timeout_secs: Option<u64>,
    /// Replaces `log.level`.
    pub log_level: Option<String>,
    /// Sets `log.json` when true.
    pub json_logs: bool,
    /// Sets `log.trace_bodies` when true.
    pub trace_bodies: bool,
}

/// `$XDG_CONFIG_HOME/rocket-reserver`, falling back to
/// `$HOME/.config/rocket-reserver`.
fn config_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .map(|dir| dir.join(CONFIG_DIR))
}

/// Per-user config file location.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Per-user credential file location.
pub fn default_credential_path() -> PathBuf {
    config_dir().map_or_else(
        || PathBuf::from(format!(".{CONFIG_DIR}-{CREDENTIAL_FILE}")),
        |dir| dir.join(CREDENTIAL_FILE),
    )
}

impl ReserverConfig {
    /// Parse and validate TOML.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Load `explicit` if given, else the per-user file if it exists, else
    /// the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Apply overrides and validate the result.
    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(endpoint) = overrides.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(url) = overrides.subscription_url {
            self.subscription_url = Some(url);
        }
        if let Some(protocol) = overrides.ws_protocol {
            self.ws_protocol = protocol;
        }
        if let Some(path) = overrides.credential_file {
            self.credential_file = Some(path);
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(level) = overrides.log_level {
            self.log.level = level;
        }
        self.log.json |= overrides.json_logs;
        self.log.trace_bodies |= overrides.trace_bodies;
        self.validate()?;
        Ok(self)
    }

    /// Check URLs and ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("endpoint", &self.endpoint, &["http", "https"])?;
        if let Some(url) = &self.subscription_url {
            check_url("subscription_url", url, &["ws", "wss"])?;
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::OutOfRange {
                field: "retry.max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::OutOfRange {
                field: "retry.base_delay_ms",
                message: "must not exceed retry.max_delay_ms".to_string(),
            });
        }
        Ok(())
    }

    /// Credential file to use.
    pub fn credential_path(&self) -> PathBuf {
        self.credential_file
            .clone()
            .unwrap_or_else(default_credential_path)
    }

    /// Retry policy for the client.
    pub fn retry_policy(&self) -> RetryPolicy {
        if self.retry.max_attempts <= 1 {
            return RetryPolicy::never();
        }
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            ..RetryPolicy::default()
        }
    }

    /// Telemetry settings.
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig::new(SERVICE_NAME)
            .with_log_level(self.log.level.clone())
            .with_json_logs(self.log.json)
    }

    /// Build a client authenticating from `store`.
    pub fn build_client(
        &self,
        store: Arc<dyn CredentialStore>,
    ) -> Result<GraphqlClient, ReserverError> {
        let mut builder = GraphqlClient::builder(self.endpoint.clone())
            .with_service_name(SERVICE_NAME)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry_policy(self.retry_policy())
            .with_ws_protocol(self.ws_protocol)
            .with_credential_store(store);
        if let Some(url) = &self.subscription_url {
            builder = builder.with_subscription_url(url.clone());
        }
        if self.log.trace_bodies {
            builder = builder.with_interceptor(Arc::new(BodyTraceInterceptor));
        }
        Ok(builder.build()?)
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        message,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid(format!(
            "scheme must be one of {}",
            schemes.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_tutorial_server() {
        let config = ReserverConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.ws_protocol, WsProtocol::GraphqlWs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_files() {
        let config = ReserverConfig::from_toml_str(
            r#"
            endpoint = "http://localhost:4000/graphql"
            ws_protocol = "graphql-transport-ws"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint, "http://localhost:4000/graphql");
        assert_eq!(config.ws_protocol, WsProtocol::GraphqlTransportWs);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = ReserverConfig::from_toml_str("endpoit = \"https://x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_wrong_schemes() {
        let err = ReserverConfig::from_toml_str("endpoint = \"ftp://example.com\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { field: "endpoint", .. }));
        let err =
            ReserverConfig::from_toml_str("subscription_url = \"https://example.com/graphql\"")
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidUrl {
                field: "subscription_url",
                ..
            }
        ));
    }

    #[test]
    fn rejects_zero_timeout_and_attempts() {
        assert!(ReserverConfig::from_toml_str("timeout_secs = 0").is_err());
        assert!(ReserverConfig::from_toml_str("[retry]\nmax_attempts = 0").is_err());
    }

    #[test]
    fn overrides_replace_fields() {
        let config = ReserverConfig::default()
            .with_overrides(ConfigOverrides {
                endpoint: Some("http://127.0.0.1:4000/graphql".to_string()),
                ws_protocol: Some(WsProtocol::GraphqlTransportWs),
                credential_file: Some(PathBuf::from("/tmp/creds.json")),
                json_logs: true,
                ..ConfigOverrides::default()
            })
            .unwrap();
        assert_eq!(config.endpoint, "http://127.0.0.1:4000/graphql");
        assert_eq!(config.ws_protocol, WsProtocol::GraphqlTransportWs);
        assert_eq!(config.credential_path(), PathBuf::from("/tmp/creds.json"));
        assert!(config.log.json);
        assert!(!config.log.trace_bodies);
    }

    #[test]
    fn single_attempt_disables_retry() {
        let mut config = ReserverConfig::default();
        config.retry.max_attempts = 1;
        assert_eq!(config.retry_policy().max_attempts, 1);
        config.retry.max_attempts = 4;
        assert_eq!(config.retry_policy().max_attempts, 4);
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = ReserverConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ReserverConfig::from_toml_str(&text).unwrap(), config);
    }
}
