//! Failures surfaced by [`crate::GraphqlClient`].
//!
//! Every variant maps onto exactly one [`ErrorKind`], which is what callers
//! branch on: transport problems, server-reported GraphQL errors, or a
//! missing login.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The parts of a `reqwest::Error` worth keeping once the error is cloned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpErrorInfo {
    pub message: String,
    pub status_code: Option<u16>,
    pub is_timeout: bool,
    pub is_connect: bool,
    /// Set when reqwest failed while building or sending the request.
    pub is_request: bool,
}

impl HttpErrorInfo {
    const fn worth_retrying(&self) -> bool {
        self.is_timeout || self.is_connect || self.is_request
    }
}

impl From<reqwest::Error> for HttpErrorInfo {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status_code: err.status().map(|code| code.as_u16()),
            is_timeout: err.is_timeout(),
            is_connect: err.is_connect(),
            is_request: err.is_request(),
            message: err.to_string(),
        }
    }
}

/// 1-based position inside the query document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphqlErrorLocation {
    pub line: u32,
    pub column: u32,
}

/// One step of an error `path`: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphqlPathSegment {
    Key(String),
    Index(i64),
}

/// An entry of the response `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default)]
    pub locations: Vec<GraphqlErrorLocation>,
    #[serde(default)]
    pub path: Vec<GraphqlPathSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
}

impl GraphqlError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: Vec::new(),
            extensions: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingCredential,
    CredentialExpired,
    /// HTTP 401 from the server.
    Rejected,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::MissingCredential => "no credential available",
            Self::CredentialExpired => "credential expired",
            Self::Rejected => "server rejected credential",
        };
        f.write_str(text)
    }
}

/// What the caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No usable GraphQL response arrived, including a credential store
    /// that could not be read.
    Transport,
    /// The server answered, but only with `errors`.
    Server,
    /// Log in, then try again.
    AuthenticationRequired,
}

#[derive(Debug, Clone, Error)]
pub enum GraphqlClientError {
    #[error("HTTP error: {}", .0.message)]
    Http(HttpErrorInfo),

    /// Non-2xx answer. `body` is truncated by the transport.
    #[error("HTTP status {status} with body: {body}")]
    HttpStatus {
        status: StatusCode,
        body: String,
        retry_after: Option<Duration>,
    },

    #[error("JSON error: {0}")]
    Json(String),

    /// Only produced when the server sent errors and no data at all.
    #[error("GraphQL errors: {}", join_messages(.errors))]
    GraphqlErrors { errors: Vec<GraphqlError> },

    /// A well-formed HTTP answer that is not a GraphQL response, or an
    /// operation used through the wrong entry point.
    #[error("GraphQL protocol error: {message}")]
    Protocol { message: String },

    /// Raised before anything is sent for operations that need a login.
    #[error("authentication required for {operation}: {reason}")]
    AuthenticationRequired {
        operation: String,
        reason: AuthFailure,
    },

    #[error("credential store error: {0}")]
    CredentialStore(String),

    /// The WebSocket connection failed or was lost.
    #[error("subscription error: {message}")]
    Subscription { message: String },
}

fn join_messages(errors: &[GraphqlError]) -> String {
    let mut joined = String::new();
    for (index, err) in errors.iter().enumerate() {
        if index > 0 {
            joined.push_str("; ");
        }
        joined.push_str(&err.message);
    }
    joined
}

impl From<reqwest::Error> for GraphqlClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.into())
    }
}

impl From<serde_json::Error> for GraphqlClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rocket_credentials::CredentialError> for GraphqlClientError {
    fn from(err: rocket_credentials::CredentialError) -> Self {
        Self::CredentialStore(err.to_string())
    }
}

impl From<rocket_streaming::StreamError> for GraphqlClientError {
    fn from(err: rocket_streaming::StreamError) -> Self {
        let message = err.to_string();
        Self::Subscription { message }
    }
}

impl GraphqlClientError {
    /// Timeouts, connect failures, 5xx and 429 may succeed on a second try.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(info) => info.worth_retrying(),
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::GraphqlErrors { .. } => ErrorKind::Server,
            Self::AuthenticationRequired { .. } => ErrorKind::AuthenticationRequired,
            Self::HttpStatus { status, .. } if status.as_u16() == 401 => {
                ErrorKind::AuthenticationRequired
            }
            _ => ErrorKind::Transport,
        }
    }

    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self.kind(), ErrorKind::AuthenticationRequired)
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: StatusCode) -> GraphqlClientError {
        GraphqlClientError::HttpStatus {
            status: code,
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn each_error_has_one_kind() {
        let server = GraphqlClientError::GraphqlErrors {
            errors: vec![GraphqlError::new("boom")],
        };
        assert_eq!(server.kind(), ErrorKind::Server);
        assert!(!server.is_transport() && !server.requires_login());

        let gateway = status(StatusCode::BAD_GATEWAY);
        assert_eq!(gateway.kind(), ErrorKind::Transport);
        assert!(gateway.is_retryable());

        let auth = GraphqlClientError::AuthenticationRequired {
            operation: "BookTrip".to_string(),
            reason: AuthFailure::MissingCredential,
        };
        assert!(auth.requires_login());
        assert!(!auth.is_retryable());
    }

    #[test]
    fn retry_covers_throttling_but_not_client_errors() {
        assert!(status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!status(StatusCode::BAD_REQUEST).is_retryable());
        assert!(status(StatusCode::UNAUTHORIZED).requires_login());
    }

    #[test]
    fn unreadable_credential_store_is_not_a_login_problem() {
        let err = GraphqlClientError::CredentialStore("credential file is corrupt".into());
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!err.requires_login());
        assert!(!err.is_retryable());
    }

    #[test]
    fn display_joins_graphql_messages() {
        let err = GraphqlClientError::GraphqlErrors {
            errors: vec![GraphqlError::new("first"), GraphqlError::new("second")],
        };
        assert_eq!(err.to_string(), "GraphQL errors: first; second");
    }

    #[test]
    fn path_segments_decode_untagged() {
        let err: GraphqlError = serde_json::from_value(serde_json::json!({
            "message": "no launch",
            "path": ["launch", 0, "site"],
            "locations": [{ "line": 2, "column": 3 }]
        }))
        .unwrap();
        assert_eq!(
            err.path,
            vec![
                GraphqlPathSegment::Key("launch".into()),
                GraphqlPathSegment::Index(0),
                GraphqlPathSegment::Key("site".into()),
            ]
        );
        assert_eq!(err.locations[0], GraphqlErrorLocation { line: 2, column: 3 });
        assert!(err.extensions.is_none());
    }
}
