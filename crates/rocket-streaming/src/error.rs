use std::time::Duration;

/// Failures of the WebSocket transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StreamError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer went away; `code` is set when a close frame was received.
    #[error("Connection closed: {reason}")]
    ConnectionClosed { reason: String, code: Option<u16> },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// A configured handshake header has an unencodable name or value.
    #[error("Invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(String),
}

impl StreamError {
    pub(crate) fn invalid_header(name: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidHeader {
            name: name.to_owned(),
            message: err.to_string(),
        }
    }

    /// Whether opening a fresh connection could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_)
                | Self::ConnectionClosed { .. }
                | Self::Timeout(_)
                | Self::WebSocketError(_)
        )
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        assert!(StreamError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(
            StreamError::ConnectionClosed {
                reason: "gone".into(),
                code: Some(1006),
            }
            .is_transient()
        );
        assert!(!StreamError::ParseError("bad".into()).is_transient());
        assert!(!StreamError::invalid_header("x y", "invalid").is_transient());
    }
}
