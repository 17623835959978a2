use rocket_graphql::{GraphqlClientError, GraphqlError};
use serde::Serialize;

/// A titled message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Alert {
    /// Create an alert.
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    /// Alert listing server-reported errors, or `None` when there are none.
    pub fn for_graphql_errors(errors: &[GraphqlError]) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let message = errors
            .iter()
            .map(|err| err.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Some(Self::new("GraphQL Error(s)", message))
    }

    /// Alert for a failed request. Errors the server sent in place of a
    /// result are listed like [`Self::for_graphql_errors`].
    pub fn for_error(err: &GraphqlClientError) -> Self {
        match err {
            GraphqlClientError::GraphqlErrors { errors } => Self::for_graphql_errors(errors)
                .unwrap_or_else(|| Self::new("GraphQL Error(s)", err.to_string())),
            _ => Self::new("Network Error", err.to_string()),
        }
    }
}
