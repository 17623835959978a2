//! Typed operations and the request/response envelopes around them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::GraphqlError;

/// Query document text. Serializes as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphqlQuery {
    query: String,
}

impl GraphqlQuery {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }

    #[must_use]
    pub fn from_static(query: &'static str) -> Self {
        Self::new(query)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Eligible for the response cache.
    Query,
    /// Never cached, never retried unless marked idempotent.
    Mutation,
    /// Delivered over the WebSocket transport only.
    Subscription,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A GraphQL document bound to its variable and result types.
///
/// `OPERATION_NAME` is sent as `operationName`, tags log lines, and is part
/// of the cache key together with the serialized variables.
pub trait GraphqlOperation {
    type Variables: Serialize + Send + Sync;
    type ResponseData: DeserializeOwned + Send + Sync + 'static;

    const QUERY: &'static str;
    const OPERATION_NAME: &'static str;
    const KIND: OperationKind = OperationKind::Query;

    /// Protected operations fail with `AuthenticationRequired` before any
    /// request is made when no valid credential is stored.
    fn requires_auth() -> bool {
        false
    }

    /// Gate for the retry interceptor. Mutations default to `false`.
    fn is_idempotent() -> bool {
        Self::KIND != OperationKind::Mutation
    }
}

/// The JSON body POSTed to the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest<V> {
    pub query: GraphqlQuery,
    pub variables: V,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

impl<V> GraphqlRequest<V> {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(query: GraphqlQuery, variables: V) -> Self {
        Self {
            query,
            variables,
            operation_name: None,
        }
    }

    #[must_use]
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseSource {
    #[default]
    Network,
    Cache,
}

/// A decoded GraphQL answer.
///
/// `errors` may be non-empty alongside `data`; that is still `Ok` at the
/// [`OperationResult`] level. Only failures that prevent any answer are
/// reported as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct GraphqlResponse<T> {
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Value>,
    #[serde(skip)]
    pub source: ResponseSource,
}

impl<T> GraphqlResponse<T> {
    /// `true` when the server reported no errors.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        matches!(self.source, ResponseSource::Cache)
    }

    /// One line per server error, or `None` if there were none.
    #[must_use]
    pub fn error_messages(&self) -> Option<String> {
        let mut lines = self.errors.iter().map(|err| err.message.as_str());
        let first = lines.next()?;
        Some(lines.fold(first.to_owned(), |mut joined, line| {
            joined.push('\n');
            joined.push_str(line);
            joined
        }))
    }
}

impl GraphqlResponse<serde_json::Value> {
    /// Convert `data` to `T`, treating JSON `null` as absent.
    pub fn into_typed<T: DeserializeOwned>(
        self,
    ) -> Result<GraphqlResponse<T>, crate::GraphqlClientError> {
        let data = match self.data {
            Some(value) if !value.is_null() => Some(serde_json::from_value(value)?),
            _ => None,
        };
        Ok(GraphqlResponse {
            data,
            errors: self.errors,
            extensions: self.extensions,
            source: self.source,
        })
    }
}

/// `Ok` holds data and/or server errors, `Err` holds the single failure that
/// prevented a response.
pub type OperationResult<T> = Result<GraphqlResponse<T>, crate::GraphqlClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Launch {
        id: String,
    }

    fn untyped(body: serde_json::Value) -> GraphqlResponse<serde_json::Value> {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn request_body_uses_camel_case_and_omits_missing_name() {
        let anonymous = GraphqlRequest::new(GraphqlQuery::new("{ me }"), serde_json::json!({}));
        let body = serde_json::to_value(&anonymous).unwrap();
        assert_eq!(body, serde_json::json!({ "query": "{ me }", "variables": {} }));

        let named = anonymous.with_operation_name("Me");
        assert_eq!(serde_json::to_value(&named).unwrap()["operationName"], "Me");
    }

    #[test]
    fn null_data_becomes_none() {
        let typed = untyped(serde_json::json!({ "data": null }))
            .into_typed::<Launch>()
            .unwrap();
        assert!(typed.data.is_none());
        assert!(typed.is_ok());
    }

    #[test]
    fn partial_data_keeps_errors() {
        let typed = untyped(serde_json::json!({
            "data": { "id": "109" },
            "errors": [{ "message": "site unavailable" }, { "message": "rocket unknown" }]
        }))
        .into_typed::<Launch>()
        .unwrap();

        assert_eq!(typed.data, Some(Launch { id: "109".into() }));
        assert!(!typed.is_ok());
        assert_eq!(
            typed.error_messages().as_deref(),
            Some("site unavailable\nrocket unknown")
        );
        assert!(!typed.is_cached());
    }

    #[test]
    fn mismatched_data_is_a_json_error() {
        let err = untyped(serde_json::json!({ "data": { "id": 7 } }))
            .into_typed::<Launch>()
            .unwrap_err();
        assert!(matches!(err, crate::GraphqlClientError::Json(_)));
    }
}
