//! Mock GraphQL HTTP endpoint.
//!
//! Wraps wiremock; every mock matches `POST /graphql` plus the
//! `operationName` field of the JSON body.

use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRAPHQL_PATH: &str = "/graphql";

/// A mock GraphQL server for testing clients.
pub struct MockGraphqlServer {
    server: MockServer,
}

/// A request received by the mock server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// `operationName` from the body, if present.
    pub operation_name: Option<String>,
    /// Full JSON body.
    pub body: serde_json::Value,
    /// Request headers, names lowercased.
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    /// First value of header `name`.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The `variables` member of the body.
    #[must_use]
    pub fn variables(&self) -> &serde_json::Value {
        &self.body["variables"]
    }
}

impl MockGraphqlServer {
    /// Start a new mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// GraphQL endpoint URL.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}{GRAPHQL_PATH}", self.server.uri())
    }

    /// Underlying wiremock server for advanced configuration.
    #[must_use]
    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    fn operation(operation: &str) -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(path(GRAPHQL_PATH))
            .and(body_partial_json(
                serde_json::json!({ "operationName": operation }),
            ))
    }

    /// Answer `operation` with a JSON body (usually `{"data": ...}`).
    pub async fn respond(&self, operation: &str, body: serde_json::Value) {
        Self::operation(operation)
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `operation` only when its variables contain `variables`.
    pub async fn respond_to_variables(
        &self,
        operation: &str,
        variables: serde_json::Value,
        body: serde_json::Value,
    ) {
        Self::operation(operation)
            .and(body_partial_json(serde_json::json!({ "variables": variables })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer the next `times` calls of `operation` with `body`; later calls
    /// fall through to mocks mounted afterwards.
    pub async fn respond_times(&self, operation: &str, body: serde_json::Value, times: u64) {
        Self::operation(operation)
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Answer `operation` only when `header_name` equals `header_value`.
    pub async fn respond_with_header(
        &self,
        operation: &str,
        header_name: &str,
        header_value: &str,
        body: serde_json::Value,
    ) {
        Self::operation(operation)
            .and(header(header_name, header_value))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answer `operation` with an HTTP error status.
    pub async fn respond_status(&self, operation: &str, status: u16, body: &str) {
        Self::operation(operation)
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answer the next `times` calls of `operation` with `status`; later
    /// calls fall through to mocks mounted afterwards.
    pub async fn respond_status_times(&self, operation: &str, status: u16, times: u64) {
        Self::operation(operation)
            .respond_with(ResponseTemplate::new(status).set_body_string("unavailable"))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Answer `operation` after `delay`.
    pub async fn respond_delayed(
        &self,
        operation: &str,
        delay: std::time::Duration,
        body: serde_json::Value,
    ) {
        Self::operation(operation)
            .respond_with(ResponseTemplate::new(200).set_delay(delay).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Every request received so far.
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| {
                let body: serde_json::Value =
                    serde_json::from_slice(&request.body).unwrap_or(serde_json::Value::Null);
                let operation_name = body["operationName"].as_str().map(ToString::to_string);
                let headers = request
                    .headers
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.as_str().to_ascii_lowercase(),
                            value.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                RecordedRequest {
                    operation_name,
                    body,
                    headers,
                }
            })
            .collect()
    }

    /// Requests received for `operation`.
    pub async fn requests_for(&self, operation: &str) -> Vec<RecordedRequest> {
        self.requests()
            .await
            .into_iter()
            .filter(|request| request.operation_name.as_deref() == Some(operation))
            .collect()
    }

    /// Verify how many times `operation` was received.
    ///
    /// # Panics
    ///
    /// Panics if the count doesn't match.
    pub async fn assert_operation_count(&self, operation: &str, expected: usize) {
        let received = self.requests_for(operation).await.len();
        assert_eq!(
            received, expected,
            "Expected {expected} {operation} requests, got {received}"
        );
    }

    /// Verify that no request at all reached the server.
    ///
    /// # Panics
    ///
    /// Panics if any request was received.
    pub async fn assert_no_requests(&self) {
        let received = self.requests().await;
        assert!(
            received.is_empty(),
            "Expected no requests, got {:?}",
            received
                .iter()
                .map(|request| request.operation_name.clone())
                .collect::<Vec<_>>()
        );
    }
}
