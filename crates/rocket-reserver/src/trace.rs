//! Request/response body tracing.

use std::time::Instant;

use async_trait::async_trait;
use rocket_graphql::{GraphqlClientError, Interceptor, Next, OperationRequest, RawResponse};

/// Logs request variables and response bodies at debug level, with tokens
/// and authorization values redacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct BodyTraceInterceptor;

#[async_trait]
impl Interceptor for BodyTraceInterceptor {
    async fn intercept(
        &self,
        request: OperationRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, GraphqlClientError> {
        let operation = request.operation_name.clone();
        let variables = request.variables.clone();
        let start = Instant::now();

        let result = next.run(request).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (response, success): (serde_json::Value, bool) = match &result {
            Ok(raw) => (
                serde_json::from_slice(&raw.body).unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(&raw.body).into_owned())
                }),
                true,
            ),
            Err(err) => (serde_json::json!({ "error": err.to_string() }), false),
        };
        rocket_telemetry::log_exchange(&operation, &variables, &response, duration_ms, success);
        result
    }
}
