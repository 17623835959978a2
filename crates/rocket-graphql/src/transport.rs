//! Terminal network transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};

use crate::error::GraphqlClientError;
use crate::interceptor::{OperationRequest, RawResponse};

/// Sends a fully-built request over the network.
///
/// Implementations return `Ok` only for 2xx responses.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the raw response.
    async fn send(&self, request: OperationRequest) -> Result<RawResponse, GraphqlClientError>;
}

/// GraphQL over HTTP(S) `POST`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport that posts to `endpoint` with the given client.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    /// Build a reqwest client with default headers and timeout.
    pub fn with_defaults(
        endpoint: impl Into<String>,
        headers: HeaderMap,
        timeout: Duration,
    ) -> Result<Self, GraphqlClientError> {
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self::new(endpoint, http))
    }

    /// Endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: OperationRequest) -> Result<RawResponse, GraphqlClientError> {
        let response = self
            .http
            .post(&self.endpoint)
            .headers(request.headers.clone())
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let retry_after = parse_retry_after(&headers);
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(GraphqlClientError::HttpStatus {
                status,
                body: truncate_body(&body),
                retry_after,
            });
        }

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = headers.get(RETRY_AFTER)?;
    let value = header.to_str().ok()?;
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    None
}

fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}
