//! Request interceptor chain.
//!
//! Every fetch and mutate runs through an ordered list of [`Interceptor`]s
//! that ends in a [`Transport`]. Each interceptor may rewrite the request,
//! hand it on with [`Next::run`], or fail without calling `next`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use rocket_credentials::CredentialStore;
use tracing::{debug, info, warn};

use crate::error::{AuthFailure, GraphqlClientError};
use crate::operation::{GraphqlQuery, GraphqlRequest, OperationKind};
use crate::transport::Transport;

/// An outgoing operation in its pre-wire form.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Operation name.
    pub operation_name: String,
    /// Operation type.
    pub kind: OperationKind,
    /// Query text.
    pub query: GraphqlQuery,
    /// Serialized variables.
    pub variables: serde_json::Value,
    /// Per-request headers, merged over the client defaults.
    pub headers: HeaderMap,
    /// Whether the request must be authenticated.
    pub requires_auth: bool,
    /// Whether the request may be retried.
    pub idempotent: bool,
}

impl OperationRequest {
    /// JSON body as sent to the server.
    #[must_use]
    pub fn body(&self) -> GraphqlRequest<&serde_json::Value> {
        GraphqlRequest::new(self.query.clone(), &self.variables)
            .with_operation_name(self.operation_name.clone())
    }

    /// Header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// A successful (2xx) transport response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body.
    pub body: Bytes,
}

impl RawResponse {
    /// A `200 OK` response with the given body.
    #[must_use]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// A middleware step in the request chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Process `request`, usually by calling `next.run(request)`.
    async fn intercept(
        &self,
        request: OperationRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, GraphqlClientError>;
}

/// The remainder of the chain after the current interceptor.
///
/// `Next` is `Copy`; running it again re-runs everything downstream.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    /// Run the rest of the chain.
    pub async fn run(self, request: OperationRequest) -> Result<RawResponse, GraphqlClientError> {
        match self.interceptors.split_first() {
            Some((head, rest)) => {
                let next = Next {
                    interceptors: rest,
                    transport: self.transport,
                };
                head.intercept(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// Ordered interceptors plus the terminal transport.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl InterceptorChain {
    /// Create a chain ending in `transport`.
    #[must_use]
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, transport: Arc<dyn Transport>) -> Self {
        Self {
            interceptors,
            transport,
        }
    }

    /// Number of interceptors in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if requests go straight to the transport.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Run `request` through every interceptor and the transport.
    pub async fn execute(
        &self,
        request: OperationRequest,
    ) -> Result<RawResponse, GraphqlClientError> {
        let next = Next {
            interceptors: &self.interceptors,
            transport: self.transport.as_ref(),
        };
        next.run(request).await
    }
}

/// Attaches the stored bearer token as `Authorization`.
///
/// Without a usable credential, public operations pass through unchanged
/// and protected ones fail with `AuthenticationRequired` before any send.
pub struct AuthInterceptor {
    store: Arc<dyn CredentialStore>,
}

impl AuthInterceptor {
    /// Create an interceptor reading from `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Interceptor for AuthInterceptor {
    async fn intercept(
        &self,
        mut request: OperationRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, GraphqlClientError> {
        let failure = match self.store.get()? {
            Some(credential) if !credential.is_expired() => {
                let mut value = HeaderValue::from_str(&credential.bearer_header()).map_err(|_| {
                    GraphqlClientError::CredentialStore(
                        "stored token is not a valid header value".to_string(),
                    )
                })?;
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
                None
            }
            Some(_) => Some(AuthFailure::CredentialExpired),
            None => Some(AuthFailure::MissingCredential),
        };

        if let Some(reason) = failure {
            if request.requires_auth {
                debug!(
                    operation = %request.operation_name,
                    %reason,
                    "short-circuiting protected operation"
                );
                return Err(GraphqlClientError::AuthenticationRequired {
                    operation: request.operation_name,
                    reason,
                });
            }
            if reason == AuthFailure::CredentialExpired {
                warn!(
                    operation = %request.operation_name,
                    "stored credential expired; sending unauthenticated"
                );
            }
        }

        next.run(request).await
    }
}

/// Logs one event per operation with its outcome and duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn intercept(
        &self,
        request: OperationRequest,
        next: Next<'_>,
    ) -> Result<RawResponse, GraphqlClientError> {
        let operation = request.operation_name.clone();
        let kind = request.kind;
        let authenticated = request.headers.contains_key(AUTHORIZATION);
        let start = Instant::now();

        let result = next.run(request).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(response) => info!(
                operation = %operation,
                kind = %kind,
                authenticated,
                status = response.status.as_u16(),
                duration_ms,
                "GraphQL request completed"
            ),
            Err(err) => warn!(
                operation = %operation,
                kind = %kind,
                authenticated,
                duration_ms,
                error = %err,
                "GraphQL request failed"
            ),
        }
        result
    }
}
