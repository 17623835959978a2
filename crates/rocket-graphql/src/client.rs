//! GraphQL client facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use rocket_credentials::CredentialStore;
use tracing::debug;

use crate::cache::{CacheKey, CachePolicy, ResponseCache};
use crate::error::GraphqlClientError;
use crate::interceptor::{
    AuthInterceptor, Interceptor, InterceptorChain, LoggingInterceptor, OperationRequest,
};
use crate::operation::{
    GraphqlOperation, GraphqlQuery, GraphqlResponse, OperationKind, OperationResult,
    ResponseSource,
};
use crate::retry::{RetryInterceptor, RetryPolicy};
use crate::subscription::{
    GraphqlSubscriptionClient, GraphqlSubscriptionConfig, GraphqlSubscriptionStream,
    SubscriptionHandle, WsProtocol,
};
use crate::transport::{HttpTransport, Transport};

/// Counters shared by a client and its clones.
#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct GraphqlClientMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_error: AtomicU64,
    pub(crate) requests_retried: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl GraphqlClientMetrics {
    /// Relaxed loads; the fields may be mutually inconsistent by one.
    #[must_use]
    pub fn snapshot(&self) -> GraphqlClientMetricsSnapshot {
        GraphqlClientMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_error: self.requests_error.load(Ordering::Relaxed),
            requests_retried: self.requests_retried.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GraphqlClientMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct GraphqlClientMetricsSnapshot {
    /// Operations handed to the request chain.
    pub requests_total: u64,
    /// Operations answered without errors.
    pub requests_success: u64,
    /// Operations that failed or carried GraphQL errors.
    pub requests_error: u64,
    /// Retries performed.
    pub requests_retried: u64,
    /// Fetches answered from cache.
    pub cache_hits: u64,
    /// Cache-eligible fetches that went to the network.
    pub cache_misses: u64,
}

/// Settings fixed at build time.
#[derive(Debug, Clone)]
pub struct GraphqlClientConfig {
    /// `service` field of every log line.
    pub service_name: String,
    /// Sent with every HTTP request; starts with `Content-Type: application/json`.
    pub headers: HeaderMap,
    /// Whole-request deadline for the HTTP transport.
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Subscription transport settings.
    pub subscription: GraphqlSubscriptionConfig,
}

impl Default for GraphqlClientConfig {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            service_name: "graphql".to_string(),
            headers,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            subscription: GraphqlSubscriptionConfig::default(),
        }
    }
}

/// Subscription URL for an HTTP endpoint: `http` becomes `ws`, `https`
/// becomes `wss`.
#[must_use]
pub fn derive_subscription_url(endpoint: &str) -> Option<String> {
    if let Some(rest) = endpoint.strip_prefix("https://") {
        Some(format!("wss://{rest}"))
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        Some(format!("ws://{rest}"))
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Some(endpoint.to_string())
    } else {
        None
    }
}

/// Assembles the interceptor chain, cache, and subscription client.
pub struct GraphqlClientBuilder {
    endpoint: String,
    config: GraphqlClientConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    transport: Option<Arc<dyn Transport>>,
    subscription_url: Option<String>,
}

impl std::fmt::Debug for GraphqlClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClientBuilder")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("authenticated", &self.credentials.is_some())
            .field("interceptors", &self.interceptors.len())
            .field("custom_transport", &self.transport.is_some())
            .field("subscription_url", &self.subscription_url)
            .finish()
    }
}

impl GraphqlClientBuilder {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: GraphqlClientConfig::default(),
            credentials: None,
            interceptors: Vec::new(),
            transport: None,
            subscription_url: None,
        }
    }

    #[must_use]
    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.config.service_name = service_name.into();
        self
    }

    /// Replaces any earlier value for `name`.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.config.headers.insert(name, value);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Authenticate requests and subscriptions from `store`.
    ///
    /// The auth interceptor is installed ahead of every other interceptor.
    #[must_use]
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Append an interceptor. Interceptors run in the order added.
    #[must_use]
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Replace the HTTP transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the WebSocket URL for subscriptions. Defaults to the endpoint
    /// with its scheme swapped for `ws`/`wss`.
    #[must_use]
    pub fn with_subscription_url(mut self, url: impl Into<String>) -> Self {
        self.subscription_url = Some(url.into());
        self
    }

    /// Select the subscription wire protocol.
    #[must_use]
    pub const fn with_ws_protocol(mut self, protocol: WsProtocol) -> Self {
        self.config.subscription.protocol = protocol;
        self
    }

    /// Replace the subscription configuration.
    #[must_use]
    pub fn with_subscription_config(mut self, config: GraphqlSubscriptionConfig) -> Self {
        self.config.subscription = config;
        self
    }

    /// Chain order: auth, caller interceptors, logging, retry, transport.
    pub fn build(self) -> Result<GraphqlClient, GraphqlClientError> {
        let metrics = Arc::new(GraphqlClientMetrics::default());
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_defaults(
                self.endpoint.clone(),
                self.config.headers.clone(),
                self.config.timeout,
            )?),
        };

        let mut interceptors: Vec<Arc<dyn Interceptor>> = Vec::new();
        if let Some(store) = &self.credentials {
            interceptors.push(Arc::new(AuthInterceptor::new(Arc::clone(store))));
        }
        interceptors.extend(self.interceptors);
        interceptors.push(Arc::new(LoggingInterceptor));
        interceptors.push(Arc::new(
            RetryInterceptor::new(self.config.retry.clone()).with_metrics(Arc::clone(&metrics)),
        ));

        let subscriptions = self
            .subscription_url
            .or_else(|| derive_subscription_url(&self.endpoint))
            .map(|url| {
                let client = GraphqlSubscriptionClient::new(url, self.config.service_name.clone())
                    .with_config(self.config.subscription.clone());
                let client = match &self.credentials {
                    Some(store) => client.with_credential_store(Arc::clone(store)),
                    None => client,
                };
                Arc::new(client)
            });

        Ok(GraphqlClient {
            endpoint: self.endpoint,
            config: self.config,
            chain: Arc::new(InterceptorChain::new(interceptors, transport)),
            cache: Arc::new(ResponseCache::new()),
            subscriptions,
            metrics,
        })
    }
}

/// GraphQL client.
///
/// Cloning is cheap; clones share the cache, metrics, and subscription
/// connection.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    config: GraphqlClientConfig,
    chain: Arc<InterceptorChain>,
    cache: Arc<ResponseCache>,
    subscriptions: Option<Arc<GraphqlSubscriptionClient>>,
    metrics: Arc<GraphqlClientMetrics>,
}

impl GraphqlClient {
    /// Start building a client for `endpoint`.
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> GraphqlClientBuilder {
        GraphqlClientBuilder::new(endpoint)
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &GraphqlClientConfig {
        &self.config
    }

    #[must_use]
    pub fn metrics(&self) -> GraphqlClientMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The response cache.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// The subscription client, when a WebSocket URL is known.
    #[must_use]
    pub fn subscriptions(&self) -> Option<&GraphqlSubscriptionClient> {
        self.subscriptions.as_deref()
    }

    /// Run a query, consulting the cache according to `policy`.
    ///
    /// Only responses with data and no errors are cached.
    pub async fn fetch<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
        policy: CachePolicy,
    ) -> OperationResult<O::ResponseData> {
        ensure_kind::<O>(OperationKind::Query)?;
        let variables = serde_json::to_value(&variables)?;
        let key = CacheKey::new(O::OPERATION_NAME, O::QUERY, &variables);

        if policy == CachePolicy::UseCacheElseFetch {
            if let Some(cached) = self.cache.get(&key) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(operation = O::OPERATION_NAME, "served from cache");
                return GraphqlResponse {
                    data: Some(cached.data),
                    errors: Vec::new(),
                    extensions: cached.extensions,
                    source: ResponseSource::Cache,
                }
                .into_typed();
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let response = self.execute::<O>(variables).await?;
        let cacheable = match (&response.data, response.errors.is_empty()) {
            (Some(data), true) => Some((data.clone(), response.extensions.clone())),
            _ => None,
        };
        let typed = response.into_typed()?;
        if let Some((data, extensions)) = cacheable {
            self.cache.insert(key, data, extensions);
        }
        Ok(typed)
    }

    /// Run a mutation. Never cached; cached queries are left untouched.
    pub async fn mutate<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> OperationResult<O::ResponseData> {
        ensure_kind::<O>(OperationKind::Mutation)?;
        let variables = serde_json::to_value(&variables)?;
        self.execute::<O>(variables).await?.into_typed()
    }

    /// Start a subscription that calls `on_event` for every push.
    ///
    /// The subscription runs until [`SubscriptionHandle::cancel`] is called
    /// or the server ends it.
    pub async fn subscribe<O, F>(
        &self,
        variables: O::Variables,
        on_event: F,
    ) -> Result<SubscriptionHandle, GraphqlClientError>
    where
        O: GraphqlOperation,
        F: FnMut(OperationResult<O::ResponseData>) + Send + 'static,
    {
        let stream = self.subscribe_stream::<O>(variables).await?;
        Ok(SubscriptionHandle::spawn(stream, on_event))
    }

    /// Start a subscription as a stream. Dropping the stream stops it.
    pub async fn subscribe_stream<O: GraphqlOperation>(
        &self,
        variables: O::Variables,
    ) -> Result<GraphqlSubscriptionStream<O::ResponseData>, GraphqlClientError> {
        ensure_kind::<O>(OperationKind::Subscription)?;
        let subscriptions =
            self.subscriptions
                .as_deref()
                .ok_or_else(|| GraphqlClientError::Protocol {
                    message: format!("no subscription URL configured for {}", self.endpoint),
                })?;
        subscriptions.subscribe::<O>(variables).await
    }

    /// Drop the cached response for one operation invocation.
    pub fn invalidate<O: GraphqlOperation>(
        &self,
        variables: &O::Variables,
    ) -> Result<bool, GraphqlClientError> {
        let variables = serde_json::to_value(variables)?;
        Ok(self
            .cache
            .invalidate(&CacheKey::new(O::OPERATION_NAME, O::QUERY, &variables)))
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn execute<O: GraphqlOperation>(
        &self,
        variables: serde_json::Value,
    ) -> Result<GraphqlResponse<serde_json::Value>, GraphqlClientError> {
        let request = OperationRequest {
            operation_name: O::OPERATION_NAME.to_string(),
            kind: O::KIND,
            query: GraphqlQuery::from_static(O::QUERY),
            variables,
            headers: HeaderMap::new(),
            requires_auth: O::requires_auth(),
            idempotent: O::is_idempotent(),
        };
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);

        let result = self
            .chain
            .execute(request)
            .await
            .and_then(|raw| decode_response(&raw.body));

        match &result {
            Ok(response) if response.errors.is_empty() => {
                self.metrics
                    .requests_success
                    .fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.metrics.requests_error.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

fn ensure_kind<O: GraphqlOperation>(expected: OperationKind) -> Result<(), GraphqlClientError> {
    if O::KIND == expected {
        return Ok(());
    }
    Err(GraphqlClientError::Protocol {
        message: format!(
            "{} is a {}; expected a {expected}",
            O::OPERATION_NAME,
            O::KIND
        ),
    })
}

fn decode_response(body: &[u8]) -> Result<GraphqlResponse<serde_json::Value>, GraphqlClientError> {
    let response: GraphqlResponse<serde_json::Value> = serde_json::from_slice(body)?;
    if response.data.is_none() && response.errors.is_empty() {
        return Err(GraphqlClientError::Protocol {
            message: "response carries neither data nor errors".to_string(),
        });
    }
    Ok(response)
}
