//! Rocket GraphQL - Authenticated GraphQL client facade.
//!
//! This crate provides:
//! - Typed GraphQL operations (queries, mutations, subscriptions).
//! - An ordered interceptor chain ending in an HTTP transport, with
//!   bearer-token injection, logging, and retry with backoff.
//! - A response cache with `UseCacheElseFetch` / `FetchIgnoringCache`.
//! - GraphQL over WebSocket subscriptions sharing one connection.
//! - Cursor pagination helpers.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]

mod cache;
mod client;
mod error;
mod interceptor;
mod operation;
mod pagination;
mod retry;
mod subscription;
mod transport;

pub use cache::{CacheKey, CachePolicy, CachedResponse, ResponseCache};
pub use client::{
    GraphqlClient, GraphqlClientBuilder, GraphqlClientConfig, GraphqlClientMetrics,
    GraphqlClientMetricsSnapshot, derive_subscription_url,
};
pub use error::{
    AuthFailure, ErrorKind, GraphqlClientError, GraphqlError, GraphqlErrorLocation,
    GraphqlPathSegment, HttpErrorInfo,
};
pub use interceptor::{
    AuthInterceptor, Interceptor, InterceptorChain, LoggingInterceptor, Next, OperationRequest,
    RawResponse,
};
pub use operation::{
    GraphqlOperation, GraphqlQuery, GraphqlRequest, GraphqlResponse, OperationKind,
    OperationResult, ResponseSource,
};
pub use pagination::{CursorPage, CursorPageInfo, PageLimit, paginate_cursor};
pub use retry::{RetryDecision, RetryInterceptor, RetryPolicy, RetryStrategy};
pub use subscription::{
    GraphqlSubscriptionClient, GraphqlSubscriptionConfig, GraphqlSubscriptionStream,
    SubscriptionHandle, WsProtocol,
};
pub use transport::{HttpTransport, Transport};
