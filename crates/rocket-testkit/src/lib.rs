//! Rocket Test Kit - Mock servers and tracing setup for Rocket Reserver tests.
//!
//! - [`MockGraphqlServer`] - wiremock-backed GraphQL HTTP endpoint that
//!   answers by operation name and records what it received
//! - [`ScriptedWsServer`] - GraphQL-over-WebSocket server whose pushes are
//!   driven from the test
//! - Tracing configuration for test output
//!
//! # Example
//!
//! ```rust,ignore
//! use rocket_testkit::MockGraphqlServer;
//!
//! #[tokio::test]
//! async fn lists_launches() {
//!     rocket_testkit::init_test_tracing();
//!
//!     let mock = MockGraphqlServer::start().await;
//!     mock.respond("LaunchList", serde_json::json!({
//!         "data": { "launches": { "hasMore": false, "cursor": "1583556631", "launches": [] } }
//!     })).await;
//!
//!     // point a GraphqlClient at mock.url() ...
//!     mock.assert_operation_count("LaunchList", 1).await;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]

mod mock_server;
mod tracing_config;
mod ws_server;

pub use mock_server::*;
pub use tracing_config::*;
pub use ws_server::*;
