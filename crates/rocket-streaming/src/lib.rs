//! Rocket Streaming - WebSocket transport for GraphQL subscriptions.
//!
//! A thin layer over `tokio-tungstenite` that adds:
//!
//! - **Handshake headers**: extra headers such as `Authorization`
//! - **Subprotocol selection**: `graphql-ws`, `graphql-transport-ws`, ...
//! - **Connect timeout** and a closed-state aware connection wrapper

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod websocket;

pub use error::*;
pub use websocket::*;
