//! Request/response lifecycle bridge.
//!
//! Application code written for a "one request, one implicit response" model
//! runs on top of tokio + axum: each inbound event gets a fresh
//! [`RequestView`] and [`ResponseState`], the [`Dispatcher`] fills in the
//! response, and the bridge drains it into the transport exactly once.
//! Writes after the response has ended are rejected, logged and counted
//! instead of reaching a closed connection.

// Core subsystems
pub mod config;
pub mod http;
pub mod tasks;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::BridgeConfig;
pub use http::{Dispatcher, EventBridge, HttpServer, RequestView, ResponseState};
pub use lifecycle::{LoggingHooks, ServerHooks, Shutdown};
pub use tasks::{TaskPool, TaskSender};
