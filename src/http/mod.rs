//! HTTP request/response bridging subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum setup, middleware)
//!     → bridge.rs (per-event lifecycle)
//!         → request.rs (RequestView snapshot)
//!         → response.rs (ResponseState, mutated by the dispatcher)
//!             → headers.rs, cookie.rs
//!         → transport.rs (drain into the runtime response)
//!     → Send to client
//! ```

pub mod bridge;
pub mod cookie;
pub mod headers;
pub mod request;
pub mod response;
pub mod server;
pub mod transport;

pub use bridge::{drain, Dispatcher, EventBridge, EventPhase, EventReport};
pub use cookie::{encode_cookie, Cookie, SET_COOKIE};
pub use headers::HeaderSet;
pub use request::{RequestError, RequestView, X_REQUEST_ID};
pub use response::{BodyBuffer, ResponseError, ResponseState, View, JSON_CONTENT_TYPE};
pub use server::HttpServer;
pub use transport::{AxumTransport, TransportError, TransportResponse};
