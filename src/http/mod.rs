//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum, body buffering, timeout, tracing)
//!     → request.rs (split target, decode query and cookies)
//!     → dispatcher.rs (walk route matches, apply handler-kind policy)
//!         → response.rs (accumulated status, headers, cookies, body) → client
//!         → websocket.rs (handshake done, frames ⇄ Bridge) for upgrades
//! ```

pub mod cookie;
pub mod dispatcher;
pub mod query;
pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use cookie::Cookie;
pub use dispatcher::{Dispatch, Dispatcher, HandlerFailure, FORBIDDEN_BODY, NOT_FOUND_BODY};
pub use request::{IncomingRequest, Request};
pub use response::Response;
pub use server::{AppState, HttpServer};
