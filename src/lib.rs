//! Trellis: embeddable request dispatch.
//!
//! Route patterns with named parameters, ordered middleware chains, a
//! WebSocket bridge driving per-connection endpoints, and an in-process
//! session store with sliding expiry, served through axum.

// Core subsystems
pub mod bridge;
pub mod http;
pub mod routing;
pub mod session;

// Cross-cutting concerns
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use bridge::{Endpoint, Socket};
pub use config::TrellisConfig;
pub use error::{BoxError, Error, HandlerResult};
pub use http::{Dispatcher, HttpServer, IncomingRequest, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::{Handler, Router};
pub use session::{MemorySessionStore, SessionData, SessionStore};
