//! WebSocket connection bridging subsystem.
//!
//! # Data Flow
//! ```text
//! upgrade route matched
//!     → dispatcher creates Bridge (endpoint from the route's factory)
//!     → transport completes handshake → Bridge::open (on_open)
//!     → decoded frames → Bridge::handle_frame
//!           text  → Endpoint::on_message
//!           ping  → pong through FrameSink
//!           close → close echo, Endpoint::on_close
//!     → transport lost → Bridge::disconnect (on_close if still open)
//!
//! Endpoint code → Socket::send_message → FrameSink → transport writer
//! ```
//!
//! # Design Decisions
//! - Transport-agnostic: frames come in as `Frame`, go out through `FrameSink`
//! - One bridge per connection, registered so shutdown can close it
//! - Endpoints are built by a factory closure given at registration

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod registry;

pub use connection::{Bridge, FrameOutcome};
pub use endpoint::{Endpoint, FrameSink, Socket, SocketId, SocketState};
pub use error::BridgeError;
pub use frame::{CloseReason, Frame};
pub use registry::BridgeRegistry;
