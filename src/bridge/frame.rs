//! Decoded WebSocket frames as seen by the bridge.

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away (server shutdown).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Received a frame type the endpoint does not accept.
pub const CLOSE_UNSUPPORTED: u16 = 1003;
/// The endpoint hit an unexpected condition.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close code and reason text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    pub fn going_away() -> Self {
        Self::new(CLOSE_GOING_AWAY, "server shutting down")
    }
}

/// One decoded frame, inbound or outbound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close(_) => "close",
        }
    }
}
