//! Bridge error type.

/// Failure on one upgraded connection. Never affects other connections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("socket is not open yet")]
    NotOpen,

    #[error("socket has no transport channel")]
    NotConnected,

    #[error("socket is closed")]
    Closed,

    #[error("unsupported {kind} frame")]
    UnsupportedFrame { kind: &'static str },

    #[error("endpoint callback panicked: {0}")]
    EndpointPanicked(String),
}
