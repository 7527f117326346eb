//! Crate-level error types.

use std::any::Any;

use crate::bridge::BridgeError;
use crate::config::ConfigError;
use crate::routing::PatternError;

/// Boxed error returned by application handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for application handlers.
pub type HandlerResult<T = ()> = Result<T, BoxError>;

/// Errors surfaced by the public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("failed to encode JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
