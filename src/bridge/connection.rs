//! Per-connection frame state machine.
//!
//! # States
//! ```text
//! HANDSHAKING ──open()──▶ OPEN ──close frame / close() / disconnect()──▶ CLOSED
//!                          │  ▲
//!                          │  └── text → on_message, ping → pong
//!                          └──Socket::close()──▶ CLOSING ──written / peer close / lost──▶ CLOSED
//! ```
//!
//! # Design Decisions
//! - The endpoint lock is taken first and held for every transition, so
//!   callbacks are serialized and nothing is delivered after `on_close`
//! - `on_close` fires exactly once, whichever exit path arrives first
//! - Endpoint panics close only this connection (code 1011)
//! - Binary frames are refused with close code 1003 and reported

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::endpoint::{Endpoint, FrameSink, Socket, SocketState};
use crate::bridge::error::BridgeError;
use crate::bridge::frame::{CloseReason, Frame, CLOSE_INTERNAL_ERROR, CLOSE_UNSUPPORTED};
use crate::error::panic_message;
use crate::observability::metrics;

/// What the transport should do after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Keep reading.
    Continue,
    /// The connection is closed; stop reading.
    Closed,
}

/// Binds one endpoint to one transport channel.
pub struct Bridge {
    socket: Socket,
    endpoint: Mutex<Box<dyn Endpoint>>,
}

impl Bridge {
    pub fn new(endpoint: Box<dyn Endpoint>) -> Self {
        Self {
            socket: Socket::new(),
            endpoint: Mutex::new(endpoint),
        }
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Complete the handshake: attach `sink` and run `on_open`.
    pub fn open(&self, sink: Arc<dyn FrameSink>) -> Result<(), BridgeError> {
        let mut endpoint = self.endpoint.lock();
        if !self.socket.bind(sink) {
            return Err(BridgeError::Closed);
        }

        tracing::debug!(socket_id = %self.socket.id(), "Socket open");
        if let Err(message) = guarded(|| endpoint.on_open(&self.socket)) {
            self.fail(&mut endpoint, &message);
            return Err(BridgeError::EndpointPanicked(message));
        }
        Ok(())
    }

    /// Deliver one inbound frame.
    pub fn handle_frame(&self, frame: Frame) -> Result<FrameOutcome, BridgeError> {
        let mut endpoint = self.endpoint.lock();
        metrics::record_frame(frame.kind());

        let state = self.socket.state();
        match state {
            SocketState::Handshaking => return Err(BridgeError::NotOpen),
            SocketState::Closed => return Err(BridgeError::Closed),
            SocketState::Open | SocketState::Closing => {}
        }

        match frame {
            Frame::Text(text) => {
                if state == SocketState::Closing {
                    tracing::trace!(
                        socket_id = %self.socket.id(),
                        "Dropping text received while closing"
                    );
                    return Ok(FrameOutcome::Continue);
                }
                match guarded(|| endpoint.on_message(&self.socket, text)) {
                    Ok(()) => Ok(FrameOutcome::Continue),
                    Err(message) => {
                        self.fail(&mut endpoint, &message);
                        Err(BridgeError::EndpointPanicked(message))
                    }
                }
            }
            Frame::Ping(payload) => {
                if let Err(err) = self.socket.send_frame(Frame::Pong(payload)) {
                    tracing::debug!(socket_id = %self.socket.id(), error = %err, "Pong not sent");
                }
                Ok(FrameOutcome::Continue)
            }
            Frame::Pong(_) => Ok(FrameOutcome::Continue),
            Frame::Close(reason) => {
                tracing::debug!(
                    socket_id = %self.socket.id(),
                    code = reason.as_ref().map(|r| r.code),
                    "Peer closed socket"
                );
                self.finish(&mut endpoint, Some(Frame::Close(reason)));
                Ok(FrameOutcome::Closed)
            }
            Frame::Binary(_) => {
                tracing::warn!(socket_id = %self.socket.id(), "Binary frame refused");
                let reason = CloseReason::new(CLOSE_UNSUPPORTED, "binary frames are not supported");
                self.finish(&mut endpoint, Some(Frame::Close(Some(reason))));
                Err(BridgeError::UnsupportedFrame { kind: "binary" })
            }
        }
    }

    /// Force a normal close. Returns `true` if this call fired `on_close`.
    pub fn close(&self) -> bool {
        self.close_with(CloseReason::normal())
    }

    /// Force a close with `reason`. Idempotent.
    pub fn close_with(&self, reason: CloseReason) -> bool {
        let mut endpoint = self.endpoint.lock();
        self.finish(&mut endpoint, Some(Frame::Close(Some(reason))))
    }

    /// Our close frame reached the transport, so the outbound close is
    /// complete without the peer's reply. Idempotent.
    pub fn complete_close(&self) -> bool {
        let mut endpoint = self.endpoint.lock();
        let fired = self.finish(&mut endpoint, None);
        if fired {
            tracing::debug!(socket_id = %self.socket.id(), "Outbound close completed");
        }
        fired
    }

    /// The transport went away without a close frame. Idempotent.
    pub fn disconnect(&self) -> bool {
        let mut endpoint = self.endpoint.lock();
        let fired = self.finish(&mut endpoint, None);
        if fired {
            tracing::debug!(socket_id = %self.socket.id(), "Transport lost");
        }
        fired
    }

    /// Shut the socket and run `on_close` if it had been opened.
    fn finish(&self, endpoint: &mut Box<dyn Endpoint>, farewell: Option<Frame>) -> bool {
        match self.socket.shut(farewell) {
            SocketState::Open | SocketState::Closing => {
                if let Err(message) = guarded(|| endpoint.on_close(&self.socket)) {
                    tracing::error!(
                        socket_id = %self.socket.id(),
                        panic = %message,
                        "on_close panicked"
                    );
                }
                tracing::debug!(socket_id = %self.socket.id(), "Socket closed");
                true
            }
            SocketState::Handshaking | SocketState::Closed => false,
        }
    }

    fn fail(&self, endpoint: &mut Box<dyn Endpoint>, message: &str) {
        tracing::error!(
            socket_id = %self.socket.id(),
            panic = %message,
            "Endpoint callback panicked"
        );
        let reason = CloseReason::new(CLOSE_INTERNAL_ERROR, "endpoint failure");
        self.finish(endpoint, Some(Frame::Close(Some(reason))));
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge").field("socket", &self.socket).finish()
    }
}

fn guarded(callback: impl FnOnce()) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(callback)).map_err(|payload| panic_message(&*payload))
}
