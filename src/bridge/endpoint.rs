//! Endpoint contract and the socket handle given to endpoints.
//!
//! # Design Decisions
//! - The socket owns the transport channel handle; it is present exactly
//!   while the socket is `Open` (or `Closing` after an outbound close)
//! - Sending outside `Open` fails with a [`BridgeError`], it never panics
//! - Identifiers are random 63-bit values, rendered in decimal or hex

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bridge::error::BridgeError;
use crate::bridge::frame::{CloseReason, Frame};

/// Application object behind one upgraded connection.
///
/// Callbacks for one connection never run concurrently. `on_open` runs
/// before any other callback and `on_close` runs at most once, last.
pub trait Endpoint: Send + 'static {
    fn on_open(&mut self, _socket: &Socket) {}

    fn on_message(&mut self, socket: &Socket, text: String);

    fn on_close(&mut self, _socket: &Socket) {}
}

/// Outbound half of the transport.
pub trait FrameSink: Send + Sync {
    fn send(&self, frame: Frame) -> Result<(), BridgeError>;
}

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// A fresh random non-negative 63-bit identifier.
    pub fn generate() -> Self {
        Self(rand::random::<u64>() >> 1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn to_hex(&self) -> String {
        format!("{:x}", self.0)
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Handshaking,
    Open,
    /// We sent a close frame and wait for the peer or the transport.
    Closing,
    Closed,
}

struct Link {
    state: SocketState,
    sink: Option<Arc<dyn FrameSink>>,
}

struct SocketInner {
    id: SocketId,
    link: Mutex<Link>,
}

/// Cheap, cloneable handle to one connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

impl Socket {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SocketInner {
                id: SocketId::generate(),
                link: Mutex::new(Link {
                    state: SocketState::Handshaking,
                    sink: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> SocketId {
        self.inner.id
    }

    pub fn id_hex(&self) -> String {
        self.inner.id.to_hex()
    }

    pub fn state(&self) -> SocketState {
        self.inner.link.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// Send a text frame. Only valid while the socket is open.
    pub fn send_message(&self, text: impl Into<String>) -> Result<(), BridgeError> {
        let link = self.inner.link.lock();
        match link.state {
            SocketState::Handshaking => Err(BridgeError::NotOpen),
            SocketState::Closing | SocketState::Closed => Err(BridgeError::Closed),
            SocketState::Open => {
                let sink = link.sink.as_ref().ok_or(BridgeError::NotConnected)?;
                sink.send(Frame::Text(text.into()))
            }
        }
    }

    /// Start a close handshake from our side.
    ///
    /// Returns `false` when the socket was not open. `on_close` fires once
    /// the close frame is written, the peer answers or the transport goes away.
    pub fn close(&self) -> bool {
        let mut link = self.inner.link.lock();
        if link.state != SocketState::Open {
            return false;
        }
        link.state = SocketState::Closing;
        if let Some(sink) = link.sink.take() {
            if let Err(err) = sink.send(Frame::Close(Some(CloseReason::normal()))) {
                tracing::debug!(
                    socket_id = %self.inner.id,
                    error = %err,
                    "Close frame not delivered"
                );
            }
        }
        true
    }

    /// `Handshaking → Open`, attaching the transport channel.
    pub(crate) fn bind(&self, sink: Arc<dyn FrameSink>) -> bool {
        let mut link = self.inner.link.lock();
        if link.state != SocketState::Handshaking {
            return false;
        }
        link.state = SocketState::Open;
        link.sink = Some(sink);
        true
    }

    /// Send a control frame through the channel if it is still attached.
    pub(crate) fn send_frame(&self, frame: Frame) -> Result<(), BridgeError> {
        let link = self.inner.link.lock();
        let sink = link.sink.as_ref().ok_or(BridgeError::NotConnected)?;
        sink.send(frame)
    }

    /// Move to `Closed` and release the channel, sending `farewell` first if
    /// the socket was open. Returns the previous state.
    pub(crate) fn shut(&self, farewell: Option<Frame>) -> SocketState {
        let mut link = self.inner.link.lock();
        let previous = link.state;
        let sink = link.sink.as_ref();
        if let (SocketState::Open, Some(frame), Some(sink)) = (previous, farewell, sink) {
            if let Err(err) = sink.send(frame) {
                tracing::debug!(
                    socket_id = %self.inner.id,
                    error = %err,
                    "Farewell frame not delivered"
                );
            }
        }
        link.state = SocketState::Closed;
        link.sink = None;
        previous
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Frame>>);

    impl FrameSink for Recorder {
        fn send(&self, frame: Frame) -> Result<(), BridgeError> {
            self.0.lock().push(frame);
            Ok(())
        }
    }

    #[test]
    fn test_id_renderings() {
        let socket = Socket::new();
        let id = socket.id().as_u64();
        assert!(id <= i64::MAX as u64);
        assert_eq!(socket.id().to_string(), id.to_string());
        assert_eq!(u64::from_str_radix(&socket.id_hex(), 16).unwrap(), id);
    }

    #[test]
    fn test_send_requires_open() {
        let socket = Socket::new();
        assert_eq!(socket.send_message("early"), Err(BridgeError::NotOpen));

        let sink = Arc::new(Recorder::default());
        assert!(socket.bind(sink.clone()));
        assert!(!socket.bind(sink.clone()));
        socket.send_message("hello").unwrap();

        socket.shut(None);
        assert_eq!(socket.send_message("late"), Err(BridgeError::Closed));
        assert_eq!(*sink.0.lock(), [Frame::Text("hello".into())]);
    }

    #[test]
    fn test_outbound_close_releases_channel() {
        let socket = Socket::new();
        let sink = Arc::new(Recorder::default());
        socket.bind(sink.clone());

        assert!(socket.close());
        assert!(!socket.close());
        assert_eq!(socket.state(), SocketState::Closing);
        assert_eq!(socket.send_message("after"), Err(BridgeError::Closed));
        assert_eq!(socket.send_frame(Frame::Pong(vec![])), Err(BridgeError::NotConnected));
        assert_eq!(*sink.0.lock(), [Frame::Close(Some(CloseReason::normal()))]);
    }

    #[test]
    fn test_shut_sends_farewell_only_when_open() {
        let socket = Socket::new();
        assert_eq!(socket.shut(Some(Frame::Close(None))), SocketState::Handshaking);

        let socket = Socket::new();
        let sink = Arc::new(Recorder::default());
        socket.bind(sink.clone());
        assert_eq!(socket.shut(Some(Frame::Close(None))), SocketState::Open);
        assert_eq!(socket.shut(Some(Frame::Close(None))), SocketState::Closed);
        assert_eq!(sink.0.lock().len(), 1);
    }
}
