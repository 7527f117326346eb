//! WebSocket transport adapter.
//!
//! # Responsibilities
//! - Convert axum messages to bridge frames and back
//! - Run a writer task fed by the bridge's channel sink
//! - Read frames until the bridge reports the connection closed
//! - Signal transport loss to the bridge on every exit path
//!
//! # Data Flow
//! ```text
//! Client ──frames──▶ reader loop ──Frame──▶ Bridge::handle_frame ──▶ Endpoint
//! Client ◀──frames── writer task ◀──mpsc── ChannelSink ◀── Socket::send_message
//! ```
//!
//! # Design Decisions
//! - Unbounded channel: endpoint callbacks never wait on the network
//! - The writer stops after the first close frame it forwards and tells
//!   the reader, which completes the close without waiting for the peer
//! - Protocol-level pongs to client pings may also be queued by the
//!   WebSocket library; a duplicate pong is harmless

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};

use crate::bridge::{
    Bridge, BridgeError, BridgeRegistry, CloseReason, Frame, FrameOutcome, FrameSink,
};

/// Outbound half handed to the bridge.
struct ChannelSink {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameSink for ChannelSink {
    fn send(&self, frame: Frame) -> Result<(), BridgeError> {
        self.tx.send(frame).map_err(|_| BridgeError::NotConnected)
    }
}

/// Drive one upgraded connection until it closes.
pub async fn serve_socket(socket: WebSocket, bridge: Arc<Bridge>, registry: BridgeRegistry) {
    let id = bridge.socket().id();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Frame>();
    let (close_sent_tx, mut close_sent) = oneshot::channel::<()>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(frame, Frame::Close(_));
            if let Err(err) = sender.send(to_message(frame)).await {
                tracing::debug!(socket_id = %id, error = %err, "WebSocket write failed");
                break;
            }
            if closing {
                let _ = close_sent_tx.send(());
                break;
            }
        }
        if let Err(err) = sender.close().await {
            tracing::debug!(socket_id = %id, error = %err, "WebSocket sink close failed");
        }
    });

    registry.insert(Arc::clone(&bridge));

    match bridge.open(Arc::new(ChannelSink { tx })) {
        Ok(()) => loop {
            tokio::select! {
                message = receiver.next() => {
                    let frame = match message {
                        Some(Ok(message)) => from_message(message),
                        Some(Err(err)) => {
                            tracing::debug!(socket_id = %id, error = %err, "WebSocket read failed");
                            break;
                        }
                        None => break,
                    };

                    match bridge.handle_frame(frame) {
                        Ok(FrameOutcome::Continue) => {}
                        Ok(FrameOutcome::Closed) => break,
                        Err(err) => {
                            tracing::warn!(
                                socket_id = %id,
                                error = %err,
                                "WebSocket connection terminated"
                            );
                            break;
                        }
                    }
                }
                sent = &mut close_sent => {
                    if sent.is_ok() {
                        bridge.complete_close();
                    }
                    break;
                }
            }
        },
        Err(err) => {
            tracing::warn!(socket_id = %id, error = %err, "WebSocket open failed");
        }
    }

    bridge.disconnect();
    registry.remove(id);

    if let Err(err) = writer.await {
        tracing::debug!(socket_id = %id, error = %err, "WebSocket writer task failed");
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(close) => Frame::Close(
            close.map(|close| CloseReason::new(close.code, close.reason.as_str())),
        ),
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(Bytes::from(data)),
        Frame::Ping(data) => Message::Ping(Bytes::from(data)),
        Frame::Pong(data) => Message::Pong(Bytes::from(data)),
        Frame::Close(reason) => Message::Close(reason.map(|reason| CloseFrame {
            code: reason.code,
            reason: reason.reason.into(),
        })),
    }
}
