//! WebSocket connections accepted through axum.
//!
//! Binary messages carry length-prefixed MessagePack frames. Text messages
//! carry JSON frames; once a client speaks JSON the connection answers in
//! JSON too.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use seatsync_protocol::{codec, Frame};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

use crate::traits::{Connection, ConnectionId, TransportError};

/// Default maximum inbound message size (64 KB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A WebSocket connection.
pub struct WebSocketConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<SocketAddr>,
    is_open: bool,
    text_mode: bool,
    max_message_size: usize,
}

impl WebSocketConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, max_message_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
            remote_addr: None,
            is_open: true,
            text_mode: false,
            max_message_size,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    fn check_size(&self, size: usize) -> Result<(), TransportError> {
        if size > self.max_message_size {
            warn!(connection = %self.id, size, limit = self.max_message_size, "Message too large");
            return Err(TransportError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        loop {
            let Some(message) = self.socket.recv().await else {
                debug!(connection = %self.id, "WebSocket stream ended");
                self.is_open = false;
                return Ok(None);
            };

            match message {
                Ok(Message::Binary(data)) => {
                    self.check_size(data.len())?;
                    self.text_mode = false;
                    return Ok(Some(codec::decode(&data)?));
                }
                Ok(Message::Text(text)) => {
                    self.check_size(text.len())?;
                    self.text_mode = true;
                    return Ok(Some(codec::decode_json(&text)?));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Control frames are answered by the WebSocket layer.
                    trace!(connection = %self.id, "Control frame");
                }
                Ok(Message::Close(_)) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Err(e) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let message = if self.text_mode {
            Message::Text(codec::encode_json(&frame)?)
        } else {
            Message::Binary(codec::encode(&frame)?.to_vec())
        };

        self.socket
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;

        self.socket
            .send(Message::Close(None))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.map(|addr| addr.to_string())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
