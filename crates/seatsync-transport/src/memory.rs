//! In-process connections.
//!
//! [`MemoryConnection::pair`] returns a server-side connection and the
//! client-side [`MemoryPeer`] that drives it. Used by tests and for
//! embedding bots in the same process as the server.

use async_trait::async_trait;
use seatsync_protocol::Frame;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionId, TransportError};

/// Server side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<Frame>,
    is_open: bool,
}

/// Client side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    to_server: Option<mpsc::UnboundedSender<Frame>>,
    from_server: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryConnection {
    /// Create a connected pair.
    #[must_use]
    pub fn pair(id: impl Into<ConnectionId>) -> (Self, MemoryPeer) {
        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();

        let conn = Self {
            id: id.into(),
            inbound,
            outbound,
            is_open: true,
        };
        let peer = MemoryPeer {
            to_server: Some(to_server),
            from_server,
        };
        (conn, peer)
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        let frame = self.inbound.recv().await;
        if frame.is_none() {
            self.is_open = false;
        }
        Ok(frame)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.inbound.close();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

impl MemoryPeer {
    /// Send a frame to the server side.
    ///
    /// # Errors
    ///
    /// Returns an error once the peer hung up or the server side is gone.
    pub fn send(&self, frame: Frame) -> Result<(), TransportError> {
        self.to_server
            .as_ref()
            .ok_or(TransportError::ConnectionClosed)?
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Wait for the next frame from the server.
    ///
    /// Returns `None` once the server side is dropped.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_server.recv().await
    }

    /// Take a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.from_server.try_recv().ok()
    }

    /// End the stream seen by the server side.
    pub fn hang_up(&mut self) {
        self.to_server = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_carries_frames_both_ways() {
        let (mut conn, mut peer) = MemoryConnection::pair("conn-1");

        peer.send(Frame::spectate("m")).unwrap();
        assert_eq!(conn.recv().await.unwrap(), Some(Frame::spectate("m")));

        conn.send(Frame::emit("sync", vec![json!("m")])).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::emit("sync", vec![json!("m")])));
        assert_eq!(conn.id().as_str(), "conn-1");
    }

    #[tokio::test]
    async fn test_hang_up_ends_stream() {
        let (mut conn, mut peer) = MemoryConnection::pair("conn-1");

        peer.hang_up();
        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!conn.is_open());
        assert!(conn.send(Frame::pong(None)).await.is_err());
        assert!(peer.send(Frame::pong(None)).is_err());
    }
}
