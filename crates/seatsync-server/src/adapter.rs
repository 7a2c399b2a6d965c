//! Transport adapter.
//!
//! Bridges [`Connection`]s to the [`ProtocolHandler`]. Each connection gets
//! one dispatch loop that reads a frame, handles it to completion, and
//! flushes whatever the hub queued for the connection in between.

use crate::config::{Config, RoomAdapterKind};
use crate::handlers::AppContext;
use crate::metrics::{self, ConnectionMetricsGuard};
use seatsync_core::{
    Authenticator, Event, GameMaster, Hub, InMemoryRoomAdapter, Message, ProtocolHandler,
    Registry, RoomAdapter, Socket,
};
use seatsync_protocol::{Frame, FrameType};
use seatsync_transport::{Connection, TransportError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Error code for frames a client must not send.
const UNEXPECTED_FRAME: u16 = 4400;

/// Error code sent when the server is full.
const TOO_MANY_CONNECTIONS: u16 = 4429;

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// Largest inbound message accepted.
    pub max_message_size: usize,
    /// Heartbeat interval advertised in the `connected` frame.
    pub heartbeat_ms: u32,
    /// Connections accepted before new ones are turned away.
    pub max_connections: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        let config = Config::default();
        Self {
            max_message_size: config.transport.max_message_size,
            heartbeat_ms: config.heartbeat.interval_ms,
            max_connections: config.limits.max_connections,
        }
    }
}

/// Adapter construction options.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Group distribution strategy; in-memory when unset.
    pub room_adapter: Option<Arc<dyn RoomAdapter>>,
    /// Per-connection settings.
    pub socket: SocketOptions,
}

impl AdapterConfig {
    /// Derive adapter options from the server configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let room_adapter: Arc<dyn RoomAdapter> = match config.transport.room_adapter {
            RoomAdapterKind::Memory => Arc::new(InMemoryRoomAdapter::new()),
        };

        Self {
            room_adapter: Some(room_adapter),
            socket: SocketOptions {
                max_message_size: config.transport.max_message_size,
                heartbeat_ms: config.heartbeat.interval_ms,
                max_connections: config.limits.max_connections,
            },
        }
    }
}

/// Owns the hub, the registry and the protocol handler for a server.
pub struct TransportAdapter {
    handler: ProtocolHandler,
    socket: SocketOptions,
    active: AtomicUsize,
}

/// A reserved connection slot, returned on drop.
pub struct ConnectionSlot<'a> {
    active: &'a AtomicUsize,
}

impl Drop for ConnectionSlot<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

enum Step {
    Outbound(Arc<Message>),
    Inbound(Result<Option<Frame>, TransportError>),
}

impl TransportAdapter {
    /// Build the hub, registry and handler.
    #[must_use]
    pub fn new(
        config: AdapterConfig,
        auth: Arc<dyn Authenticator>,
        master: Arc<dyn GameMaster>,
    ) -> Self {
        let rooms = config
            .room_adapter
            .unwrap_or_else(|| Arc::new(InMemoryRoomAdapter::new()));
        info!(adapter = rooms.name(), "Transport adapter created");

        let hub = Arc::new(Hub::with_adapter(rooms));
        let registry = Arc::new(Registry::new());

        Self {
            handler: ProtocolHandler::new(hub, registry, auth, master),
            socket: config.socket,
            active: AtomicUsize::new(0),
        }
    }

    /// Install this adapter on the application context.
    pub fn attach(self: Arc<Self>, ctx: &mut AppContext) {
        ctx.transport = Some(self);
    }

    /// The protocol handler.
    #[must_use]
    pub fn handler(&self) -> &ProtocolHandler {
        &self.handler
    }

    /// The membership registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        self.handler().registry()
    }

    /// The connection hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        self.handler().hub()
    }

    /// Per-connection settings.
    #[must_use]
    pub fn socket_options(&self) -> SocketOptions {
        self.socket
    }

    /// Reserve a slot under the connection limit.
    ///
    /// Returns `None` once `max_connections` slots are taken.
    pub fn try_reserve(&self) -> Option<ConnectionSlot<'_>> {
        let max = self.socket.max_connections;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| ConnectionSlot {
                active: &self.active,
            })
    }

    /// Run the dispatch loop for one connection until it ends.
    pub async fn serve<C: Connection>(&self, mut conn: C) {
        let connection_id = conn.id().to_string();

        let Some(_slot) = self.try_reserve() else {
            warn!(connection = %connection_id, "Connection limit reached");
            metrics::record_rejection("connection_limit");
            let _ = conn
                .send(Frame::error(TOO_MANY_CONNECTIONS, "Too many connections"))
                .await;
            let _ = conn.close().await;
            return;
        };

        let _metrics_guard = ConnectionMetricsGuard::new();
        let (socket, mut inbox) = self.handler.connect(&connection_id);
        debug!(connection = %connection_id, remote = ?conn.remote_addr(), "Connection opened");

        if conn
            .send(Frame::connected(&connection_id, self.socket.heartbeat_ms))
            .await
            .is_err()
        {
            warn!(connection = %connection_id, "Failed to send connected frame");
            self.handler.close(&socket).await;
            return;
        }

        loop {
            let step = tokio::select! {
                biased;
                Some(message) = inbox.recv() => Step::Outbound(message),
                inbound = conn.recv() => Step::Inbound(inbound),
            };

            match step {
                Step::Outbound(message) => {
                    metrics::record_emission(&message.event);
                    if let Err(e) = conn.send(message.to_frame()).await {
                        debug!(connection = %connection_id, error = %e, "Send failed");
                        metrics::record_error("send");
                        break;
                    }
                }
                Step::Inbound(Ok(Some(frame))) => {
                    let reply = self.on_frame(&socket, frame).await;
                    if let Some(reply) = reply {
                        if conn.send(reply).await.is_err() {
                            metrics::record_error("send");
                            break;
                        }
                    }
                }
                Step::Inbound(Ok(None)) => break,
                Step::Inbound(Err(e)) if e.is_recoverable() => {
                    warn!(connection = %connection_id, error = %e, "Dropping malformed frame");
                    metrics::record_rejection("malformed");
                    if conn
                        .send(Frame::error(UNEXPECTED_FRAME, e.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Step::Inbound(Err(e)) => {
                    debug!(connection = %connection_id, error = %e, "Receive failed");
                    metrics::record_error("receive");
                    break;
                }
            }
        }

        self.handler.close(&socket).await;
        self.report_membership();
        let _ = conn.close().await;
        debug!(connection = %connection_id, "Connection closed");
    }

    /// Handle one inbound frame, returning a direct reply if one is due.
    async fn on_frame(&self, socket: &Socket, frame: Frame) -> Option<Frame> {
        let frame_type = frame.frame_type();
        if !frame_type.is_inbound() {
            return Some(unexpected(socket, frame_type));
        }
        if let Frame::Ping { timestamp } = frame {
            return Some(Frame::pong(timestamp));
        }

        let event = match Event::try_from(frame) {
            Ok(event) => event,
            Err(frame_type) => return Some(unexpected(socket, frame_type)),
        };

        let kind = event.name();
        let start = Instant::now();
        let result = self.handler.handle(socket, event).await;
        metrics::record_latency(start.elapsed().as_secs_f64());
        metrics::record_event(kind);

        match result {
            Ok(()) => {
                self.report_membership();
                None
            }
            Err(e) => {
                metrics::record_rejection(e.kind());
                Some(Frame::error(e.code(), e.to_string()))
            }
        }
    }

    fn report_membership(&self) {
        let stats = self.registry().stats();
        metrics::set_membership(self.hub().adapter().group_count(), stats.occupied_seats);
    }
}

fn unexpected(socket: &Socket, frame_type: FrameType) -> Frame {
    warn!(connection = %socket.id(), frame = frame_type.as_str(), "Unexpected frame");
    metrics::record_rejection("unexpected_frame");
    Frame::error(UNEXPECTED_FRAME, "Unexpected frame")
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatsync_core::{AllowAll, LogMaster};
    use seatsync_transport::{MemoryConnection, MemoryPeer};
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::timeout;

    fn adapter() -> Arc<TransportAdapter> {
        Arc::new(TransportAdapter::new(
            AdapterConfig::default(),
            Arc::new(AllowAll),
            Arc::new(LogMaster::new()),
        ))
    }

    fn open(adapter: &Arc<TransportAdapter>, id: &str) -> MemoryPeer {
        let (conn, peer) = MemoryConnection::pair(id);
        let adapter = Arc::clone(adapter);
        tokio::spawn(async move { adapter.serve(conn).await });
        peer
    }

    async fn next(peer: &mut MemoryPeer) -> Frame {
        timeout(Duration::from_secs(1), peer.recv())
            .await
            .expect("timed out")
            .expect("stream ended")
    }

    /// Next frame that is not a connectivity notice.
    async fn next_game_frame(peer: &mut MemoryPeer) -> Frame {
        loop {
            match next(peer).await {
                Frame::Emit { event, .. } if event == "matchData" => continue,
                frame => return frame,
            }
        }
    }

    async fn joined(adapter: &Arc<TransportAdapter>, id: &str, seat: &str) -> MemoryPeer {
        let mut peer = open(adapter, id);
        assert!(matches!(next(&mut peer).await, Frame::Connected { .. }));
        peer.send(Frame::sync("matchID", seat, None, 2)).unwrap();
        match next_game_frame(&mut peer).await {
            Frame::Emit { event, .. } => assert_eq!(event, "sync"),
            other => panic!("unexpected frame {other:?}"),
        }
        peer
    }

    #[tokio::test]
    async fn test_connected_frame_first() {
        let adapter = adapter();
        let mut peer = open(&adapter, "c1");

        match next(&mut peer).await {
            Frame::Connected {
                connection_id,
                heartbeat,
                ..
            } => {
                assert_eq!(connection_id, "c1");
                assert_eq!(heartbeat, SocketOptions::default().heartbeat_ms);
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sync_claims_seat() {
        let adapter = adapter();
        let _peer = joined(&adapter, "c1", "0").await;

        let room = adapter.registry().room("matchID").unwrap();
        assert_eq!(room.get("0").map(String::as_str), Some("c1"));
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        let adapter = adapter();
        let mut peer = open(&adapter, "c1");
        next(&mut peer).await;

        peer.send(Frame::Ping { timestamp: Some(7) }).unwrap();
        assert_eq!(next(&mut peer).await, Frame::pong(Some(7)));
    }

    #[tokio::test]
    async fn test_unexpected_frame_rejected() {
        let adapter = adapter();
        let mut peer = open(&adapter, "c1");
        next(&mut peer).await;

        peer.send(Frame::emit("sync", vec![])).unwrap();
        match next(&mut peer).await {
            Frame::Error { code, .. } => assert_eq!(code, UNEXPECTED_FRAME),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_only_frames_rejected() {
        let adapter = adapter();
        let mut peer = open(&adapter, "c1");
        next(&mut peer).await;

        peer.send(Frame::pong(None)).unwrap();
        peer.send(Frame::connected("spoofed", 1)).unwrap();
        for _ in 0..2 {
            match next(&mut peer).await {
                Frame::Error { code, .. } => assert_eq!(code, UNEXPECTED_FRAME),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert!(adapter.registry().client("c1").is_none());
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.transport.max_message_size = 1024;
        config.heartbeat.interval_ms = 5000;
        config.limits.max_connections = 3;

        let adapter_config = AdapterConfig::from_config(&config);
        assert_eq!(
            adapter_config.room_adapter.as_ref().map(|rooms| rooms.name()),
            Some("memory")
        );
        assert_eq!(adapter_config.socket.max_message_size, 1024);
        assert_eq!(adapter_config.socket.heartbeat_ms, 5000);
        assert_eq!(adapter_config.socket.max_connections, 3);
    }

    #[test]
    fn test_slots_are_reserved_up_to_limit() {
        let adapter = TransportAdapter::new(
            AdapterConfig {
                room_adapter: None,
                socket: SocketOptions {
                    max_connections: 2,
                    ..SocketOptions::default()
                },
            },
            Arc::new(AllowAll),
            Arc::new(LogMaster::new()),
        );

        let first = adapter.try_reserve().unwrap();
        let _second = adapter.try_reserve().unwrap();
        assert!(adapter.try_reserve().is_none());

        drop(first);
        assert!(adapter.try_reserve().is_some());
    }

    #[tokio::test]
    async fn test_update_for_unclaimed_seat_rejected() {
        let adapter = adapter();
        let mut peer = joined(&adapter, "c1", "0").await;

        peer.send(Frame::update("matchID", "1", 0, json!("A")))
            .unwrap();
        match next_game_frame(&mut peer).await {
            Frame::Error { code, .. } => assert_eq!(code, 4003),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_reaches_both_seats() {
        let adapter = adapter();
        let mut p0 = joined(&adapter, "c0", "0").await;
        let mut p1 = joined(&adapter, "c1", "1").await;

        p0.send(Frame::update("matchID", "0", 0, json!({"move": "A"})))
            .unwrap();

        for peer in [&mut p0, &mut p1] {
            match next_game_frame(peer).await {
                Frame::Emit { event, args } => {
                    assert_eq!(event, "update");
                    assert_eq!(args[0], json!("matchID"));
                    assert_eq!(args[1]["state_id"], json!(1));
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_hang_up_releases_seat() {
        let adapter = adapter();
        let mut p0 = joined(&adapter, "c0", "0").await;
        let _p1 = joined(&adapter, "c1", "1").await;

        p0.hang_up();
        // The server drops its end once the dispatch loop is done.
        while timeout(Duration::from_secs(1), p0.recv())
            .await
            .expect("timed out")
            .is_some()
        {}

        let room = adapter.registry().room("matchID").unwrap();
        assert_eq!(room.len(), 1);
        assert_eq!(room.get("1").map(String::as_str), Some("c1"));
        assert!(!adapter.hub().is_connected("c0"));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let adapter = Arc::new(TransportAdapter::new(
            AdapterConfig {
                room_adapter: None,
                socket: SocketOptions {
                    max_connections: 1,
                    ..SocketOptions::default()
                },
            },
            Arc::new(AllowAll),
            Arc::new(LogMaster::new()),
        ));
        let mut first = open(&adapter, "c0");
        next(&mut first).await;

        let mut second = open(&adapter, "c1");
        match next(&mut second).await {
            Frame::Error { code, .. } => assert_eq!(code, TOO_MANY_CONNECTIONS),
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
