//! The transport handle.
//!
//! The hub knows every live socket's outbound queue and, through its
//! [`RoomAdapter`], which sockets sit in which match group. It never looks
//! at seats; that is the registry's job.

use crate::group::{InMemoryRoomAdapter, RoomAdapter};
use crate::message::{Inbox, Message, Outbox};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A live connection as seen by the handler: its id and outbound queue.
#[derive(Debug, Clone)]
pub struct Socket {
    id: String,
    outbox: Outbox,
}

impl Socket {
    /// Create a socket around an existing outbound queue.
    #[must_use]
    pub fn new(id: impl Into<String>, outbox: Outbox) -> Self {
        Self {
            id: id.into(),
            outbox,
        }
    }

    /// Create a socket that is not registered with any hub.
    #[must_use]
    pub fn detached(id: impl Into<String>) -> (Self, Inbox) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (Self::new(id, outbox), inbox)
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue a message for this socket.
    ///
    /// Returns `false` if the socket is gone.
    pub fn emit(&self, message: impl Into<Arc<Message>>) -> bool {
        self.outbox.send(message.into()).is_ok()
    }
}

/// Socket table plus group strategy.
#[derive(Debug)]
pub struct Hub {
    sockets: DashMap<String, Outbox>,
    rooms: Arc<dyn RoomAdapter>,
}

impl Hub {
    /// Create a hub with the in-memory group strategy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_adapter(Arc::new(InMemoryRoomAdapter::new()))
    }

    /// Create a hub with a custom group strategy.
    #[must_use]
    pub fn with_adapter(rooms: Arc<dyn RoomAdapter>) -> Self {
        debug!(adapter = rooms.name(), "Creating hub");
        Self {
            sockets: DashMap::new(),
            rooms,
        }
    }

    /// The group strategy in use.
    #[must_use]
    pub fn adapter(&self) -> &Arc<dyn RoomAdapter> {
        &self.rooms
    }

    /// Register a connection and get its socket and outbound receiver.
    pub fn register(&self, connection_id: &str) -> (Socket, Inbox) {
        let (socket, inbox) = Socket::detached(connection_id);
        self.sockets
            .insert(connection_id.to_string(), socket.outbox.clone());
        debug!(connection = %connection_id, sockets = self.sockets.len(), "Socket registered");
        (socket, inbox)
    }

    /// Drop a connection's outbound queue and group memberships.
    pub fn unregister(&self, connection_id: &str) {
        self.rooms.leave_all(connection_id);
        if self.sockets.remove(connection_id).is_some() {
            debug!(connection = %connection_id, sockets = self.sockets.len(), "Socket unregistered");
        }
    }

    /// Whether a connection is registered.
    #[must_use]
    pub fn is_connected(&self, connection_id: &str) -> bool {
        self.sockets.contains_key(connection_id)
    }

    /// Number of registered sockets.
    #[must_use]
    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Queue a message for one connection.
    ///
    /// Returns `false` if the connection is unknown or gone.
    pub fn emit(&self, connection_id: &str, message: Arc<Message>) -> bool {
        match self.sockets.get(connection_id) {
            Some(outbox) => outbox.send(message).is_ok(),
            None => {
                trace!(connection = %connection_id, "Emit to unknown socket dropped");
                false
            }
        }
    }

    /// Queue a message for every member of a group.
    ///
    /// Returns the number of sockets reached.
    pub fn broadcast(&self, group: &str, message: Message) -> usize {
        let message = Arc::new(message);
        let count = self
            .rooms
            .members(group)
            .iter()
            .filter(|member| self.emit(member, Arc::clone(&message)))
            .count();
        trace!(group = %group, event = %message.event, recipients = count, "Broadcast");
        count
    }

    /// Put a connection into a match group.
    pub fn join(&self, connection_id: &str, group: &str) {
        self.rooms.join(connection_id, group);
    }

    /// Take a connection out of a match group.
    pub fn leave(&self, connection_id: &str, group: &str) -> bool {
        self.rooms.leave(connection_id, group)
    }

    /// Take a connection out of every match group.
    pub fn leave_all(&self, connection_id: &str) -> Vec<String> {
        self.rooms.leave_all(connection_id)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_only_target() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.register("a");
        let (_b, mut rx_b) = hub.register("b");

        assert!(hub.emit("a", Arc::new(Message::new("ping", vec![]))));
        assert!(!hub.emit("missing", Arc::new(Message::new("ping", vec![]))));

        assert_eq!(rx_a.try_recv().unwrap().event, "ping");
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_to_group() {
        let hub = Hub::new();
        let (_a, mut rx_a) = hub.register("a");
        let (_b, mut rx_b) = hub.register("b");
        let (_c, mut rx_c) = hub.register("c");
        hub.join("a", "m");
        hub.join("b", "m");

        assert_eq!(hub.broadcast("m", Message::new("chat", vec![])), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn test_unregister_leaves_groups() {
        let hub = Hub::new();
        let (socket, rx) = hub.register("a");
        hub.join("a", "m");

        hub.unregister("a");
        assert!(!hub.is_connected("a"));
        assert!(hub.adapter().members("m").is_empty());

        drop(rx);
        assert!(!socket.emit(Message::new("late", vec![])));
    }
}
