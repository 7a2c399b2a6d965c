//! Per-match message routing.
//!
//! A [`MatchRouter`] is handed to the game master for one match. It resolves
//! seats through the registry and delivers through the hub, so the master
//! never addresses connections directly.

use crate::hub::{Hub, Socket};
use crate::message::Message;
use crate::registry::{PlayerId, Registry};
use std::sync::Arc;
use tracing::trace;

/// Seat-addressed delivery for one match.
#[derive(Debug, Clone)]
pub struct MatchRouter {
    match_id: String,
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    origin: Option<Socket>,
}

impl MatchRouter {
    /// Create a router bound to `match_id`.
    #[must_use]
    pub fn new(match_id: impl Into<String>, hub: Arc<Hub>, registry: Arc<Registry>) -> Self {
        Self {
            match_id: match_id.into(),
            hub,
            registry,
            origin: None,
        }
    }

    /// Mark the socket whose event is being handled.
    ///
    /// Messages for the origin go straight into its own queue.
    #[must_use]
    pub fn with_origin(mut self, socket: Socket) -> Self {
        self.origin = Some(socket);
        self
    }

    /// The match this router is bound to.
    #[must_use]
    pub fn match_id(&self) -> &str {
        &self.match_id
    }

    /// Seats currently occupied in the match.
    #[must_use]
    pub fn seats(&self) -> Vec<PlayerId> {
        self.registry.seats(&self.match_id)
    }

    /// Deliver `message` to the connection holding `player_id`.
    ///
    /// An unoccupied seat is not an error: the player may be offline.
    /// Returns whether the message was queued.
    pub fn send(&self, player_id: &str, message: Message) -> bool {
        self.deliver(player_id, Arc::new(message))
    }

    /// Deliver one message per occupied seat, built by `factory`.
    ///
    /// Returns the number of seats reached.
    pub fn send_all<F>(&self, mut factory: F) -> usize
    where
        F: FnMut(&str) -> Message,
    {
        let mut reached = 0;
        for player_id in self.seats() {
            let message = factory(&player_id);
            if self.deliver(&player_id, Arc::new(message)) {
                reached += 1;
            }
        }
        reached
    }

    /// Deliver `message` to every connection in the match group, seated or not.
    pub fn broadcast(&self, message: Message) -> usize {
        self.hub.broadcast(&self.match_id, message)
    }

    fn deliver(&self, player_id: &str, message: Arc<Message>) -> bool {
        let Some(connection_id) = self.registry.connection_for(&self.match_id, player_id) else {
            trace!(match_id = %self.match_id, player = %player_id, event = %message.event, "Seat unoccupied, dropped");
            return false;
        };

        trace!(
            match_id = %self.match_id,
            player = %player_id,
            connection = %connection_id,
            event = %message.event,
            "Send"
        );

        match &self.origin {
            Some(origin) if origin.id() == connection_id => origin.emit(message),
            _ => self.hub.emit(&connection_id, message),
        }
    }
}
