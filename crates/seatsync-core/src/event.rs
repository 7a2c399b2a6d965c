//! Inbound events handled by the protocol handler.

use seatsync_protocol::{Frame, FrameType};
use serde::Serialize;
use serde_json::Value;

/// Claim a seat (or spectate) and request the match state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRequest {
    /// Match to join.
    pub match_id: String,
    /// Seat to occupy; `None` for spectators.
    pub player_id: Option<String>,
    /// Seat credentials.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
    /// Number of seats in the match.
    pub num_players: u32,
}

/// A game action for the claimed seat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateRequest {
    /// Opaque action.
    pub action: Value,
    /// State version the action was computed against.
    pub state_id: u64,
    /// Target match.
    pub match_id: String,
    /// Acting seat.
    pub player_id: String,
    /// Seat credentials, handed to the game master unchecked.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
}

/// A chat message for a match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Target match.
    pub match_id: String,
    /// Opaque payload.
    pub message: Value,
    /// Sender credentials, handed to the game master unchecked.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
}

/// A seat gaining or losing its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionChange {
    /// Match of the seat.
    pub match_id: String,
    /// The seat.
    pub player_id: String,
    /// Connection that came or went.
    pub connection_id: String,
    /// Whether the seat is now connected.
    pub connected: bool,
}

/// Everything that can happen on a connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sync(SyncRequest),
    Update(UpdateRequest),
    Chat(ChatRequest),
    Disconnect,
}

impl Event {
    /// Event name, for logs and metric labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Sync(_) => "sync",
            Event::Update(_) => "update",
            Event::Chat(_) => "chat",
            Event::Disconnect => "disconnect",
        }
    }
}

impl TryFrom<Frame> for Event {
    type Error = FrameType;

    /// Convert a client frame; non-event frames are handed back by type.
    fn try_from(frame: Frame) -> Result<Self, Self::Error> {
        match frame {
            Frame::Sync {
                match_id,
                player_id,
                credentials,
                num_players,
            } => Ok(Event::Sync(SyncRequest {
                match_id,
                player_id,
                credentials,
                num_players,
            })),
            Frame::Update {
                action,
                state_id,
                match_id,
                player_id,
                credentials,
            } => Ok(Event::Update(UpdateRequest {
                action,
                state_id,
                match_id,
                player_id,
                credentials,
            })),
            Frame::Chat {
                match_id,
                message,
                credentials,
            } => Ok(Event::Chat(ChatRequest {
                match_id,
                message,
                credentials,
            })),
            other => Err(other.frame_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_conversion() {
        let event = Event::try_from(Frame::sync("m", "1", Some("c".into()), 4)).unwrap();
        assert_eq!(
            event,
            Event::Sync(SyncRequest {
                match_id: "m".into(),
                player_id: Some("1".into()),
                credentials: Some("c".into()),
                num_players: 4,
            })
        );

        let event = Event::try_from(Frame::chat("m", json!("hi"))).unwrap();
        assert_eq!(event.name(), "chat");

        assert_eq!(
            Event::try_from(Frame::pong(None)),
            Err(FrameType::Pong)
        );
    }
}
