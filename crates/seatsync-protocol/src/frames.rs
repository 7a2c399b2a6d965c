//! Frame types for the Seatsync protocol.
//!
//! Clients send `sync`, `update` and `chat` frames; the server answers with
//! named `emit` frames carrying positional arguments, mirroring an
//! event-emitter style socket API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Current protocol version, announced in the `connected` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Frame kinds, used for logging and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Sync,
    Update,
    Chat,
    Emit,
    Error,
    Ping,
    Pong,
    Connected,
}

impl FrameType {
    /// Wire name of the frame kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Sync => "sync",
            FrameType::Update => "update",
            FrameType::Chat => "chat",
            FrameType::Emit => "emit",
            FrameType::Error => "error",
            FrameType::Ping => "ping",
            FrameType::Pong => "pong",
            FrameType::Connected => "connected",
        }
    }

    /// Whether clients are allowed to send this frame kind.
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        matches!(
            self,
            FrameType::Sync | FrameType::Update | FrameType::Chat | FrameType::Ping
        )
    }
}

fn default_num_players() -> u32 {
    2
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Claim a seat (or spectate) in a match and request its current state.
    Sync {
        /// Match to join.
        match_id: String,
        /// Seat to occupy; absent for spectators.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        player_id: Option<String>,
        /// Token proving seat ownership.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
        /// Number of seats the match is played with.
        #[serde(default = "default_num_players")]
        num_players: u32,
    },

    /// Submit a game action for the claimed seat.
    Update {
        /// Opaque action payload, interpreted by the game master.
        action: Value,
        /// State version the action was computed against.
        state_id: u64,
        /// Target match.
        match_id: String,
        /// Acting seat.
        player_id: String,
        /// Seat credentials. The connection's claim authorizes the update;
        /// the game master receives these unchecked.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },

    /// Chat message relayed to everyone in the match.
    Chat {
        /// Target match.
        match_id: String,
        /// Opaque chat payload.
        message: Value,
        /// Sender credentials. Not checked by the server; the game master
        /// receives them with the chat request.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        credentials: Option<String>,
    },

    /// Named server event with positional arguments.
    Emit {
        /// Event name (`sync`, `update`, `chat`, `matchData`, ...).
        event: String,
        /// Positional arguments.
        #[serde(default)]
        args: Vec<Value>,
    },

    /// Rejected request.
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    Ping {
        /// Optional timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent once after the socket is accepted.
    Connected {
        /// Identifier the server assigned to this connection.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Sync { .. } => FrameType::Sync,
            Frame::Update { .. } => FrameType::Update,
            Frame::Chat { .. } => FrameType::Chat,
            Frame::Emit { .. } => FrameType::Emit,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Create a seat-claiming Sync frame.
    #[must_use]
    pub fn sync(
        match_id: impl Into<String>,
        player_id: impl Into<String>,
        credentials: Option<String>,
        num_players: u32,
    ) -> Self {
        Frame::Sync {
            match_id: match_id.into(),
            player_id: Some(player_id.into()),
            credentials,
            num_players,
        }
    }

    /// Create a spectator Sync frame.
    #[must_use]
    pub fn spectate(match_id: impl Into<String>) -> Self {
        Frame::Sync {
            match_id: match_id.into(),
            player_id: None,
            credentials: None,
            num_players: default_num_players(),
        }
    }

    /// Create an Update frame.
    #[must_use]
    pub fn update(
        match_id: impl Into<String>,
        player_id: impl Into<String>,
        state_id: u64,
        action: Value,
    ) -> Self {
        Frame::Update {
            action,
            state_id,
            match_id: match_id.into(),
            player_id: player_id.into(),
            credentials: None,
        }
    }

    /// Create a Chat frame.
    #[must_use]
    pub fn chat(match_id: impl Into<String>, message: Value) -> Self {
        Frame::Chat {
            match_id: match_id.into(),
            message,
            credentials: None,
        }
    }

    /// Create an Emit frame.
    #[must_use]
    pub fn emit(event: impl Into<String>, args: Vec<Value>) -> Self {
        Frame::Emit {
            event: event.into(),
            args,
        }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a Connected frame.
    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_type() {
        assert_eq!(Frame::spectate("m").frame_type(), FrameType::Sync);
        assert_eq!(Frame::emit("sync", vec![]).frame_type(), FrameType::Emit);
        assert!(FrameType::Update.is_inbound());
        assert!(!FrameType::Emit.is_inbound());
    }

    #[test]
    fn test_sync_json_defaults() {
        let frame: Frame = serde_json::from_value(json!({
            "type": "sync",
            "match_id": "matchID",
        }))
        .unwrap();

        assert_eq!(
            frame,
            Frame::Sync {
                match_id: "matchID".into(),
                player_id: None,
                credentials: None,
                num_players: 2,
            }
        );
    }

    #[test]
    fn test_emit_json_shape() {
        let value = serde_json::to_value(Frame::emit("chat", vec![json!("m"), json!({"a": 1})]))
            .unwrap();
        assert_eq!(
            value,
            json!({"type": "emit", "event": "chat", "args": ["m", {"a": 1}]})
        );
    }
}
