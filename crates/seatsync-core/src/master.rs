//! The authoritative game-state collaborator.
//!
//! The protocol handler never decides what the game state is. It asks a
//! [`GameMaster`] and relays what the master sends through a
//! [`MatchRouter`]. [`LogMaster`] is a small reference master that keeps an
//! action log per match.

use crate::event::{ChatRequest, ConnectionChange, SyncRequest, UpdateRequest};
use crate::message::Message;
use crate::router::MatchRouter;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

/// Game master errors.
#[derive(Debug, Error)]
pub enum MasterError {
    /// The action was computed against an outdated state.
    #[error("Stale state id {got}, current is {current}")]
    StaleState {
        /// State id sent by the client.
        got: u64,
        /// State id held by the master.
        current: u64,
    },

    /// The match does not exist.
    #[error("Match not found: {0}")]
    MatchNotFound(String),

    /// The action was refused by the game rules.
    #[error("Action rejected: {0}")]
    Rejected(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Owner of the authoritative match state.
#[async_trait]
pub trait GameMaster: Send + Sync {
    /// Current state of the match, sent to a connection that just synced.
    async fn on_sync(&self, request: &SyncRequest) -> Result<Value, MasterError>;

    /// Apply an action; results go out through `router`.
    async fn on_update(
        &self,
        request: &UpdateRequest,
        router: &MatchRouter,
    ) -> Result<(), MasterError>;

    /// A seat gained or lost its connection.
    async fn on_connection_change(
        &self,
        change: &ConnectionChange,
        router: &MatchRouter,
    ) -> Result<(), MasterError>;

    /// A chat message is about to be relayed.
    async fn on_chat_message(&self, request: &ChatRequest) -> Result<(), MasterError>;
}

/// State kept by [`LogMaster`] for one match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchState {
    /// Bumped on every accepted action.
    pub state_id: u64,
    /// Seats in the match.
    pub num_players: u32,
    /// Accepted actions, oldest first.
    pub log: Vec<Value>,
    /// Seat → currently connected.
    pub connected: BTreeMap<String, bool>,
}

impl MatchState {
    fn new(num_players: u32) -> Self {
        Self {
            state_id: 0,
            num_players,
            log: Vec::new(),
            connected: BTreeMap::new(),
        }
    }

    fn to_value(&self) -> Result<Value, MasterError> {
        serde_json::to_value(self).map_err(|e| MasterError::Internal(e.to_string()))
    }
}

/// Reference master: an append-only action log per match.
#[derive(Debug, Default)]
pub struct LogMaster {
    matches: DashMap<String, MatchState>,
}

impl LogMaster {
    /// Create an empty master.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of one match's state.
    #[must_use]
    pub fn state(&self, match_id: &str) -> Option<MatchState> {
        self.matches.get(match_id).map(|s| s.clone())
    }

    /// Number of matches created so far.
    #[must_use]
    pub fn match_count(&self) -> usize {
        self.matches.len()
    }
}

#[async_trait]
impl GameMaster for LogMaster {
    async fn on_sync(&self, request: &SyncRequest) -> Result<Value, MasterError> {
        let state = self
            .matches
            .entry(request.match_id.clone())
            .or_insert_with(|| {
                debug!(match_id = %request.match_id, num_players = request.num_players, "Creating match state");
                MatchState::new(request.num_players)
            });
        state.to_value()
    }

    async fn on_update(
        &self,
        request: &UpdateRequest,
        router: &MatchRouter,
    ) -> Result<(), MasterError> {
        let value = {
            let mut state = self
                .matches
                .get_mut(&request.match_id)
                .ok_or_else(|| MasterError::MatchNotFound(request.match_id.clone()))?;

            if request.state_id != state.state_id {
                return Err(MasterError::StaleState {
                    got: request.state_id,
                    current: state.state_id,
                });
            }

            state.log.push(json!({
                "player_id": request.player_id,
                "action": request.action,
            }));
            state.state_id += 1;
            state.to_value()?
        };

        let reached = router.send_all(|_| {
            Message::new("update", vec![json!(request.match_id), value.clone()])
        });
        debug!(match_id = %request.match_id, player = %request.player_id, reached, "Action applied");
        Ok(())
    }

    async fn on_connection_change(
        &self,
        change: &ConnectionChange,
        router: &MatchRouter,
    ) -> Result<(), MasterError> {
        let connected = {
            let Some(mut state) = self.matches.get_mut(&change.match_id) else {
                return Ok(());
            };
            state
                .connected
                .insert(change.player_id.clone(), change.connected);
            json!(state.connected)
        };

        router.send_all(|_| {
            Message::new("matchData", vec![json!(change.match_id), connected.clone()])
        });
        Ok(())
    }

    async fn on_chat_message(&self, request: &ChatRequest) -> Result<(), MasterError> {
        trace!(match_id = %request.match_id, known = self.matches.contains_key(&request.match_id), "Chat relayed");
        Ok(())
    }
}
