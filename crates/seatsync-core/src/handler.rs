//! Session protocol handler.
//!
//! Applies `sync`, `update`, `chat` and `disconnect` events to the registry
//! and the hub. The handler is the only writer of the registry; callers must
//! await each [`ProtocolHandler::handle`] before handing it the next event of
//! the same connection.

use crate::auth::{Authenticator, SeatClaim};
use crate::event::{ChatRequest, ConnectionChange, Event, SyncRequest, UpdateRequest};
use crate::group::validate_match_id;
use crate::hub::{Hub, Socket};
use crate::master::{GameMaster, MasterError};
use crate::message::{Inbox, Message};
use crate::registry::{ClientInfo, Registry};
use crate::router::MatchRouter;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Handler errors. None of them leave the registry modified.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Malformed match id.
    #[error("Invalid match id: {0}")]
    InvalidMatchId(&'static str),

    /// The authenticator refused the seat claim.
    #[error("Authentication failed for seat {player_id} of match {match_id}")]
    AuthenticationFailed {
        /// Match of the refused claim.
        match_id: String,
        /// Seat of the refused claim.
        player_id: String,
    },

    /// An update for a seat this connection does not hold.
    #[error("Seat {player_id} of match {match_id} is not claimed by this connection")]
    NotClaimed {
        /// Match named by the update.
        match_id: String,
        /// Seat named by the update.
        player_id: String,
    },

    /// The game master failed.
    #[error("Game master error: {0}")]
    Master(#[from] MasterError),
}

impl HandlerError {
    /// Code carried by the `error` frame sent back to the client.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            HandlerError::InvalidMatchId(_) => 4000,
            HandlerError::AuthenticationFailed { .. } => 4001,
            HandlerError::NotClaimed { .. } => 4003,
            HandlerError::Master(MasterError::StaleState { .. }) => 4009,
            HandlerError::Master(_) => 4500,
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerError::InvalidMatchId(_) => "invalid_match_id",
            HandlerError::AuthenticationFailed { .. } => "authentication_failed",
            HandlerError::NotClaimed { .. } => "not_claimed",
            HandlerError::Master(_) => "master",
        }
    }
}

/// Binds registry mutation and routing to the inbound event stream.
pub struct ProtocolHandler {
    hub: Arc<Hub>,
    registry: Arc<Registry>,
    auth: Arc<dyn Authenticator>,
    master: Arc<dyn GameMaster>,
}

impl ProtocolHandler {
    /// Create a handler over shared hub and registry instances.
    #[must_use]
    pub fn new(
        hub: Arc<Hub>,
        registry: Arc<Registry>,
        auth: Arc<dyn Authenticator>,
        master: Arc<dyn GameMaster>,
    ) -> Self {
        Self {
            hub,
            registry,
            auth,
            master,
        }
    }

    /// The hub this handler delivers through.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// The registry this handler maintains.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// A router bound to one match.
    #[must_use]
    pub fn router(&self, match_id: &str) -> MatchRouter {
        MatchRouter::new(match_id, Arc::clone(&self.hub), Arc::clone(&self.registry))
    }

    /// Register a new connection with the hub.
    pub fn connect(&self, connection_id: &str) -> (Socket, Inbox) {
        self.hub.register(connection_id)
    }

    /// Run the disconnect path and drop the connection from the hub.
    pub async fn close(&self, socket: &Socket) {
        // Disconnect cannot fail.
        let _ = self.handle(socket, Event::Disconnect).await;
        self.hub.unregister(socket.id());
    }

    /// Handle one event for `socket`.
    ///
    /// # Errors
    ///
    /// Returns an error when the event is rejected; the registry is left as
    /// it was.
    pub async fn handle(&self, socket: &Socket, event: Event) -> Result<(), HandlerError> {
        debug!(connection = %socket.id(), event = event.name(), "Handling event");

        match event {
            Event::Sync(request) => self.on_sync(socket, request).await,
            Event::Update(request) => self.on_update(socket, request).await,
            Event::Chat(request) => self.on_chat(socket, request).await,
            Event::Disconnect => {
                self.on_disconnect(socket).await;
                Ok(())
            }
        }
    }

    async fn on_sync(&self, socket: &Socket, request: SyncRequest) -> Result<(), HandlerError> {
        validate_match_id(&request.match_id).map_err(HandlerError::InvalidMatchId)?;

        if let Some(player_id) = &request.player_id {
            let claim = SeatClaim {
                match_id: &request.match_id,
                player_id,
                credentials: request.credentials.as_deref(),
            };
            if !self.auth.authenticate(&claim).await {
                warn!(
                    connection = %socket.id(),
                    match_id = %request.match_id,
                    player = %player_id,
                    "Seat claim refused"
                );
                return Err(HandlerError::AuthenticationFailed {
                    match_id: request.match_id.clone(),
                    player_id: player_id.clone(),
                });
            }
        }

        let state = self.master.on_sync(&request).await?;

        let info = ClientInfo {
            match_id: request.match_id.clone(),
            player_id: request.player_id.clone(),
            credentials: request.credentials.clone(),
        };
        let claim = self.registry.claim(socket.id(), info.clone());

        // An evicted connection has no previous claim but may still sit in
        // the group of the match it lost its seat in.
        for group in self.hub.adapter().groups_of(socket.id()) {
            if group != info.match_id {
                self.hub.leave(socket.id(), &group);
            }
        }
        self.hub.join(socket.id(), &info.match_id);

        socket.emit(Message::new("sync", vec![]).arg(info.match_id.as_str()).arg(state));

        if let Some((match_id, player_id)) = claim.vacated_seat(&info) {
            self.connection_changed(socket, match_id, player_id, false)
                .await;
        }
        if let Some(player_id) = &info.player_id {
            self.connection_changed(socket, &info.match_id, player_id, true)
                .await;
        }

        Ok(())
    }

    async fn on_update(&self, socket: &Socket, request: UpdateRequest) -> Result<(), HandlerError> {
        let holds = self
            .registry
            .client(socket.id())
            .is_some_and(|info| info.holds(&request.match_id, &request.player_id));

        if !holds {
            warn!(
                connection = %socket.id(),
                match_id = %request.match_id,
                player = %request.player_id,
                "Update for unclaimed seat"
            );
            return Err(HandlerError::NotClaimed {
                match_id: request.match_id,
                player_id: request.player_id,
            });
        }

        let router = self.router(&request.match_id).with_origin(socket.clone());
        self.master.on_update(&request, &router).await?;
        Ok(())
    }

    async fn on_chat(&self, socket: &Socket, request: ChatRequest) -> Result<(), HandlerError> {
        validate_match_id(&request.match_id).map_err(HandlerError::InvalidMatchId)?;
        self.master.on_chat_message(&request).await?;

        let message = Message::new("chat", vec![])
            .arg(request.match_id.as_str())
            .arg(request.message);
        let recipients = self.router(&request.match_id).broadcast(message);
        debug!(connection = %socket.id(), match_id = %request.match_id, recipients, "Chat relayed");
        Ok(())
    }

    async fn on_disconnect(&self, socket: &Socket) {
        let released = self.registry.release(socket.id());
        self.hub.leave_all(socket.id());

        let Some(info) = released else {
            return;
        };
        if let Some(player_id) = &info.player_id {
            self.connection_changed(socket, &info.match_id, player_id, false)
                .await;
        }
    }

    /// Tell the master a seat's connectivity changed. Failures are logged:
    /// the registry change has already happened.
    async fn connection_changed(
        &self,
        socket: &Socket,
        match_id: &str,
        player_id: &str,
        connected: bool,
    ) {
        let change = ConnectionChange {
            match_id: match_id.to_string(),
            player_id: player_id.to_string(),
            connection_id: socket.id().to_string(),
            connected,
        };
        let router = self.router(match_id).with_origin(socket.clone());

        if let Err(e) = self.master.on_connection_change(&change, &router).await {
            warn!(match_id = %match_id, player = %player_id, error = %e, "Connection change not applied");
        }
    }
}
