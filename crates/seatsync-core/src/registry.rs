//! Client and room membership registry.
//!
//! Two coupled tables: which match and seat every connection claims, and
//! which connection currently occupies every seat of a match. Both tables
//! sit behind one lock so every claim and release updates them as a pair.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace, warn};

/// A match identifier.
pub type MatchId = String;

/// A seat identifier within a match.
pub type PlayerId = String;

/// Seat → connection mapping of one match.
pub type Seats = BTreeMap<PlayerId, String>;

/// What a connection currently claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Match the connection is synced into.
    pub match_id: MatchId,
    /// Seat held by the connection, `None` for spectators.
    pub player_id: Option<PlayerId>,
    /// Token presented for the seat.
    #[serde(skip_serializing)]
    pub credentials: Option<String>,
}

impl ClientInfo {
    /// Create a seat claim.
    #[must_use]
    pub fn player(match_id: impl Into<MatchId>, player_id: impl Into<PlayerId>) -> Self {
        Self {
            match_id: match_id.into(),
            player_id: Some(player_id.into()),
            credentials: None,
        }
    }

    /// Create a spectator claim.
    #[must_use]
    pub fn spectator(match_id: impl Into<MatchId>) -> Self {
        Self {
            match_id: match_id.into(),
            player_id: None,
            credentials: None,
        }
    }

    /// Attach credentials to the claim.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<String>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Whether this claim holds `player_id` in `match_id`.
    #[must_use]
    pub fn holds(&self, match_id: &str, player_id: &str) -> bool {
        self.match_id == match_id && self.player_id.as_deref() == Some(player_id)
    }
}

/// Result of [`Registry::claim`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claim {
    /// The connection's previous claim, if it had one.
    pub previous: Option<ClientInfo>,
    /// A different connection that held the seat and lost it.
    pub evicted: Option<String>,
}

impl Claim {
    /// The seat the connection gave up by claiming, if it differs from `current`.
    #[must_use]
    pub fn vacated_seat(&self, current: &ClientInfo) -> Option<(&str, &str)> {
        let previous = self.previous.as_ref()?;
        let player = previous.player_id.as_deref()?;
        let same_seat = current
            .player_id
            .as_deref()
            .is_some_and(|seat| previous.holds(&current.match_id, seat));
        if same_seat {
            return None;
        }
        Some((previous.match_id.as_str(), player))
    }
}

/// Point-in-time copy of both tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    /// Connection → claim.
    pub clients: HashMap<String, ClientInfo>,
    /// Match → seat → connection.
    pub rooms: HashMap<MatchId, Seats>,
}

impl RegistrySnapshot {
    /// Check the bidirectional client/room invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let forward = self.clients.iter().all(|(conn, info)| match &info.player_id {
            Some(player) => self
                .rooms
                .get(&info.match_id)
                .and_then(|seats| seats.get(player))
                == Some(conn),
            None => true,
        });
        let backward = self.rooms.iter().all(|(match_id, seats)| {
            seats.iter().all(|(player, conn)| {
                self.clients
                    .get(conn)
                    .is_some_and(|info| info.holds(match_id, player))
            })
        });
        forward && backward
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    /// Connections with a claim.
    pub client_count: usize,
    /// Matches known to the room table, empty ones included.
    pub match_count: usize,
    /// Occupied seats across all matches.
    pub occupied_seats: usize,
}

#[derive(Debug, Default)]
struct Tables {
    clients: HashMap<String, ClientInfo>,
    rooms: HashMap<MatchId, Seats>,
}

impl Tables {
    /// Drop `seat` from the room table if `connection_id` still owns it.
    fn vacate(&mut self, connection_id: &str, match_id: &str, player_id: &str) -> bool {
        let Some(seats) = self.rooms.get_mut(match_id) else {
            return false;
        };
        if seats.get(player_id).map(String::as_str) == Some(connection_id) {
            seats.remove(player_id);
            true
        } else {
            false
        }
    }
}

/// Membership registry shared by the protocol handler (writer) and the
/// match routers (readers).
#[derive(Debug, Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `connection_id` claims `info`.
    ///
    /// Any seat the connection held before is vacated first. When another
    /// connection holds the requested seat, the new claim wins and the old
    /// occupant loses its client entry.
    pub fn claim(&self, connection_id: &str, info: ClientInfo) -> Claim {
        let mut tables = self.write();
        let mut claim = Claim::default();

        if let Some(previous) = tables.clients.remove(connection_id) {
            if let Some(player) = &previous.player_id {
                tables.vacate(connection_id, &previous.match_id, player);
            }
            claim.previous = Some(previous);
        }

        if let Some(player) = &info.player_id {
            let seats = tables.rooms.entry(info.match_id.clone()).or_default();
            let displaced = seats.insert(player.clone(), connection_id.to_string());

            if let Some(other) = displaced.filter(|other| other != connection_id) {
                if tables
                    .clients
                    .get(&other)
                    .is_some_and(|held| held.holds(&info.match_id, player))
                {
                    tables.clients.remove(&other);
                }
                warn!(
                    match_id = %info.match_id,
                    player = %player,
                    evicted = %other,
                    connection = %connection_id,
                    "Seat taken over by a new connection"
                );
                claim.evicted = Some(other);
            }
        }

        debug!(
            connection = %connection_id,
            match_id = %info.match_id,
            player = ?info.player_id,
            "Claimed"
        );
        tables.clients.insert(connection_id.to_string(), info);

        claim
    }

    /// Forget everything `connection_id` claims.
    ///
    /// Returns the released claim; unknown connections are a no-op.
    pub fn release(&self, connection_id: &str) -> Option<ClientInfo> {
        let mut tables = self.write();
        let info = tables.clients.remove(connection_id)?;

        if let Some(player) = &info.player_id {
            if !tables.vacate(connection_id, &info.match_id, player) {
                trace!(connection = %connection_id, "Seat already superseded");
            }
        }

        debug!(
            connection = %connection_id,
            match_id = %info.match_id,
            player = ?info.player_id,
            "Released"
        );
        Some(info)
    }

    /// Connections currently occupying any seat of `match_id`.
    #[must_use]
    pub fn connections_for(&self, match_id: &str) -> Vec<String> {
        self.read()
            .rooms
            .get(match_id)
            .map(|seats| seats.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Connection currently occupying `player_id` in `match_id`.
    #[must_use]
    pub fn connection_for(&self, match_id: &str, player_id: &str) -> Option<String> {
        self.read()
            .rooms
            .get(match_id)
            .and_then(|seats| seats.get(player_id))
            .cloned()
    }

    /// Occupied seats of `match_id`, in seat order.
    #[must_use]
    pub fn seats(&self, match_id: &str) -> Vec<PlayerId> {
        self.read()
            .rooms
            .get(match_id)
            .map(|seats| seats.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The claim of one connection.
    #[must_use]
    pub fn client(&self, connection_id: &str) -> Option<ClientInfo> {
        self.read().clients.get(connection_id).cloned()
    }

    /// The seat map of one match; `Some(empty)` once everyone left.
    #[must_use]
    pub fn room(&self, match_id: &str) -> Option<Seats> {
        self.read().rooms.get(match_id).cloned()
    }

    /// Copy both tables.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let tables = self.read();
        RegistrySnapshot {
            clients: tables.clients.clone(),
            rooms: tables.rooms.clone(),
        }
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let tables = self.read();
        RegistryStats {
            client_count: tables.clients.len(),
            match_count: tables.rooms.len(),
            occupied_seats: tables.rooms.values().map(BTreeMap::len).sum(),
        }
    }
}
