//! # seatsync-core
//!
//! Match membership and routing for the Seatsync session layer.
//!
//! - **Registry** - Which connection claims which match and seat
//! - **Hub** - Live sockets and their match groups
//! - **MatchRouter** - Seat-addressed delivery for one match
//! - **ProtocolHandler** - Applies `sync`/`update`/`chat`/`disconnect` events
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌─────────────┐
//! │  Connection │────▶│ ProtocolHandler │────▶│  Registry   │
//! └─────────────┘     └─────────────────┘     └─────────────┘
//!                              │                     ▲
//!                              ▼                     │
//!                     ┌─────────────────┐     ┌─────────────┐
//!                     │   GameMaster    │────▶│ MatchRouter │──▶ Hub
//!                     └─────────────────┘     └─────────────┘
//! ```

pub mod auth;
pub mod event;
pub mod group;
pub mod handler;
pub mod hub;
pub mod master;
pub mod message;
pub mod registry;
pub mod router;

pub use auth::{AllowAll, Authenticator, CredentialStore, SeatClaim};
pub use event::{ChatRequest, ConnectionChange, Event, SyncRequest, UpdateRequest};
pub use group::{InMemoryRoomAdapter, RoomAdapter};
pub use handler::{HandlerError, ProtocolHandler};
pub use hub::{Hub, Socket};
pub use master::{GameMaster, LogMaster, MasterError, MatchState};
pub use message::{Inbox, Message, Outbox};
pub use registry::{ClientInfo, MatchId, PlayerId, Registry, RegistrySnapshot};
pub use router::MatchRouter;
