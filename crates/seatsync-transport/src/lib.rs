//! # seatsync-transport
//!
//! Connection abstraction for the Seatsync session layer.
//!
//! - **WebSocket** - axum-upgraded sockets, MessagePack or JSON frames
//! - **Memory** - in-process pairs for tests and embedded clients
//!
//! ```rust,ignore
//! use seatsync_transport::Connection;
//!
//! async fn pump(mut conn: impl Connection) {
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Dispatch frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryConnection, MemoryPeer};
pub use traits::{Connection, ConnectionId, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnection;
