//! # seatsync-protocol
//!
//! Wire protocol for the Seatsync match session layer.
//!
//! ## Frame Types
//!
//! - `Sync` - Claim a seat (or spectate) and fetch the match state
//! - `Update` - Submit a game action for the claimed seat
//! - `Chat` - Relay a message to everyone in the match
//! - `Emit` / `Error` - Server events and rejections
//!
//! ## Example
//!
//! ```rust
//! use seatsync_protocol::{codec, Frame};
//!
//! let frame = Frame::sync("match-1", "0", Some("secret".into()), 2);
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{Frame, FrameType, PROTOCOL_VERSION};
