//! Outbound emissions.
//!
//! A [`Message`] is a named event with positional arguments. Messages are
//! shared behind `Arc` so a broadcast clones a pointer per recipient.

use seatsync_protocol::Frame;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sending half of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedSender<Arc<Message>>;

/// Receiving half of a connection's outbound queue.
pub type Inbox = mpsc::UnboundedReceiver<Arc<Message>>;

/// A named event for delivery to one or more connections.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Event name.
    pub event: String,
    /// Positional arguments.
    pub args: Vec<Value>,
}

impl Message {
    /// Create a new message.
    #[must_use]
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Wire frame for this message.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        Frame::emit(self.event.clone(), self.args.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_builder() {
        let msg = Message::new("sync", vec![]).arg("matchID").arg(json!({"turn": 1}));

        assert_eq!(msg.event, "sync");
        assert_eq!(msg.args, vec![json!("matchID"), json!({"turn": 1})]);
        assert_eq!(
            msg.to_frame(),
            Frame::emit("sync", vec![json!("matchID"), json!({"turn": 1})])
        );
    }
}
