//! Chat transport interfaces.
//!
//! The core never talks to a chat network directly. It asks a
//! [`MembershipLookup`] who is in a room and hands finished messages to a
//! [`Notifier`].

mod console;

pub use console::{ConsoleEvent, ConsoleTransport};

use std::future::Future;

use crate::Result;

/// A message to deliver to a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Target room.
    pub room_id: String,
    /// Message text.
    pub body: String,
    /// Send as a notice (automated, non-conversational).
    pub notice: bool,
    /// Render `body` as markdown.
    pub markdown: bool,
    /// Event this message replies to.
    pub reply_to: Option<String>,
}

impl OutgoingMessage {
    /// A plain text message with markdown rendering on.
    pub fn text(room_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            body: body.into(),
            notice: false,
            markdown: true,
            reply_to: None,
        }
    }

    /// A notice with markdown rendering on.
    pub fn notice(room_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            notice: true,
            ..Self::text(room_id, body)
        }
    }

    /// Turn markdown rendering on or off.
    pub fn with_markdown(mut self, markdown: bool) -> Self {
        self.markdown = markdown;
        self
    }

    /// Reply to the given event.
    pub fn in_reply_to(mut self, event_id: Option<String>) -> Self {
        self.reply_to = event_id;
        self
    }
}

/// A text message received from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Room the message was sent in.
    pub room_id: String,
    /// Sender user ID.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// Transport event ID, used as a reply target.
    pub event_id: Option<String>,
    /// Whether the message was posted inside a thread.
    pub in_thread: bool,
}

impl InboundMessage {
    /// A top-level message without an event ID.
    pub fn new(
        room_id: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room_id: room_id.into(),
            sender: sender.into(),
            body: body.into(),
            event_id: None,
            in_thread: false,
        }
    }
}

/// Looks up the current members of a room.
pub trait MembershipLookup: Send + Sync + Clone + 'static {
    /// User IDs currently joined to `room`.
    fn joined_members(&self, room: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Delivers messages to rooms.
pub trait Notifier: Send + Sync + Clone + 'static {
    /// Deliver one message.
    fn send(&self, message: OutgoingMessage) -> impl Future<Output = Result<()>> + Send;
}
