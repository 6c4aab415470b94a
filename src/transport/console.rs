//! Line-oriented development transport.
//!
//! Reads events from text lines and writes outgoing messages to any async
//! writer (stdout in the binary). Membership is learned from the events it
//! sees: anyone who speaks in or invites to a room is a member of it.
//!
//! Line formats:
//!
//! ```text
//! <room> <sender> <text...>
//! /thread <room> <sender> <text...>
//! /invite <room> <inviter> [creator]
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{InboundMessage, MembershipLookup, Notifier, OutgoingMessage};
use crate::{BotError, Result};

/// An event parsed from one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A room message.
    Message(InboundMessage),
    /// The bot was invited to a room.
    Invite {
        room_id: String,
        inviter: String,
        creator: Option<String>,
    },
}

impl ConsoleEvent {
    /// Parse a line. Blank and malformed lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("/invite ") {
            let mut parts = rest.split_whitespace();
            let room_id = parts.next()?.to_string();
            let inviter = parts.next()?.to_string();
            let creator = parts.next().map(str::to_string);
            return Some(ConsoleEvent::Invite {
                room_id,
                inviter,
                creator,
            });
        }

        let (in_thread, rest) = match line.strip_prefix("/thread ") {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (room_id, rest) = rest.split_once(char::is_whitespace)?;
        let (sender, body) = rest.trim_start().split_once(char::is_whitespace)?;
        let body = body.trim();
        if body.is_empty() {
            return None;
        }

        let mut message = InboundMessage::new(room_id, sender, body);
        message.in_thread = in_thread;
        Some(ConsoleEvent::Message(message))
    }
}

type SharedWriter = Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// Console transport implementing [`MembershipLookup`] and [`Notifier`].
#[derive(Clone)]
pub struct ConsoleTransport {
    bot_user_id: String,
    members: Arc<Mutex<HashMap<String, BTreeSet<String>>>>,
    writer: SharedWriter,
    next_event: Arc<Mutex<u64>>,
}

impl ConsoleTransport {
    /// Transport writing to stdout.
    pub fn stdout(bot_user_id: impl Into<String>) -> Self {
        Self::with_writer(bot_user_id, tokio::io::stdout())
    }

    /// Transport writing to `writer`.
    pub fn with_writer<W>(bot_user_id: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            bot_user_id: bot_user_id.into(),
            members: Arc::new(Mutex::new(HashMap::new())),
            writer: Arc::new(tokio::sync::Mutex::new(Box::new(writer))),
            next_event: Arc::new(Mutex::new(0)),
        }
    }

    /// Record membership implied by `event` and give messages an event ID.
    pub fn observe(&self, event: &mut ConsoleEvent) {
        match event {
            ConsoleEvent::Message(message) => {
                self.join(&message.room_id, &message.sender);
                message.event_id = Some(self.next_event_id());
            }
            ConsoleEvent::Invite {
                room_id,
                inviter,
                creator,
            } => {
                self.join(room_id, inviter);
                if let Some(creator) = creator {
                    self.join(room_id, creator);
                }
                let bot = self.bot_user_id.clone();
                self.join(room_id, &bot);
            }
        }
    }

    /// Add `user` to the members of `room`.
    pub fn join(&self, room: &str, user: &str) {
        if let Ok(mut members) = self.members.lock() {
            members
                .entry(room.to_string())
                .or_default()
                .insert(user.to_string());
        }
    }

    fn next_event_id(&self) -> String {
        let mut next = match self.next_event.lock() {
            Ok(next) => next,
            Err(poisoned) => poisoned.into_inner(),
        };
        *next += 1;
        format!("$console{}", *next)
    }
}

impl std::fmt::Debug for ConsoleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleTransport")
            .field("bot_user_id", &self.bot_user_id)
            .finish()
    }
}

impl MembershipLookup for ConsoleTransport {
    async fn joined_members(&self, room: &str) -> Result<Vec<String>> {
        let members = self
            .members
            .lock()
            .map_err(|_| BotError::Transport("membership table poisoned".to_string()))?;
        Ok(members
            .get(room)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

impl Notifier for ConsoleTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        debug!(room_id = %message.room_id, notice = message.notice, "Sending message");
        let kind = if message.notice { "notice" } else { "message" };
        let mut line = format!("[{}] {}", message.room_id, kind);
        if let Some(reply_to) = &message.reply_to {
            line.push_str(&format!(" (reply to {reply_to})"));
        }
        line.push_str(":\n");
        line.push_str(&message.body);
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| BotError::Transport(format!("failed to write message: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| BotError::Transport(format!("failed to flush output: {e}")))?;
        Ok(())
    }
}
