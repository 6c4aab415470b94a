//! Chat event handling.
//!
//! [`Bot`] routes room messages to the command processor or decides whether
//! to answer them, and sets up rooms the bot is invited to.

use std::sync::Arc;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command::CommandProcessor;
use crate::context::BotContext;
use crate::db::SettingsStore;
use crate::rss::FeedSource;
use crate::transport::{InboundMessage, MembershipLookup, Notifier, OutgoingMessage};
use crate::Result;

/// Rooms with at most this many members are treated as direct chats.
pub const DIRECT_CHAT_MAX_MEMBERS: usize = 2;

/// A request for the text-generation engine to answer a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Room to answer in.
    pub room_id: String,
    /// Personality prompt: the room override or the configured default.
    pub personality: String,
    /// Event the answer should reply to.
    pub reply_to: Option<String>,
}

/// Whether `body` mentions the bot by name, ignoring case.
pub fn mentions(body: &str, bot_name: &str) -> bool {
    !bot_name.is_empty() && body.to_lowercase().contains(&bot_name.to_lowercase())
}

/// Response rule for ordinary messages.
///
/// Answer when mentioned, in direct chats, or when `draw` (uniform in
/// `[0, 1)`) falls below the room's interjection odds. An unknown member
/// count never counts as a direct chat.
pub fn should_respond(mentioned: bool, member_count: Option<usize>, odds: f64, draw: f64) -> bool {
    mentioned
        || member_count.is_some_and(|count| count <= DIRECT_CHAT_MAX_MEMBERS)
        || draw < odds
}

/// Handles room events for one bot account.
pub struct Bot<S, M, F, N> {
    ctx: Arc<BotContext>,
    store: S,
    members: M,
    notifier: N,
    processor: CommandProcessor<S, M, F>,
    greetings: Mutex<JoinSet<()>>,
}

impl<S, M, F, N> Bot<S, M, F, N>
where
    S: SettingsStore,
    M: MembershipLookup,
    F: FeedSource,
    N: Notifier,
{
    /// Create a new event handler.
    pub fn new(ctx: Arc<BotContext>, store: S, members: M, feeds: F, notifier: N) -> Self {
        let processor =
            CommandProcessor::new(Arc::clone(&ctx), store.clone(), members.clone(), feeds);
        Self {
            ctx,
            store,
            members,
            notifier,
            processor,
            greetings: Mutex::new(JoinSet::new()),
        }
    }

    /// The command processor used for prefixed messages.
    pub fn processor(&self) -> &CommandProcessor<S, M, F> {
        &self.processor
    }

    /// Handle a room message.
    ///
    /// Commands are answered directly. For other messages, returns a
    /// completion request when the bot should answer.
    pub async fn on_message(&self, message: &InboundMessage) -> Result<Option<CompletionRequest>> {
        if message.sender == self.ctx.user_id {
            return Ok(None);
        }
        let room = message.room_id.as_str();

        if let Some(text) = self.ctx.strip_command_prefix(&message.body) {
            let reply = self.processor.process(room, &message.sender, text).await;
            let outgoing = OutgoingMessage::text(room, reply.body)
                .with_markdown(reply.markdown)
                .in_reply_to(message.event_id.clone());
            if let Err(e) = self.notifier.send(outgoing).await {
                warn!(room_id = room, "Failed to send command reply: {}", e);
            }
            return Ok(None);
        }

        let mentioned = mentions(&message.body, &self.ctx.bot_name);
        if message.in_thread && !mentioned && self.store.get_hide_in_threads(room).await? {
            debug!(room_id = room, "Staying quiet in thread");
            return Ok(None);
        }

        let respond = mentioned || {
            let member_count = match self.members.joined_members(room).await {
                Ok(members) => Some(members.len()),
                Err(e) => {
                    warn!(room_id = room, "Could not get room members: {}", e);
                    None
                }
            };
            let odds = self.store.get_interject_odds(room).await?;
            let draw: f64 = rand::rng().random();
            should_respond(false, member_count, odds, draw)
        };
        if !respond {
            return Ok(None);
        }

        let stored = self.store.get_personality(room).await?;
        let personality = if stored.is_empty() {
            self.ctx.original_prompt.clone()
        } else {
            stored
        };
        Ok(Some(CompletionRequest {
            room_id: room.to_string(),
            personality,
            reply_to: message.event_id.clone(),
        }))
    }

    /// Handle an invite: the inviter, and the room creator when known and
    /// different, become room admins, and the room is greeted after the
    /// configured delay.
    pub async fn on_invite(&self, room: &str, inviter: &str, creator: Option<&str>) -> Result<()> {
        self.store.set_room_admin(room, inviter).await?;
        if let Some(creator) = creator.filter(|creator| *creator != inviter) {
            self.store.set_room_admin(room, creator).await?;
        }
        info!(room_id = room, inviter, "Joined room");

        let greeting = self
            .store
            .get_greeting()
            .await?
            .unwrap_or_else(|| self.ctx.default_greeting.clone());
        let notifier = self.notifier.clone();
        let delay = self.ctx.greeting_delay;
        let room = room.to_string();

        let mut greetings = self.greetings.lock().await;
        // Reap greetings that already went out.
        while greetings.try_join_next().is_some() {}
        greetings.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = notifier.send(OutgoingMessage::text(&room, greeting)).await {
                warn!(room_id = %room, "Failed to send greeting: {}", e);
            }
        });
        Ok(())
    }

    /// Greetings scheduled but not yet reaped.
    pub async fn pending_greetings(&self) -> usize {
        self.greetings.lock().await.len()
    }

    /// Cancel pending greetings and wait for their tasks to end.
    pub async fn shutdown(&self) {
        let mut greetings = self.greetings.lock().await;
        if !greetings.is_empty() {
            debug!("Cancelling {} pending greeting(s)", greetings.len());
        }
        greetings.shutdown().await;
    }
}
