//! Command processor.
//!
//! Turns command text into an authorized store mutation or query and a reply.
//! Every failure a user can cause ends in a specific reply with no state
//! change; storage failures end in a generic reply and an error log.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::help::format_help;
use super::parser::{parse, Command};
use crate::context::BotContext;
use crate::db::SettingsStore;
use crate::rss::FeedSource;
use crate::transport::MembershipLookup;
use crate::{BotError, Result};

/// Largest accepted value for `interject N`.
pub const MAX_INTERJECT_ODDS: i64 = 10_000;

/// Reply shown when a storage call fails mid-command.
pub const GENERIC_ERROR_REPLY: &str = "Sorry, something went wrong while running that command.";

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text.
    pub body: String,
    /// Whether `body` should be rendered as markdown.
    pub markdown: bool,
}

impl Reply {
    /// A markdown reply.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            markdown: true,
        }
    }

    /// A reply sent verbatim.
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            markdown: false,
        }
    }
}

/// Executes room administration commands.
pub struct CommandProcessor<S, M, F> {
    ctx: Arc<BotContext>,
    store: S,
    members: M,
    feeds: F,
}

impl<S, M, F> CommandProcessor<S, M, F>
where
    S: SettingsStore,
    M: MembershipLookup,
    F: FeedSource,
{
    /// Create a new processor.
    pub fn new(ctx: Arc<BotContext>, store: S, members: M, feeds: F) -> Self {
        Self {
            ctx,
            store,
            members,
            feeds,
        }
    }

    /// Run the command in `text` (prefix already removed) for `sender` in `room`.
    pub async fn process(&self, room: &str, sender: &str, text: &str) -> Reply {
        let command = parse(text);
        debug!(room_id = room, sender, command = command.name(), "Processing command");

        match self.execute(room, sender, &command).await {
            Ok(reply) => reply,
            Err(BotError::Permission(e)) => {
                info!(room_id = room, sender, command = command.name(), "Denied: {}", e);
                Reply::text(no_permission(sender))
            }
            Err(e) => {
                error!(room_id = room, command = command.name(), "Command failed: {}", e);
                Reply::text(GENERIC_ERROR_REPLY)
            }
        }
    }

    async fn execute(&self, room: &str, sender: &str, command: &Command) -> Result<Reply> {
        self.ctx
            .authorizer
            .require(&self.store, room, sender, command.access_level())
            .await?;

        match command {
            Command::Empty
            | Command::Help
            | Command::Incomplete(_)
            | Command::Unknown(_) => Ok(self.help()),
            Command::Threads => self.toggle_threads(room).await,
            Command::Personality(text) => self.personality(room, text.as_deref()).await,
            Command::Subscribe(url) => self.subscribe(room, url).await,
            Command::Unsubscribe(url) => self.unsubscribe(room, url).await,
            Command::Feeds => self.list_feeds(room).await,
            Command::Add(user) => self.add_admin(room, user).await,
            Command::Remove(user) => self.remove_admin(room, sender, user).await,
            Command::Admins => self.list_admins(room).await,
            Command::Interject(odds) => self.interject(room, odds.as_deref()).await,
            Command::Greeting(text) => self.greeting(text.as_deref()).await,
        }
    }

    fn help(&self) -> Reply {
        Reply::text(format_help(&self.ctx.command_prefix))
    }

    /// Live member snapshot. Lookup failures count as an empty room, so
    /// membership-dependent commands fail closed.
    async fn members_of(&self, room: &str) -> Vec<String> {
        match self.members.joined_members(room).await {
            Ok(members) => members,
            Err(e) => {
                warn!(room_id = room, "Could not get room members: {}", e);
                Vec::new()
            }
        }
    }

    async fn toggle_threads(&self, room: &str) -> Result<Reply> {
        let hidden = self.store.toggle_hide_in_threads(room).await?;
        let body = if hidden {
            "I will no longer reply unprompted inside threads."
        } else {
            "I will reply unprompted inside threads again."
        };
        Ok(Reply::text(body))
    }

    async fn personality(&self, room: &str, text: Option<&str>) -> Result<Reply> {
        match text {
            None => {
                let stored = self.store.get_personality(room).await?;
                let current = if stored.is_empty() {
                    self.ctx.original_prompt.as_str()
                } else {
                    stored.as_str()
                };
                Ok(Reply::plain(format!("Current personality:\n{current}")))
            }
            Some(text) => {
                self.store.set_personality(room, text).await?;
                info!(room_id = room, "Personality changed");
                Ok(Reply::plain(format!("New Personality:\n{text}")))
            }
        }
    }

    async fn subscribe(&self, room: &str, url: &str) -> Result<Reply> {
        let already = self.store.list_room_feeds(room).await?;
        if already.iter().any(|feed| feed == url) {
            return Ok(Reply::text(
                "The room is already subscribed to this RSS feed!",
            ));
        }

        if let Err(e) = self.feeds.fetch(url).await {
            debug!(room_id = room, url, "Rejected feed: {}", e);
            return Ok(Reply::text(format!("'{url}' is not a valid RSS feed.")));
        }

        if !self.store.add_feed_subscription(room, url).await? {
            return Ok(Reply::text(
                "The room is already subscribed to this RSS feed!",
            ));
        }
        info!(room_id = room, url, "Subscribed to feed");
        Ok(Reply::text(format!(
            "Subscribed to {url}! I'll send new updates to the room."
        )))
    }

    async fn unsubscribe(&self, room: &str, url: &str) -> Result<Reply> {
        if !self.store.remove_feed_subscription(room, url).await? {
            return Ok(Reply::text(format!(
                "This room is not subscribed to {url}."
            )));
        }
        info!(room_id = room, url, "Unsubscribed from feed");
        Ok(Reply::text(format!("Unsubscribed from {url}.")))
    }

    async fn list_feeds(&self, room: &str) -> Result<Reply> {
        let feeds = self.store.list_room_feeds(room).await?;
        if feeds.is_empty() {
            return Ok(Reply::text(
                "This room is not subscribed to any RSS feeds.",
            ));
        }
        Ok(Reply::plain(format!("RSS subscriptions:\n{}", feeds.join("\n"))))
    }

    async fn add_admin(&self, room: &str, user: &str) -> Result<Reply> {
        let members = self.members_of(room).await;
        if !members.iter().any(|member| member == user) {
            return Ok(Reply::text(format!("User {user} is not in this room!")));
        }
        if self.store.is_room_admin(room, user).await? {
            return Ok(Reply::text(format!(
                "{user} is already an admin in this room!"
            )));
        }

        self.store.set_room_admin(room, user).await?;
        info!(room_id = room, user, "Added room admin");
        Ok(Reply::text(format!("{user} is now an admin in this room!")))
    }

    /// Checks run in a fixed order and the first failure wins: not an admin,
    /// only admin, not a member, removing oneself.
    async fn remove_admin(&self, room: &str, sender: &str, user: &str) -> Result<Reply> {
        let admins = self.store.list_room_admins(room).await?;
        if !admins.iter().any(|admin| admin == user) {
            return Ok(Reply::text(format!("{user} is not an admin in this room!")));
        }
        if admins.len() <= 1 {
            return Ok(Reply::text(format!(
                "{user} is the only admin in this room and cannot be removed."
            )));
        }

        let members = self.members_of(room).await;
        if !members.iter().any(|member| member == user) {
            return Ok(Reply::text(format!("{user} is not a member of this room!")));
        }
        if user == sender {
            return Ok(Reply::text("You cannot revoke your own admin permissions!"));
        }

        self.store.remove_room_admin(room, user).await?;
        info!(room_id = room, user, "Removed room admin");
        Ok(Reply::text(format!("{user} is no longer an admin in this room.")))
    }

    async fn list_admins(&self, room: &str) -> Result<Reply> {
        let admins = self.store.list_room_admins(room).await?;
        if admins.is_empty() {
            return Ok(Reply::text("There are no admins in this room."));
        }
        Ok(Reply::plain(format!("Admins in this room: {}", admins.join(" "))))
    }

    async fn interject(&self, room: &str, odds: Option<&str>) -> Result<Reply> {
        let Some(raw) = odds else {
            let probability = self.store.get_interject_odds(room).await?;
            return Ok(Reply::text(describe_odds(probability)));
        };

        let odds = match parse_odds(raw) {
            Ok(odds) => odds,
            Err(message) => return Ok(Reply::text(message)),
        };

        let probability = odds_to_probability(odds);
        self.store.set_interject_odds(room, probability).await?;
        info!(room_id = room, odds, "Interject odds changed");

        if odds == 0 {
            Ok(Reply::text("Interjecting is now disabled in this room."))
        } else {
            Ok(Reply::text(format!(
                "I will now interject in roughly 1 in {odds} messages."
            )))
        }
    }

    async fn greeting(&self, text: Option<&str>) -> Result<Reply> {
        match text {
            None => {
                let greeting = self
                    .store
                    .get_greeting()
                    .await?
                    .unwrap_or_else(|| self.ctx.default_greeting.clone());
                Ok(Reply::plain(format!("Current greeting:\n{greeting}")))
            }
            Some(text) => {
                self.store.set_greeting(text).await?;
                info!("Greeting changed");
                Ok(Reply::text("New greeting set!"))
            }
        }
    }
}

/// The fixed denial reply.
pub fn no_permission(sender: &str) -> String {
    format!(
        "Sorry {}, you don't have permission to use this command!",
        BotContext::username(sender)
    )
}

/// Parse user input for `interject`. Errors are the user-facing reply.
fn parse_odds(raw: &str) -> std::result::Result<i64, String> {
    let odds: i64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a whole number."))?;
    if !(0..=MAX_INTERJECT_ODDS).contains(&odds) {
        return Err(format!(
            "The odds must be between 0 and {MAX_INTERJECT_ODDS}."
        ));
    }
    Ok(odds)
}

/// `1 in N` as a probability. Zero disables interjecting.
fn odds_to_probability(odds: i64) -> f64 {
    if odds == 0 {
        0.0
    } else {
        1.0 / odds as f64
    }
}

/// Human-readable form of a stored probability.
fn describe_odds(probability: f64) -> String {
    if probability <= 0.0 || !probability.is_finite() {
        return "Interjecting is disabled in this room.".to_string();
    }
    let n = (1.0 / probability).round() as i64;
    format!("I interject in roughly 1 in ~{n} messages.")
}
