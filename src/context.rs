//! Shared runtime context.
//!
//! Built once at startup from [`Config`] and handed to the command
//! processor, the event handler and the poller.

use std::time::Duration;

use crate::auth::Authorizer;
use crate::config::{localpart, Config};

/// Static settings every component reads.
#[derive(Debug, Clone)]
pub struct BotContext {
    /// The bot's own user ID.
    pub user_id: String,
    /// Display name derived from the user ID.
    pub bot_name: String,
    /// Prefix that marks a message as a command.
    pub command_prefix: String,
    /// Personality used when a room has no override.
    pub original_prompt: String,
    /// Greeting used until one is stored.
    pub default_greeting: String,
    /// Delay before greeting a room after an invite.
    pub greeting_delay: Duration,
    /// Room admin and super-admin checks.
    pub authorizer: Authorizer,
}

impl BotContext {
    /// Build the context from a validated configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            user_id: config.bot.user_id.clone(),
            bot_name: config.bot.name().to_string(),
            command_prefix: config.bot.command_prefix(),
            original_prompt: config.bot.original_prompt.clone(),
            default_greeting: config.bot.greeting(),
            greeting_delay: Duration::from_secs(config.bot.greeting_delay_secs),
            authorizer: Authorizer::new(config.bot.super_admins.iter().cloned()),
        }
    }

    /// Short display name for a user ID (`@alice:example.org` -> `alice`).
    pub fn username(user_id: &str) -> &str {
        localpart(user_id)
    }

    /// Text after the command prefix, if `body` is a command.
    ///
    /// The prefix must be followed by whitespace or end the message, so
    /// `!edubot` does not match the prefix `!edu`.
    pub fn strip_command_prefix<'a>(&self, body: &'a str) -> Option<&'a str> {
        let rest = body.trim_start().strip_prefix(&self.command_prefix)?;
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            Some(rest.trim())
        } else {
            None
        }
    }
}
