//! Command parser.
//!
//! Input is whatever follows the command prefix. Tokens are split on
//! whitespace with empty tokens dropped; the first token is the verb and is
//! matched case-sensitively.

use crate::auth::AccessLevel;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// No verb at all.
    Empty,
    /// Show the help text.
    Help,
    /// Toggle hiding of unprompted replies in threads.
    Threads,
    /// Show (`None`) or replace the room personality.
    Personality(Option<String>),
    /// Subscribe the room to a feed URL.
    Subscribe(String),
    /// Unsubscribe the room from a feed URL.
    Unsubscribe(String),
    /// List the room's feeds.
    Feeds,
    /// Make a user a room admin.
    Add(String),
    /// Revoke a user's room admin rights.
    Remove(String),
    /// List room admins.
    Admins,
    /// Show (`None`) or set the interjection odds, as raw text.
    Interject(Option<String>),
    /// Show (`None`) or replace the greeting.
    Greeting(Option<String>),
    /// A known verb missing its required argument.
    Incomplete(&'static str),
    /// An unrecognized verb.
    Unknown(String),
}

impl Command {
    /// Get the command name.
    pub fn name(&self) -> &str {
        match self {
            Command::Empty => "",
            Command::Help => "help",
            Command::Threads => "threads",
            Command::Personality(_) => "personality",
            Command::Subscribe(_) => "subscribe",
            Command::Unsubscribe(_) => "unsubscribe",
            Command::Feeds => "feeds",
            Command::Add(_) => "add",
            Command::Remove(_) => "remove",
            Command::Admins => "admins",
            Command::Interject(_) => "interject",
            Command::Greeting(_) => "greeting",
            Command::Incomplete(verb) => *verb,
            Command::Unknown(verb) => verb.as_str(),
        }
    }

    /// Rights needed to run this command.
    ///
    /// Unknown and incomplete verbs are still gated so that non-admins learn
    /// nothing beyond the permission denial.
    pub fn access_level(&self) -> AccessLevel {
        match self {
            Command::Empty | Command::Help => AccessLevel::Anyone,
            Command::Greeting(_) => AccessLevel::SuperAdmin,
            _ => AccessLevel::RoomAdmin,
        }
    }
}

/// Parse command text (without the prefix).
pub fn parse(input: &str) -> Command {
    let mut tokens = input.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Command::Empty;
    };
    let args: Vec<&str> = tokens.collect();
    let first = args.first().map(|arg| arg.to_string());
    let text = (!args.is_empty()).then(|| args.join(" "));

    match verb {
        "help" => Command::Help,
        "threads" => Command::Threads,
        "personality" => Command::Personality(text),
        "subscribe" => first.map_or(Command::Incomplete("subscribe"), Command::Subscribe),
        "unsubscribe" => first.map_or(Command::Incomplete("unsubscribe"), Command::Unsubscribe),
        "feeds" => Command::Feeds,
        "add" => first.map_or(Command::Incomplete("add"), Command::Add),
        "remove" => first.map_or(Command::Incomplete("remove"), Command::Remove),
        "admins" => Command::Admins,
        "interject" => Command::Interject(first),
        "greeting" => Command::Greeting(text),
        other => Command::Unknown(other.to_string()),
    }
}
