//! Help text.

/// Command information for help display.
pub struct CommandInfo {
    /// Arguments after the verb.
    pub syntax: &'static str,
    /// What the command does.
    pub description: &'static str,
}

const ROOM_ADMIN_COMMANDS: &[CommandInfo] = &[
    CommandInfo {
        syntax: "help",
        description: "Show this help text.",
    },
    CommandInfo {
        syntax: "personality [new personality]",
        description: "Change or print the personality of the bot.",
    },
    CommandInfo {
        syntax: "interject [N]",
        description: "Reply unprompted to roughly 1 in N messages (0 disables). \
                      Without N, show the current odds.",
    },
    CommandInfo {
        syntax: "threads",
        description: "Toggle unprompted replies inside threads.",
    },
    CommandInfo {
        syntax: "subscribe {url}",
        description: "Subscribe to an RSS feed.",
    },
    CommandInfo {
        syntax: "unsubscribe {url}",
        description: "Unsubscribe from an RSS feed.",
    },
    CommandInfo {
        syntax: "feeds",
        description: "List subscribed RSS feeds.",
    },
    CommandInfo {
        syntax: "add {user_id}",
        description: "Make a user an admin in this room.",
    },
    CommandInfo {
        syntax: "remove {user_id}",
        description: "Revoke a user's admin rights in this room.",
    },
    CommandInfo {
        syntax: "admins",
        description: "List who is an admin in this room.",
    },
];

const SUPER_ADMIN_COMMANDS: &[CommandInfo] = &[CommandInfo {
    syntax: "greeting [msg]",
    description: "Change the bot's greeting. Without msg, show the current greeting.",
}];

/// Format the help message (markdown) for the given command prefix.
pub fn format_help(prefix: &str) -> String {
    let mut lines = vec!["**Room admin commands:**".to_string()];
    for info in ROOM_ADMIN_COMMANDS {
        lines.push(format!("`{} {}` {}", prefix, info.syntax, info.description));
    }
    lines.push(String::new());
    lines.push("**Super admin commands:**".to_string());
    for info in SUPER_ADMIN_COMMANDS {
        lines.push(format!("`{} {}` {}", prefix, info.syntax, info.description));
    }
    lines.join("\n")
}
