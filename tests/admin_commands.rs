//! Command processor tests against an in-memory store.

#![cfg(feature = "sqlite")]

mod common;

use std::time::Duration;

use common::*;
use roomwarden::command::{no_permission, CommandProcessor, GENERIC_ERROR_REPLY};
use roomwarden::rss::ParsedItem;
use roomwarden::{SettingsStore, SqliteStore};

const FEED: &str = "https://news.example.com/feed.xml";

struct Fixture {
    store: SqliteStore,
    transport: MockTransport,
    feeds: MockFeedSource,
    processor: CommandProcessor<SqliteStore, MockTransport, MockFeedSource>,
}

/// Room with `U1` as the only admin and `U1`, `U2` as members.
async fn setup() -> Fixture {
    let store = setup_store().await;
    store.set_room_admin(ROOM, U1).await.unwrap();

    let transport = MockTransport::new();
    transport.join(ROOM, &[BOT, U1, U2]);
    let feeds = MockFeedSource::new();
    let processor = CommandProcessor::new(
        test_context(&[ROOT], Duration::ZERO),
        store.clone(),
        transport.clone(),
        feeds.clone(),
    );
    Fixture {
        store,
        transport,
        feeds,
        processor,
    }
}

impl Fixture {
    async fn run(&self, sender: &str, text: &str) -> String {
        self.processor.process(ROOM, sender, text).await.body
    }

    async fn admins(&self) -> Vec<String> {
        self.store.list_room_admins(ROOM).await.unwrap()
    }
}

#[tokio::test]
async fn test_remove_admin_scenario() {
    let fx = setup().await;

    // U2 is not an admin at all.
    assert_eq!(fx.run(U2, &format!("remove {U1}")).await, no_permission(U2));
    assert_eq!(fx.admins().await, vec![U1]);

    // U1 is the only admin; that check comes before the self-removal check.
    assert_eq!(
        fx.run(U1, &format!("remove {U1}")).await,
        format!("{U1} is the only admin in this room and cannot be removed.")
    );
    assert_eq!(fx.admins().await, vec![U1]);

    assert_eq!(
        fx.run(U1, &format!("add {U2}")).await,
        format!("{U2} is now an admin in this room!")
    );
    assert_eq!(fx.admins().await, vec![U1, U2]);

    // With a second admin present, removing oneself is still refused.
    assert_eq!(
        fx.run(U1, &format!("remove {U1}")).await,
        "You cannot revoke your own admin permissions!"
    );
    assert_eq!(fx.admins().await, vec![U1, U2]);

    assert_eq!(
        fx.run(U2, &format!("remove {U1}")).await,
        format!("{U1} is no longer an admin in this room.")
    );
    assert_eq!(fx.admins().await, vec![U2]);
}

#[tokio::test]
async fn test_remove_check_order() {
    let fx = setup().await;
    fx.store.set_room_admin(ROOM, U3).await.unwrap();

    // Not an admin wins over not a member.
    assert_eq!(
        fx.run(U1, "remove @ghost:example.org").await,
        "@ghost:example.org is not an admin in this room!"
    );

    // U3 is an admin but left the room.
    assert_eq!(
        fx.run(U1, &format!("remove {U3}")).await,
        format!("{U3} is not a member of this room!")
    );
    assert_eq!(fx.admins().await, vec![U1, U3]);

    // Only admin wins over not a member.
    fx.store.remove_room_admin(ROOM, U1).await.unwrap();
    assert_eq!(
        fx.run(ROOT, &format!("remove {U3}")).await,
        format!("{U3} is the only admin in this room and cannot be removed.")
    );
    assert_eq!(fx.admins().await, vec![U3]);
}

#[tokio::test]
async fn test_add_admin_requires_membership() {
    let fx = setup().await;

    assert_eq!(
        fx.run(U1, &format!("add {U3}")).await,
        format!("User {U3} is not in this room!")
    );
    assert_eq!(fx.admins().await, vec![U1]);

    assert_eq!(
        fx.run(U1, &format!("add {U1}")).await,
        format!("{U1} is already an admin in this room!")
    );
}

#[tokio::test]
async fn test_membership_failure_fails_closed() {
    let fx = setup().await;
    fx.transport.break_membership();

    assert_eq!(
        fx.run(U1, &format!("add {U2}")).await,
        format!("User {U2} is not in this room!")
    );
    assert_eq!(fx.admins().await, vec![U1]);
}

#[tokio::test]
async fn test_help_is_open_to_everyone() {
    let fx = setup().await;

    let help = fx.run(U3, "help").await;
    assert!(help.contains("`!edu subscribe {url}`"));
    assert_eq!(fx.run(U3, "").await, help);

    // Other verbs are gated, even unknown ones.
    assert_eq!(fx.run(U3, "admins").await, no_permission(U3));
    assert_eq!(fx.run(U3, "frobnicate").await, no_permission(U3));
}

#[tokio::test]
async fn test_unknown_and_incomplete_show_help() {
    let fx = setup().await;
    let help = fx.run(U1, "help").await;

    assert_eq!(fx.run(U1, "frobnicate").await, help);
    assert_eq!(fx.run(U1, "Help").await, help);
    assert_eq!(fx.run(U1, "add").await, help);
    assert_eq!(fx.run(U1, "subscribe").await, help);
}

#[tokio::test]
async fn test_list_admins() {
    let fx = setup().await;
    fx.store.set_room_admin(ROOM, U2).await.unwrap();
    let reply = fx.processor.process(ROOM, U1, "admins").await;
    assert_eq!(reply.body, format!("Admins in this room: {U1} {U2}"));
}

#[tokio::test]
async fn test_super_admin_rights() {
    let fx = setup().await;

    // Super-admins administer every room without a room_admin row.
    assert_eq!(
        fx.run(ROOT, "admins").await,
        format!("Admins in this room: {U1}")
    );

    // Greeting needs both tiers; a room admin alone is refused.
    assert_eq!(fx.run(U1, "greeting Welcome!").await, no_permission(U1));
    assert!(fx.store.get_greeting().await.unwrap().is_none());

    assert_eq!(
        fx.run(ROOT, "greeting").await,
        "Current greeting:\nHi, my name is edu!"
    );
    assert_eq!(fx.run(ROOT, "greeting Welcome,   class!").await, "New greeting set!");
    assert_eq!(
        fx.store.get_greeting().await.unwrap().as_deref(),
        Some("Welcome, class!")
    );
    assert_eq!(
        fx.run(ROOT, "greeting").await,
        "Current greeting:\nWelcome, class!"
    );
}

#[tokio::test]
async fn test_personality() {
    let fx = setup().await;

    let reply = fx.processor.process(ROOM, U1, "personality").await;
    assert_eq!(reply.body, format!("Current personality:\n{DEFAULT_PROMPT}"));
    assert!(!reply.markdown);

    let reply = fx
        .processor
        .process(ROOM, U1, "personality You are a   pirate.")
        .await;
    assert_eq!(reply.body, "New Personality:\nYou are a pirate.");
    assert_eq!(
        fx.store.get_personality(ROOM).await.unwrap(),
        "You are a pirate."
    );
    assert_eq!(
        fx.run(U1, "personality").await,
        "Current personality:\nYou are a pirate."
    );
}

#[tokio::test]
async fn test_interject() {
    let fx = setup().await;

    assert_eq!(
        fx.run(U1, "interject").await,
        "Interjecting is disabled in this room."
    );

    assert_eq!(
        fx.run(U1, "interject 50").await,
        "I will now interject in roughly 1 in 50 messages."
    );
    assert_eq!(fx.store.get_interject_odds(ROOM).await.unwrap(), 1.0 / 50.0);
    assert_eq!(
        fx.run(U1, "interject").await,
        "I interject in roughly 1 in ~50 messages."
    );

    assert_eq!(
        fx.run(U1, "interject 0").await,
        "Interjecting is now disabled in this room."
    );
    assert_eq!(fx.store.get_interject_odds(ROOM).await.unwrap(), 0.0);
    assert_eq!(
        fx.run(U1, "interject").await,
        "Interjecting is disabled in this room."
    );
}

#[tokio::test]
async fn test_interject_rejects_bad_input() {
    let fx = setup().await;
    fx.run(U1, "interject 4").await;

    assert_eq!(
        fx.run(U1, "interject 10001").await,
        "The odds must be between 0 and 10000."
    );
    assert_eq!(
        fx.run(U1, "interject -3").await,
        "The odds must be between 0 and 10000."
    );
    assert_eq!(
        fx.run(U1, "interject sometimes").await,
        "'sometimes' is not a whole number."
    );
    assert_eq!(fx.store.get_interject_odds(ROOM).await.unwrap(), 0.25);
}

#[tokio::test]
async fn test_threads_toggle() {
    let fx = setup().await;

    assert_eq!(
        fx.run(U1, "threads").await,
        "I will no longer reply unprompted inside threads."
    );
    assert!(fx.store.get_hide_in_threads(ROOM).await.unwrap());
    assert_eq!(
        fx.run(U1, "threads").await,
        "I will reply unprompted inside threads again."
    );
    assert!(!fx.store.get_hide_in_threads(ROOM).await.unwrap());
}

#[tokio::test]
async fn test_subscribe_flow() {
    let fx = setup().await;
    fx.feeds.serve(
        FEED,
        "Campus News",
        vec![ParsedItem::new("Old", chrono::Utc::now())],
    );

    assert_eq!(
        fx.run(U1, "feeds").await,
        "This room is not subscribed to any RSS feeds."
    );
    assert_eq!(
        fx.run(U1, &format!("subscribe {FEED}")).await,
        format!("Subscribed to {FEED}! I'll send new updates to the room.")
    );
    assert_eq!(
        fx.run(U1, &format!("subscribe {FEED}")).await,
        "The room is already subscribed to this RSS feed!"
    );
    assert_eq!(fx.store.list_room_feeds(ROOM).await.unwrap(), vec![FEED]);
    assert_eq!(
        fx.run(U1, "feeds").await,
        format!("RSS subscriptions:\n{FEED}")
    );

    assert_eq!(
        fx.run(U1, &format!("unsubscribe {FEED}")).await,
        format!("Unsubscribed from {FEED}.")
    );
    assert_eq!(
        fx.run(U1, &format!("unsubscribe {FEED}")).await,
        format!("This room is not subscribed to {FEED}.")
    );
    assert!(fx.store.list_room_feeds(ROOM).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_subscribe_rejects_invalid_feed() {
    let fx = setup().await;
    let url = "https://example.com/not-a-feed";

    assert_eq!(
        fx.run(U1, &format!("subscribe {url}")).await,
        format!("'{url}' is not a valid RSS feed.")
    );
    assert!(fx.store.list_room_feeds(ROOM).await.unwrap().is_empty());
    assert_eq!(fx.feeds.fetch_count(), 1);
}

#[tokio::test]
async fn test_denied_commands_change_nothing() {
    let fx = setup().await;
    fx.feeds.serve(FEED, "Campus News", vec![]);

    for command in [
        "threads".to_string(),
        "personality Evil".to_string(),
        "interject 1".to_string(),
        format!("subscribe {FEED}"),
        format!("add {U2}"),
    ] {
        assert_eq!(fx.run(U2, &command).await, no_permission(U2));
    }

    assert!(!fx.store.get_hide_in_threads(ROOM).await.unwrap());
    assert_eq!(fx.store.get_personality(ROOM).await.unwrap(), "");
    assert_eq!(fx.store.get_interject_odds(ROOM).await.unwrap(), 0.0);
    assert!(fx.store.list_room_feeds(ROOM).await.unwrap().is_empty());
    assert_eq!(fx.admins().await, vec![U1]);
    assert_eq!(fx.feeds.fetch_count(), 0);
}

#[tokio::test]
async fn test_storage_failure_gives_generic_reply() {
    let fx = setup().await;
    fx.store.pool().close().await;

    assert_eq!(fx.run(ROOT, "threads").await, GENERIC_ERROR_REPLY);
    assert_eq!(fx.run(U1, "admins").await, GENERIC_ERROR_REPLY);
}
