//! Room event handling: command replies, the response rule and invites.

#![cfg(feature = "sqlite")]

mod common;

use std::time::Duration;

use common::*;
use roomwarden::{Bot, CompletionRequest, InboundMessage, SettingsStore, SqliteStore};

type TestBot = Bot<SqliteStore, MockTransport, MockFeedSource, MockTransport>;

struct Fixture {
    store: SqliteStore,
    transport: MockTransport,
    bot: TestBot,
}

async fn setup_with_delay(greeting_delay: Duration) -> Fixture {
    let store = setup_store().await;
    let transport = MockTransport::new();
    let bot = Bot::new(
        test_context(&[ROOT], greeting_delay),
        store.clone(),
        transport.clone(),
        MockFeedSource::new(),
        transport.clone(),
    );
    Fixture {
        store,
        transport,
        bot,
    }
}

/// A classroom-sized room with `U1` as admin.
async fn setup() -> Fixture {
    let fx = setup_with_delay(Duration::ZERO).await;
    fx.transport.join(ROOM, &[BOT, U1, U2, U3]);
    fx.store.set_room_admin(ROOM, U1).await.unwrap();
    fx
}

fn message(sender: &str, body: &str) -> InboundMessage {
    let mut message = InboundMessage::new(ROOM, sender, body);
    message.event_id = Some("$event1".to_string());
    message
}

fn threaded(sender: &str, body: &str) -> InboundMessage {
    let mut message = message(sender, body);
    message.in_thread = true;
    message
}

#[tokio::test]
async fn test_command_is_answered_in_reply() {
    let fx = setup().await;

    let outcome = fx.bot.on_message(&message(U1, "!edu admins")).await.unwrap();
    assert_eq!(outcome, None);

    let sent = fx.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].room_id, ROOM);
    assert_eq!(sent[0].body, format!("Admins in this room: {U1}"));
    assert_eq!(sent[0].reply_to.as_deref(), Some("$event1"));
    assert!(!sent[0].notice);
}

#[tokio::test]
async fn test_processor_runs_without_sending() {
    let fx = setup().await;

    let reply = fx.bot.processor().process(ROOM, U1, "admins").await;
    assert_eq!(reply.body, format!("Admins in this room: {U1}"));
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn test_own_messages_are_ignored() {
    let fx = setup().await;

    assert_eq!(fx.bot.on_message(&message(BOT, "!edu help")).await.unwrap(), None);
    assert_eq!(fx.bot.on_message(&message(BOT, "edu, hi")).await.unwrap(), None);
    assert!(fx.transport.sent().is_empty());
}

#[tokio::test]
async fn test_mention_requests_completion() {
    let fx = setup().await;

    let outcome = fx
        .bot
        .on_message(&message(U2, "Hey Edu, when is the exam?"))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Some(CompletionRequest {
            room_id: ROOM.to_string(),
            personality: DEFAULT_PROMPT.to_string(),
            reply_to: Some("$event1".to_string()),
        })
    );
}

#[tokio::test]
async fn test_room_personality_is_used() {
    let fx = setup().await;
    fx.store
        .set_personality(ROOM, "You are a pirate.")
        .await
        .unwrap();

    let request = fx
        .bot
        .on_message(&message(U2, "edu?"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request.personality, "You are a pirate.");
}

#[tokio::test]
async fn test_group_chatter_is_ignored_without_odds() {
    let fx = setup().await;

    for _ in 0..20 {
        let outcome = fx.bot.on_message(&message(U2, "lunch anyone?")).await.unwrap();
        assert_eq!(outcome, None);
    }
}

#[tokio::test]
async fn test_direct_chat_always_answers() {
    let fx = setup_with_delay(Duration::ZERO).await;
    fx.transport.join(ROOM, &[BOT, U1]);

    let outcome = fx.bot.on_message(&message(U1, "lunch anyone?")).await.unwrap();
    assert!(outcome.is_some());
}

#[tokio::test]
async fn test_unknown_membership_is_not_direct_chat() {
    let fx = setup_with_delay(Duration::ZERO).await;
    fx.transport.join(ROOM, &[BOT, U1]);
    fx.transport.break_membership();

    let outcome = fx.bot.on_message(&message(U1, "lunch anyone?")).await.unwrap();
    assert_eq!(outcome, None);
}

#[tokio::test]
async fn test_interject_one_always_answers() {
    let fx = setup().await;
    fx.bot.on_message(&message(U1, "!edu interject 1")).await.unwrap();
    assert_eq!(
        fx.transport.last_body().unwrap(),
        "I will now interject in roughly 1 in 1 messages."
    );

    for _ in 0..10 {
        let outcome = fx.bot.on_message(&message(U2, "lunch anyone?")).await.unwrap();
        assert!(outcome.is_some());
    }
}

#[tokio::test]
async fn test_hide_in_threads() {
    let fx = setup().await;
    fx.store.set_interject_odds(ROOM, 1.0).await.unwrap();

    // Threads are open by default.
    assert!(fx.bot.on_message(&threaded(U2, "lunch?")).await.unwrap().is_some());

    fx.bot.on_message(&message(U1, "!edu threads")).await.unwrap();
    assert_eq!(fx.bot.on_message(&threaded(U2, "lunch?")).await.unwrap(), None);

    // Mentions and top-level messages still get answers.
    assert!(fx.bot.on_message(&threaded(U2, "edu, lunch?")).await.unwrap().is_some());
    assert!(fx.bot.on_message(&message(U2, "lunch?")).await.unwrap().is_some());

    // Commands work inside threads regardless.
    fx.bot.on_message(&threaded(U1, "!edu threads")).await.unwrap();
    assert_eq!(
        fx.transport.last_body().unwrap(),
        "I will reply unprompted inside threads again."
    );
    assert!(fx.bot.on_message(&threaded(U2, "lunch?")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_invite_sets_admins_and_greets() {
    let fx = setup_with_delay(Duration::ZERO).await;
    let room = "!new:example.org";

    fx.bot.on_invite(room, U1, Some(U2)).await.unwrap();
    assert_eq!(fx.store.list_room_admins(room).await.unwrap(), vec![U1, U2]);

    fx.transport.wait_for(1).await;
    let greeting = &fx.transport.sent()[0];
    assert_eq!(greeting.room_id, room);
    assert_eq!(greeting.body, "Hi, my name is edu!");
    assert_eq!(greeting.reply_to, None);
}

#[tokio::test]
async fn test_invite_by_creator_adds_one_admin() {
    let fx = setup_with_delay(Duration::ZERO).await;
    let room = "!new:example.org";

    fx.bot.on_invite(room, U1, Some(U1)).await.unwrap();
    fx.bot.on_invite("!other:example.org", U3, None).await.unwrap();

    assert_eq!(fx.store.list_room_admins(room).await.unwrap(), vec![U1]);
    assert_eq!(
        fx.store.list_room_admins("!other:example.org").await.unwrap(),
        vec![U3]
    );
}

#[tokio::test]
async fn test_invite_uses_stored_greeting() {
    let fx = setup_with_delay(Duration::ZERO).await;
    fx.store.set_greeting("Welcome, class!").await.unwrap();

    fx.bot.on_invite("!new:example.org", U1, None).await.unwrap();
    fx.transport.wait_for(1).await;
    assert_eq!(fx.transport.last_body().unwrap(), "Welcome, class!");
}

#[tokio::test]
async fn test_shutdown_cancels_pending_greeting() {
    let fx = setup_with_delay(Duration::from_secs(3600)).await;

    fx.bot.on_invite("!new:example.org", U1, None).await.unwrap();
    assert_eq!(fx.bot.pending_greetings().await, 1);

    tokio::time::timeout(DEFAULT_TIMEOUT, fx.bot.shutdown())
        .await
        .expect("shutdown should not wait for the greeting delay");
    assert_eq!(fx.bot.pending_greetings().await, 0);
    assert!(fx.transport.sent().is_empty());
}
