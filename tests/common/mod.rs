//! Test helpers for integration tests.
//!
//! Provides an in-memory store, a recording transport and a scripted feed
//! source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use roomwarden::rss::{FeedSource, ParsedFeed, ParsedItem};
use roomwarden::transport::{MembershipLookup, Notifier, OutgoingMessage};
use roomwarden::{Authorizer, BotContext, BotError, Result, SqliteStore};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub const BOT: &str = "@edu:example.org";
pub const ROOM: &str = "!room:example.org";
pub const U1: &str = "@alice:example.org";
pub const U2: &str = "@bob:example.org";
pub const U3: &str = "@carol:example.org";
pub const ROOT: &str = "@root:example.org";
pub const DEFAULT_PROMPT: &str = "You are a friendly classroom assistant.";

/// Open a migrated in-memory store.
pub async fn setup_store() -> SqliteStore {
    SqliteStore::open_in_memory().await.unwrap()
}

/// Context for the bot `@edu:example.org` with prefix `!edu`.
pub fn test_context(super_admins: &[&str], greeting_delay: Duration) -> Arc<BotContext> {
    Arc::new(BotContext {
        user_id: BOT.to_string(),
        bot_name: "edu".to_string(),
        command_prefix: "!edu".to_string(),
        original_prompt: DEFAULT_PROMPT.to_string(),
        default_greeting: "Hi, my name is edu!".to_string(),
        greeting_delay,
        authorizer: Authorizer::new(super_admins.iter().copied()),
    })
}

/// Transport double that records sent messages and serves a fixed member list.
#[derive(Clone, Default)]
pub struct MockTransport {
    members: Arc<Mutex<HashMap<String, Vec<String>>>>,
    sent: Arc<Mutex<Vec<OutgoingMessage>>>,
    failing_rooms: Arc<Mutex<Vec<String>>>,
    membership_down: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add users to a room.
    pub fn join(&self, room: &str, users: &[&str]) {
        let mut members = self.members.lock().unwrap();
        let entry = members.entry(room.to_string()).or_default();
        entry.extend(users.iter().map(|u| u.to_string()));
    }

    /// Make membership lookups fail.
    pub fn break_membership(&self) {
        self.membership_down.store(true, Ordering::SeqCst);
    }

    /// Make delivery to `room` fail.
    pub fn fail_delivery_to(&self, room: &str) {
        self.failing_rooms.lock().unwrap().push(room.to_string());
    }

    /// All delivered messages, in order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Delivered messages for one room.
    pub fn sent_to(&self, room: &str) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.room_id == room)
            .collect()
    }

    /// Body of the most recent message.
    pub fn last_body(&self) -> Option<String> {
        self.sent.lock().unwrap().last().map(|m| m.body.clone())
    }

    /// Wait until at least `count` messages were delivered.
    pub async fn wait_for(&self, count: usize) {
        tokio::time::timeout(DEFAULT_TIMEOUT, async {
            while self.sent.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for messages");
    }
}

impl MembershipLookup for MockTransport {
    async fn joined_members(&self, room: &str) -> Result<Vec<String>> {
        if self.membership_down.load(Ordering::SeqCst) {
            return Err(BotError::Transport("membership service down".to_string()));
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(room)
            .cloned()
            .unwrap_or_default())
    }
}

impl Notifier for MockTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if self
            .failing_rooms
            .lock()
            .unwrap()
            .contains(&message.room_id)
        {
            return Err(BotError::Transport("delivery refused".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Scripted response for one feed URL.
#[derive(Clone)]
pub enum MockFeed {
    Ok(ParsedFeed),
    Fail,
    Hang,
}

/// Feed source double serving scripted feeds. Unknown URLs fail to parse.
#[derive(Clone, Default)]
pub struct MockFeedSource {
    feeds: Arc<Mutex<HashMap<String, MockFeed>>>,
    fetches: Arc<AtomicUsize>,
}

impl MockFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, feed: MockFeed) {
        self.feeds.lock().unwrap().insert(url.to_string(), feed);
    }

    /// Serve a feed with the given title and items.
    pub fn serve(&self, url: &str, title: &str, items: Vec<ParsedItem>) {
        self.set(
            url,
            MockFeed::Ok(ParsedFeed {
                title: Some(title.to_string()),
                items,
            }),
        );
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FeedSource for MockFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let feed = self.feeds.lock().unwrap().get(url).cloned();
        match feed {
            Some(MockFeed::Ok(parsed)) => Ok(parsed),
            Some(MockFeed::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(MockFeed::Fail) | None => {
                Err(BotError::Feed(format!("failed to parse feed: {url}")))
            }
        }
    }
}
