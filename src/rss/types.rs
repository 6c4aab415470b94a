//! RSS types for roomwarden.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::Result;

/// Maximum length for an item description, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Maximum feed size in bytes (5MB).
pub const MAX_FEED_SIZE: u64 = 5 * 1024 * 1024;

/// Title used for items that have none.
pub const UNTITLED_ITEM: &str = "Untitled";

/// A parsed feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    /// Feed title, used as the display name.
    pub title: Option<String>,
    /// Entries in document order.
    pub items: Vec<ParsedItem>,
}

/// A parsed feed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedItem {
    /// Entry title.
    pub title: String,
    /// Entry link.
    pub link: Option<String>,
    /// Plain-text description.
    pub description: Option<String>,
    /// Publish time, falling back to the update time.
    pub published_at: Option<DateTime<Utc>>,
}

impl ParsedItem {
    /// Create an item with a title and publish time.
    pub fn new(title: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            link: None,
            description: None,
            published_at: Some(published_at),
        }
    }

    /// Set the link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Fetches and parses a feed by URL.
///
/// Used both to validate `subscribe` requests and by the poller.
pub trait FeedSource: Send + Sync + Clone + 'static {
    /// Fetch `url` and parse it. Network, HTTP and parse failures are all
    /// reported as [`crate::BotError::Feed`].
    fn fetch(&self, url: &str) -> impl Future<Output = Result<ParsedFeed>> + Send;
}
