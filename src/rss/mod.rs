//! RSS subscription module for roomwarden.
//!
//! Fetching and parsing live in [`fetcher`], the periodic fan-out in
//! [`updater`].

pub mod fetcher;
pub mod types;
pub mod updater;

pub use fetcher::{parse_feed, validate_url, HttpFeedSource};
pub use types::{FeedSource, ParsedFeed, ParsedItem, MAX_DESCRIPTION_LENGTH, MAX_FEED_SIZE};
pub use updater::{
    format_notification, new_entries, FeedPoller, PollReport, PollerConfig, PollerHandle,
    DEFAULT_POLL_INTERVAL_SECS,
};
