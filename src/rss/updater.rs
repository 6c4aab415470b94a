//! Feed poller.
//!
//! A long-lived task wakes on a fixed interval, fetches every subscribed
//! feed, and fans out one notice per new entry to every subscribed room.
//! Only entries strictly newer than the stored watermark count as new.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::types::{FeedSource, ParsedItem};
use crate::config::RssConfig;
use crate::db::{FeedInfo, SettingsStore};
use crate::transport::{Notifier, OutgoingMessage};

/// Default poll interval in seconds (10 minutes).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;

/// Poller timing and concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between cycles.
    pub interval: Duration,
    /// Upper bound for fetching one feed.
    pub fetch_timeout: Duration,
    /// Feeds fetched at the same time.
    pub concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(30),
            concurrency: 4,
        }
    }
}

impl From<&RssConfig> for PollerConfig {
    fn from(config: &RssConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            concurrency: config.max_concurrent_fetches.max(1),
        }
    }
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Feeds fetched (successfully or not).
    pub feeds_checked: usize,
    /// Feeds whose fetch, parse or bookkeeping failed.
    pub feeds_failed: usize,
    /// New entries found across all feeds.
    pub new_entries: usize,
    /// Notifications delivered.
    pub notifications_sent: usize,
}

impl PollReport {
    fn merge(&mut self, other: PollReport) {
        self.feeds_checked += other.feeds_checked;
        self.feeds_failed += other.feeds_failed;
        self.new_entries += other.new_entries;
        self.notifications_sent += other.notifications_sent;
    }
}

/// Entries of `items` published strictly after `watermark`, oldest first.
///
/// Comparison is at whole-second precision, matching what the store keeps.
/// Entries without a timestamp are never new.
pub fn new_entries(items: Vec<ParsedItem>, watermark: DateTime<Utc>) -> Vec<ParsedItem> {
    let boundary = watermark.timestamp();
    let mut fresh: Vec<ParsedItem> = items
        .into_iter()
        .filter(|item| {
            item.published_at
                .is_some_and(|published| published.timestamp() > boundary)
        })
        .collect();
    fresh.sort_by_key(|item| item.published_at);
    fresh
}

/// Notification text for one entry.
///
/// A leading `#` in the feed name is escaped so markdown renderers do not
/// turn the line into a heading.
pub fn format_notification(feed_name: &str, item: &ParsedItem) -> String {
    let name = match feed_name.strip_prefix('#') {
        Some(rest) => format!("\\#{rest}"),
        None => feed_name.to_string(),
    };
    format!(
        "{}: {}\n{}",
        name,
        item.title,
        item.link.as_deref().unwrap_or_default()
    )
}

/// Polls subscribed feeds and notifies rooms of new entries.
pub struct FeedPoller<S, F, N> {
    store: S,
    source: F,
    notifier: N,
    config: PollerConfig,
}

impl<S, F, N> FeedPoller<S, F, N>
where
    S: SettingsStore,
    F: FeedSource,
    N: Notifier,
{
    /// Create a new poller.
    pub fn new(store: S, source: F, notifier: N, config: PollerConfig) -> Self {
        Self {
            store,
            source,
            notifier,
            config,
        }
    }

    /// The poller's configuration.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Run the poller on a background task.
    pub fn spawn(self) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Run the poller loop until `shutdown` becomes true or its sender is
    /// dropped. The first cycle starts immediately.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Feed poller started (interval: {} seconds)",
            self.config.interval.as_secs()
        );

        let mut timer = interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.changed() => {}
            }
            if is_stopping(&shutdown) {
                break;
            }

            let report = self.cycle(Some(&shutdown)).await;
            if report.new_entries > 0 || report.feeds_failed > 0 {
                info!(
                    feeds = report.feeds_checked,
                    failed = report.feeds_failed,
                    entries = report.new_entries,
                    sent = report.notifications_sent,
                    "Poll cycle complete"
                );
            } else {
                debug!(feeds = report.feeds_checked, "Poll cycle complete, nothing new");
            }
        }

        info!("Feed poller stopped");
    }

    /// Run a single cycle over every subscribed feed.
    pub async fn poll_once(&self) -> PollReport {
        self.cycle(None).await
    }

    async fn cycle(&self, shutdown: Option<&watch::Receiver<bool>>) -> PollReport {
        let feeds = match self.store.list_all_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("Failed to list feeds: {}", e);
                return PollReport::default();
            }
        };

        if feeds.is_empty() {
            debug!("No subscribed feeds");
            return PollReport::default();
        }

        debug!("Polling {} feed(s)", feeds.len());

        // Shutdown is checked before each feed starts; a feed in progress runs
        // to completion so its watermark and deliveries stay consistent.
        let reports: Vec<PollReport> = stream::iter(feeds)
            .filter(|_| std::future::ready(!shutdown.is_some_and(is_stopping)))
            .map(|feed| self.poll_feed(feed))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut total = PollReport::default();
        for report in reports {
            total.merge(report);
        }
        total
    }

    async fn poll_feed(&self, feed: FeedInfo) -> PollReport {
        let mut report = PollReport {
            feeds_checked: 1,
            ..PollReport::default()
        };
        let url = feed.url.as_str();

        let parsed =
            match tokio::time::timeout(self.config.fetch_timeout, self.source.fetch(url)).await {
                Ok(Ok(parsed)) => parsed,
                Ok(Err(e)) => {
                    warn!(url, "Failed to fetch feed: {}", e);
                    report.feeds_failed = 1;
                    return report;
                }
                Err(_) => {
                    warn!(
                        url,
                        "Feed fetch timed out after {} seconds",
                        self.config.fetch_timeout.as_secs()
                    );
                    report.feeds_failed = 1;
                    return report;
                }
            };

        if let Some(title) = parsed.title.as_deref() {
            if feed.display_name.as_deref() != Some(title) {
                match self.store.set_feed_display_name(url, title).await {
                    Ok(()) => debug!(url, title, "Updated feed display name"),
                    Err(e) => warn!(url, "Failed to store feed display name: {}", e),
                }
            }
        }
        let name = parsed.title.clone().unwrap_or_else(|| feed.name().to_string());

        let entries = new_entries(parsed.items, feed.last_update);
        if entries.is_empty() {
            debug!(url, "No new entries");
            return report;
        }

        let rooms = match self.store.list_rooms_for_feed(url).await {
            Ok(rooms) => rooms,
            Err(e) => {
                error!(url, "Failed to list subscribed rooms: {}", e);
                report.feeds_failed = 1;
                return report;
            }
        };

        for entry in entries {
            let Some(published) = entry.published_at else {
                continue;
            };
            // Persist first: a crash after this point loses at most this
            // entry's deliveries instead of repeating them.
            if let Err(e) = self.store.set_feed_watermark(url, published).await {
                error!(url, "Failed to advance watermark: {}", e);
                report.feeds_failed = 1;
                return report;
            }
            report.new_entries += 1;

            let body = format_notification(&name, &entry);
            for room in &rooms {
                match self
                    .notifier
                    .send(OutgoingMessage::notice(room.as_str(), body.as_str()))
                    .await
                {
                    Ok(()) => report.notifications_sent += 1,
                    Err(e) => warn!(url, room_id = %room, "Failed to deliver feed entry: {}", e),
                }
            }
        }

        info!(
            url,
            entries = report.new_entries,
            rooms = rooms.len(),
            "Delivered new feed entries"
        );
        report
    }
}

fn is_stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Owned handle to a running poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signal the poller to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Feed poller task ended abnormally: {}", e);
        }
    }

    /// Whether the poller task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
