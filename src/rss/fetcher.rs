//! HTTP feed source.
//!
//! Fetches RSS/Atom documents with `reqwest` and parses them with `feed-rs`.
//! Requests are limited to http(s), refuse private and loopback hosts unless
//! configured otherwise, and stop reading once the body exceeds the size cap.

use std::net::IpAddr;
use std::time::Duration;

use feed_rs::parser;
use reqwest::Client;
use tracing::debug;

use super::types::{
    FeedSource, ParsedFeed, ParsedItem, MAX_DESCRIPTION_LENGTH, MAX_FEED_SIZE, UNTITLED_ITEM,
};
use crate::config::RssConfig;
use crate::{BotError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = concat!("roomwarden/", env!("CARGO_PKG_VERSION"), " (feed poller)");

/// Hostnames that never resolve to public servers.
const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

/// Feed source backed by HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: Client,
    max_feed_size: u64,
    allow_private_hosts: bool,
}

impl HttpFeedSource {
    /// Create a source from the `[rss]` configuration.
    pub fn new(config: &RssConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BotError::Feed(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes.min(MAX_FEED_SIZE),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BotError::Feed(format!("failed to fetch feed: {e}")))?;

        if !response.status().is_success() {
            return Err(BotError::Feed(format!("HTTP error: {}", response.status())));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(too_large(content_length, self.max_feed_size));
            }
        }

        // Content-Length may be missing or wrong; count what actually arrives.
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| BotError::Feed(format!("failed to read response: {e}")))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_feed_size {
                return Err(too_large(body.len() as u64, self.max_feed_size));
            }
        }
        Ok(body)
    }
}

impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        validate_url(url, self.allow_private_hosts)?;
        let body = self.download(url).await?;
        debug!(url, bytes = body.len(), "Downloaded feed");
        parse_feed(&body)
    }
}

fn too_large(size: u64, max: u64) -> BotError {
    BotError::Feed(format!("feed too large: {size} bytes (max {max} bytes)"))
}

/// Validate a feed URL before any request is made.
///
/// Only http and https are accepted. Unless `allow_private` is set, loopback,
/// private, link-local and reserved hosts are rejected.
pub fn validate_url(url: &str, allow_private: bool) -> Result<()> {
    let parsed = url::Url::parse(url).map_err(|e| BotError::Feed(format!("invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(BotError::Feed(format!("unsupported URL scheme: {scheme}")));
        }
    }

    let host = parsed
        .host()
        .ok_or_else(|| BotError::Feed("URL has no host".to_string()))?;

    if allow_private {
        return Ok(());
    }

    let ip = match host {
        url::Host::Domain(domain) => {
            if is_forbidden_hostname(domain) {
                return Err(BotError::Feed(format!("forbidden host: {domain}")));
            }
            return Ok(());
        }
        url::Host::Ipv4(v4) => IpAddr::V4(v4),
        url::Host::Ipv6(v6) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(BotError::Feed(format!(
            "private IP address not allowed: {ip}"
        )));
    }
    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
                // Shared address space (carrier-grade NAT): 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // Unique local: fc00::/7
                || (first & 0xfe00) == 0xfc00
                // Link-local: fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Parse feed bytes into a [`ParsedFeed`].
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed> {
    let feed =
        parser::parse(bytes).map_err(|e| BotError::Feed(format!("failed to parse feed: {e}")))?;

    let title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty());

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = entry
                .title
                .map(|t| strip_html(&t.content))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED_ITEM.to_string());
            let description = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body))
                .map(|d| truncate(&strip_html(&d), MAX_DESCRIPTION_LENGTH))
                .filter(|d| !d.is_empty());

            ParsedItem {
                title,
                link: entry.links.first().map(|l| l.href.clone()),
                description,
                published_at: entry.published.or(entry.updated),
            }
        })
        .collect();

    Ok(ParsedFeed { title, items })
}

/// Remove markup and decode common entities, collapsing whitespace.
fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(pos) = rest.find(['<', '&']) {
        text.push_str(&rest[..pos]);
        rest = &rest[pos..];
        if rest.starts_with('<') {
            // Unterminated tags swallow the remainder.
            rest = rest.find('>').map_or("", |end| &rest[end + 1..]);
            text.push(' ');
            continue;
        }
        match rest.find(';').filter(|&end| end <= 10) {
            Some(end) => match decode_entity(&rest[1..end]) {
                Some(c) => {
                    text.push(c);
                    rest = &rest[end + 1..];
                }
                None => {
                    text.push('&');
                    rest = &rest[1..];
                }
            },
            None => {
                text.push('&');
                rest = &rest[1..];
            }
        }
    }
    text.push_str(rest);

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
